//! Core primitives.
//!
//! Seedable randomness and the port allocator built on it.

pub mod ports;
pub mod rng;

pub use ports::{PortAllocationError, PortAllocator, PortPlan, DEFAULT_PORT_RANGE};
pub use rng::DeterministicRng;
