//! # Rendezvous Server
//!
//! Matchmaking rendezvous for peer-to-peer game sessions. Clients register
//! over TCP; once enough have registered, each receives the addresses and
//! port pairs it needs to connect directly to every other player.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RENDEZVOUS SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Primitives                               │
//! │  ├── rng.rs       - Seedable Xorshift128+ PRNG               │
//! │  └── ports.rs     - Per-player port pools                    │
//! │                                                              │
//! │  matching/        - Matchmaking (no I/O)                     │
//! │  ├── roster.rs    - Registrants awaiting a match             │
//! │  ├── peers.rs     - Peer tuple computation                   │
//! │  └── coordinator.rs - Sequential roster owner                │
//! │                                                              │
//! │  network/         - TCP transport                            │
//! │  ├── framing.rs   - Length-prefixed frames                   │
//! │  ├── protocol.rs  - Registration and game setup messages     │
//! │  ├── handler.rs   - Per-connection registration handler      │
//! │  └── server.rs    - Accept loop                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! Handler (one per connection) → coordinator inbox → full roster →
//! peer tuples → one game setup per handler → framed write → close.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod matching;
pub mod network;

// Re-export commonly used types
pub use crate::core::ports::{PortAllocator, PortPlan};
pub use crate::matching::coordinator::{
    CoordinatorConfig, CoordinatorHandle, MatchCoordinator, MatchOutcome,
};
pub use crate::matching::roster::{Registrant, RegistrantId};
pub use crate::network::server::{RendezvousServer, ServerConfig, ServerError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Player ID of roster position 0
pub const STARTING_PLAYER_ID: u64 = 100;

/// Team ID of even roster positions
pub const STARTING_TEAM_ID: u64 = 200;

/// Smallest supported match
pub const MIN_PLAYERS: usize = 2;

/// Largest supported match
pub const MAX_PLAYERS: usize = 4;
