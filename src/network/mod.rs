//! Network Layer
//!
//! TCP transport for registrations: framing, wire messages, the
//! per-connection handler, and the accept loop.

pub mod framing;
pub mod handler;
pub mod protocol;
pub mod server;

pub use framing::{encode_frame, read_frame, write_frame, FrameError};
pub use handler::{handle_registration, RegistrationError, RegistrationOutcome};
pub use protocol::{GameSetup, PeerInfo, RegistrationRequest, ServerMessage};
pub use server::{RendezvousServer, ServerConfig, ServerError};
