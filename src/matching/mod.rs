//! Matchmaking
//!
//! Roster bookkeeping, peer computation, and the coordinator task that ties
//! them together. Nothing here touches sockets.

pub mod coordinator;
pub mod peers;
pub mod roster;

pub use coordinator::{
    CoordinatorConfig, CoordinatorHandle, MatchCoordinator, MatchError, MatchOutcome, PendingMatch,
};
pub use peers::{assign_peers, compute_peer_tuples, PeerTuple};
pub use roster::{Registrant, RegistrantId, Roster};
