//! Registrants and the Roster
//!
//! A `Registrant` is one client's self-reported identity plus the address we
//! observed its connection from. The `Roster` accumulates registrants in
//! arrival order until a match can be formed.

use std::fmt;
use std::net::SocketAddr;

/// Unique identifier for a registrant, assigned per accepted registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrantId(pub u64);

impl fmt::Display for RegistrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One connecting client's identity, pending match assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registrant {
    /// Registrant identifier.
    pub id: RegistrantId,
    /// Client-supplied display name (opaque).
    pub name: String,
    /// Client-reported reachable address, passed through verbatim.
    pub local_addr: String,
    /// Candidate ports offered by the client, in preference order.
    pub advertised_ports: Vec<u16>,
    /// Peer address of the client's TCP connection as seen by the server.
    pub observed_addr: SocketAddr,
}

/// Roster errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    /// Roster already holds the target number of players.
    #[error("Roster is full ({0} players)")]
    Full(usize),

    /// Registrant is already on the roster.
    #[error("Registrant {0} already on roster")]
    Duplicate(RegistrantId),
}

/// Ordered collection of entries accumulating towards one match.
///
/// Position in the roster is arrival order and becomes the player's
/// position in the match.
#[derive(Debug)]
pub struct Roster<T> {
    capacity: usize,
    entries: Vec<(RegistrantId, T)>,
}

impl<T> Roster<T> {
    /// Create an empty roster that fills at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Target size of a completed roster.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the roster holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the roster has reached its target size.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Whether `id` is on the roster.
    pub fn contains(&self, id: RegistrantId) -> bool {
        self.entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    /// Append an entry. Returns its position, or the entry back on rejection.
    pub fn push(&mut self, id: RegistrantId, entry: T) -> Result<usize, (RosterError, T)> {
        if self.is_full() {
            return Err((RosterError::Full(self.capacity), entry));
        }
        if self.contains(id) {
            return Err((RosterError::Duplicate(id), entry));
        }
        self.entries.push((id, entry));
        Ok(self.entries.len() - 1)
    }

    /// Remove an entry, preserving the order of the others.
    pub fn remove(&mut self, id: RegistrantId) -> Option<T> {
        let index = self.entries.iter().position(|(entry_id, _)| *entry_id == id)?;
        Some(self.entries.remove(index).1)
    }

    /// Take every entry in arrival order, leaving the roster empty.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(_, entry)| entry)
            .collect()
    }
}
