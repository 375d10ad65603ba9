//! Match Coordinator
//!
//! A single task that owns the roster. Registration handlers submit
//! registrants through a bounded inbox; once the roster reaches the target
//! size the coordinator computes every player's peers, encodes one game
//! setup per player, replies to each handler, and starts a fresh roster.
//!
//! ```text
//!   Accumulating ──(roster full)──► Dispatching ──(all replied)──┐
//!        ▲                                                       │
//!        └───────────────────────────────────────────────────────┘
//! ```
//!
//! A failure while building a batch discards that batch only: every handler
//! in it is told so, and the coordinator keeps accepting registrants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::ports::{PortAllocationError, PortAllocator};
use crate::matching::peers::assign_peers;
use crate::matching::roster::{Registrant, RegistrantId, Roster};
use crate::network::protocol::{GameSetup, ServerMessage, SetupError};
use crate::{MAX_PLAYERS, MIN_PLAYERS};

/// Inbox depth. One slot keeps submissions blocked while a batch dispatches.
const INBOX_CAPACITY: usize = 1;

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Players per match.
    pub target_players: usize,
    /// Map name passed through to every game setup.
    pub map_name: String,
}

impl CoordinatorConfig {
    /// Create a validated configuration.
    pub fn new(
        target_players: usize,
        map_name: impl Into<String>,
    ) -> Result<Self, CoordinatorError> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&target_players) {
            return Err(CoordinatorError::InvalidPlayerCount(target_players));
        }
        Ok(Self {
            target_players,
            map_name: map_name.into(),
        })
    }
}

/// Coordinator setup errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// Target player count outside the supported range.
    #[error("Players must be between 2 and 4, got {0}")]
    InvalidPlayerCount(usize),
}

/// The coordinator task has stopped and no longer accepts registrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Match coordinator is not running")]
pub struct CoordinatorClosed;

/// Batch-wide failures. Each aborts the current batch only.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// Ports could not be assigned.
    #[error("Port allocation failed: {0}")]
    PortAllocation(#[from] PortAllocationError),

    /// Peer lists did not line up with the roster.
    #[error("Inconsistent game setup: {0}")]
    Setup(#[from] SetupError),

    /// A game setup could not be serialized.
    #[error("Failed to encode game setup: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a registration handler receives back from the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Encoded `game_setup` payload for this player.
    Matched(Vec<u8>),
    /// The batch this player belonged to was discarded.
    Discarded(String),
    /// The player was removed from the roster before the match formed.
    Withdrawn,
}

/// Messages into the coordinator's inbox.
#[derive(Debug)]
enum Command {
    Register {
        registrant: Registrant,
        reply: oneshot::Sender<MatchOutcome>,
    },
    Withdraw {
        id: RegistrantId,
    },
}

/// A registrant waiting on the roster, plus the way back to its handler.
#[derive(Debug)]
struct RosterEntry {
    registrant: Registrant,
    reply: oneshot::Sender<MatchOutcome>,
}

/// Cloneable handle for talking to a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
}

impl CoordinatorHandle {
    /// Reserve a fresh registrant identifier.
    pub fn next_id(&self) -> RegistrantId {
        RegistrantId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Submit a registrant. Waits until the coordinator has room in its inbox.
    pub async fn submit(&self, registrant: Registrant) -> Result<PendingMatch, CoordinatorClosed> {
        let id = registrant.id;
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Command::Register { registrant, reply })
            .await
            .map_err(|_| CoordinatorClosed)?;
        Ok(PendingMatch { id, outcome })
    }

    /// Ask the coordinator to drop `id` from the roster.
    ///
    /// If the match already went out this does nothing; the handler will
    /// still receive the dispatched outcome.
    pub async fn withdraw(&self, id: RegistrantId) -> Result<(), CoordinatorClosed> {
        self.tx
            .send(Command::Withdraw { id })
            .await
            .map_err(|_| CoordinatorClosed)
    }
}

/// A submitted registrant awaiting its outcome.
#[derive(Debug)]
pub struct PendingMatch {
    id: RegistrantId,
    outcome: oneshot::Receiver<MatchOutcome>,
}

impl PendingMatch {
    /// Registrant this submission belongs to.
    pub fn id(&self) -> RegistrantId {
        self.id
    }

    /// Wait for the coordinator's answer. Cancel-safe.
    pub async fn outcome(&mut self) -> MatchOutcome {
        match (&mut self.outcome).await {
            Ok(outcome) => outcome,
            Err(_) => MatchOutcome::Discarded("coordinator stopped".to_string()),
        }
    }
}

/// Sequential owner of the roster.
pub struct MatchCoordinator {
    config: CoordinatorConfig,
    roster: Roster<RosterEntry>,
    allocator: PortAllocator,
    inbox: mpsc::Receiver<Command>,
    matches_dispatched: u64,
}

impl MatchCoordinator {
    /// Create a coordinator and the handle used to reach it.
    pub fn new(config: CoordinatorConfig, allocator: PortAllocator) -> (Self, CoordinatorHandle) {
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let coordinator = Self {
            roster: Roster::new(config.target_players),
            config,
            allocator,
            inbox,
            matches_dispatched: 0,
        };
        let handle = CoordinatorHandle {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (coordinator, handle)
    }

    /// Process the inbox until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            "Match coordinator running: {} players per match, map {:?}",
            self.config.target_players, self.config.map_name
        );

        while let Some(command) = self.inbox.recv().await {
            match command {
                Command::Register { registrant, reply } => self.register(registrant, reply),
                Command::Withdraw { id } => self.withdraw(id),
            }
        }

        for entry in self.roster.drain() {
            let _ = entry
                .reply
                .send(MatchOutcome::Discarded("coordinator stopped".to_string()));
        }
        info!(
            "Match coordinator stopped after {} matches",
            self.matches_dispatched
        );
    }

    /// Add a registrant; dispatch once the roster is full.
    fn register(&mut self, registrant: Registrant, reply: oneshot::Sender<MatchOutcome>) {
        let id = registrant.id;
        let name = registrant.name.clone();
        match self.roster.push(id, RosterEntry { registrant, reply }) {
            Ok(position) => {
                info!(
                    "Registrant {} ({:?}) joined roster at position {} ({}/{})",
                    id,
                    name,
                    position,
                    self.roster.len(),
                    self.roster.capacity()
                );
            }
            Err((e, entry)) => {
                warn!("Rejected registrant {}: {}", id, e);
                let _ = entry.reply.send(MatchOutcome::Discarded(e.to_string()));
                return;
            }
        }

        if self.roster.is_full() {
            self.dispatch();
        }
    }

    /// Remove a registrant that gave up waiting.
    fn withdraw(&mut self, id: RegistrantId) {
        match self.roster.remove(id) {
            Some(entry) => {
                info!(
                    "Registrant {} withdrawn from roster ({}/{})",
                    id,
                    self.roster.len(),
                    self.roster.capacity()
                );
                let _ = entry.reply.send(MatchOutcome::Withdrawn);
            }
            None => debug!("Withdraw for {} ignored: not on roster", id),
        }
    }

    /// Build and deliver one match from the full roster.
    fn dispatch(&mut self) {
        let entries = self.roster.drain();
        let match_id = Uuid::new_v4();
        let (players, replies): (Vec<Registrant>, Vec<oneshot::Sender<MatchOutcome>>) = entries
            .into_iter()
            .map(|entry| (entry.registrant, entry.reply))
            .unzip();

        match build_match_payloads(&players, &self.config.map_name, &mut self.allocator) {
            Ok(payloads) => {
                for ((player, reply), payload) in players.iter().zip(replies).zip(payloads) {
                    debug!(
                        "Match {}: sending {} to {}",
                        match_id,
                        String::from_utf8_lossy(&payload),
                        player.observed_addr
                    );
                    if reply.send(MatchOutcome::Matched(payload)).is_err() {
                        warn!(
                            "Match {}: handler for {} ({:?}) is gone",
                            match_id, player.id, player.name
                        );
                    }
                }
                self.matches_dispatched += 1;
                info!(
                    "Match {} dispatched: {} players on {:?}",
                    match_id,
                    players.len(),
                    self.config.map_name
                );
            }
            Err(e) => {
                warn!("Match {} discarded: {}", match_id, e);
                let reason = e.to_string();
                for reply in replies {
                    let _ = reply.send(MatchOutcome::Discarded(reason.clone()));
                }
            }
        }
    }
}

/// Encode one `game_setup` payload per player, in roster order.
pub fn build_match_payloads(
    players: &[Registrant],
    map_name: &str,
    allocator: &mut PortAllocator,
) -> Result<Vec<Vec<u8>>, MatchError> {
    let peers = assign_peers(players, allocator)?;
    let mut payloads = Vec::with_capacity(players.len());
    for (position, player_peers) in peers.iter().enumerate() {
        let setup = GameSetup::for_position(position, players.len(), map_name, player_peers)?;
        payloads.push(ServerMessage::GameSetup(setup).to_vec()?);
    }
    Ok(payloads)
}
