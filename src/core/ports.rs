//! Port Allocation
//!
//! Assigns each player in a match a pool of hole-punching ports.
//!
//! Player `i` owns `N - 1` ports. Slot `k` of that pool is reserved for the
//! k-th other player in position order, so the port `i` uses to reach `j`
//! never depends on how many edges were visited before it:
//!
//! ```text
//! slot(i, j) = j      if j < i
//!            = j - 1  if j > i
//! ```
//!
//! Ports drawn from the configured range are unique across the whole roster.

use std::collections::BTreeSet;
use std::ops::Range;

use super::rng::DeterministicRng;

/// Default range for hole-punching ports.
pub const DEFAULT_PORT_RANGE: Range<u16> = 50000..55000;

/// Port allocation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortAllocationError {
    /// Not enough free ports in the range for this roster.
    #[error("Port pool exhausted: requested {requested}, available {available}")]
    Exhausted {
        /// Ports needed from the range.
        requested: usize,
        /// Free ports left in the range.
        available: usize,
    },

    /// The configured range is empty or starts at port 0.
    #[error("Invalid port range {start}..{end}")]
    InvalidRange {
        /// Inclusive start.
        start: u16,
        /// Exclusive end.
        end: u16,
    },

    /// A pool does not hold one port per other player.
    #[error("Inconsistent pool for position {position}: expected {expected} ports, got {actual}")]
    InconsistentPool {
        /// Roster position owning the pool.
        position: usize,
        /// Ports expected (`N - 1`).
        expected: usize,
        /// Ports present.
        actual: usize,
    },
}

/// Per-player port pools for one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPlan {
    pools: Vec<Vec<u16>>,
}

impl PortPlan {
    /// Build a plan from explicit pools, one per roster position.
    pub fn from_pools(pools: Vec<Vec<u16>>) -> Result<Self, PortAllocationError> {
        let expected = pools.len().saturating_sub(1);
        for (position, pool) in pools.iter().enumerate() {
            if pool.len() != expected {
                return Err(PortAllocationError::InconsistentPool {
                    position,
                    expected,
                    actual: pool.len(),
                });
            }
        }
        Ok(Self { pools })
    }

    /// Number of players covered by this plan.
    pub fn player_count(&self) -> usize {
        self.pools.len()
    }

    /// Pool owned by the player at `position`.
    pub fn pool(&self, position: usize) -> &[u16] {
        self.pools.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Index into `owner`'s pool reserved for the edge towards `peer`.
    ///
    /// Callers must not pass `owner == peer`.
    #[inline]
    pub fn slot(owner: usize, peer: usize) -> usize {
        if peer < owner {
            peer
        } else {
            peer - 1
        }
    }

    /// Port `owner` uses on its edge towards `peer`.
    pub fn port_for(&self, owner: usize, peer: usize) -> Option<u16> {
        if owner == peer {
            return None;
        }
        self.pools.get(owner)?.get(Self::slot(owner, peer)).copied()
    }
}

/// Seedable allocator drawing ports from a fixed range.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: Range<u16>,
    rng: DeterministicRng,
}

impl PortAllocator {
    /// Create an allocator over `range` driven by `rng`.
    pub fn new(range: Range<u16>, rng: DeterministicRng) -> Result<Self, PortAllocationError> {
        if range.start == 0 || range.start >= range.end {
            return Err(PortAllocationError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        Ok(Self { range, rng })
    }

    /// Create an allocator with a fixed seed (reproducible assignments).
    pub fn seeded(range: Range<u16>, seed: u64) -> Result<Self, PortAllocationError> {
        Self::new(range, DeterministicRng::new(seed))
    }

    /// Create an allocator seeded from the clock.
    pub fn from_entropy(range: Range<u16>) -> Result<Self, PortAllocationError> {
        Self::new(range, DeterministicRng::from_entropy())
    }

    /// Port range this allocator draws from.
    pub fn range(&self) -> Range<u16> {
        self.range.clone()
    }

    /// Allocate a port plan for a roster.
    ///
    /// `advertised[i]` holds the ports player `i` offered itself. A player
    /// offering at least `N - 1` ports keeps its first `N - 1` as its pool;
    /// everyone else gets distinct ports from the range, avoiding any
    /// advertised port already claimed.
    pub fn allocate_plan(
        &mut self,
        advertised: &[&[u16]],
    ) -> Result<PortPlan, PortAllocationError> {
        let per_player = advertised.len().saturating_sub(1);

        let mut taken: BTreeSet<u16> = advertised
            .iter()
            .filter(|ports| ports.len() >= per_player)
            .flat_map(|ports| ports[..per_player].iter().copied())
            .collect();

        let drawing = advertised
            .iter()
            .filter(|ports| ports.len() < per_player)
            .count();
        let requested = drawing * per_player;
        let reserved_in_range = taken.range(self.range.clone()).count();
        let available = self.range.len() - reserved_in_range;
        if requested > available {
            return Err(PortAllocationError::Exhausted { requested, available });
        }

        let mut pools = Vec::with_capacity(advertised.len());
        for ports in advertised {
            if ports.len() >= per_player {
                pools.push(ports[..per_player].to_vec());
                continue;
            }
            let mut pool = Vec::with_capacity(per_player);
            for _ in 0..per_player {
                let port = self.draw(&mut taken).ok_or(PortAllocationError::Exhausted {
                    requested,
                    available,
                })?;
                pool.push(port);
            }
            pools.push(pool);
        }

        PortPlan::from_pools(pools)
    }

    /// Draw one unused port: random start, then linear probe.
    fn draw(&mut self, taken: &mut BTreeSet<u16>) -> Option<u16> {
        let span = self.range.len() as u32;
        let offset = self.rng.next_int(span);
        for step in 0..span {
            let port = self.range.start + ((offset + step) % span) as u16;
            if taken.insert(port) {
                return Some(port);
            }
        }
        None
    }
}
