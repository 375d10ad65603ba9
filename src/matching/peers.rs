//! Peer Tuple Computation
//!
//! Given a completed roster and its port plan, produces for every player the
//! ordered list of peers it must connect to, each with the port pair for
//! that edge.
//!
//! Symmetry guarantee: for every pair `(i, j)`, the `local_port` player `i`
//! receives for `j` equals the `remote_port` player `j` receives for `i`,
//! and vice versa. This follows directly from the slot layout in
//! [`PortPlan`]: both sides of an edge read the same two pool slots.

use std::net::IpAddr;

use crate::core::ports::{PortAllocationError, PortAllocator, PortPlan};
use crate::matching::roster::Registrant;

/// One directed edge "player i reaches player j".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTuple {
    /// Host portion of `j`'s observed connection address.
    pub remote_address: IpAddr,
    /// `j`'s self-reported local address.
    pub remote_advertised_address: String,
    /// Port `i` binds for this edge.
    pub local_port: u16,
    /// Port `j` binds for this edge.
    pub remote_port: u16,
}

/// Compute every player's peer list.
///
/// Entry `i` of the result is player `i`'s peers in increasing position
/// order, skipping `i` itself.
pub fn compute_peer_tuples(
    players: &[Registrant],
    plan: &PortPlan,
) -> Result<Vec<Vec<PeerTuple>>, PortAllocationError> {
    if plan.player_count() != players.len() {
        return Err(PortAllocationError::InconsistentPool {
            position: plan.player_count().min(players.len()),
            expected: players.len().saturating_sub(1),
            actual: 0,
        });
    }

    let mut result = Vec::with_capacity(players.len());
    for i in 0..players.len() {
        let mut peers = Vec::with_capacity(players.len().saturating_sub(1));
        for (j, peer) in players.iter().enumerate() {
            if j == i {
                continue;
            }
            let local_port = plan.port_for(i, j).ok_or_else(|| missing_slot(plan, i))?;
            let remote_port = plan.port_for(j, i).ok_or_else(|| missing_slot(plan, j))?;
            peers.push(PeerTuple {
                remote_address: peer.observed_addr.ip(),
                remote_advertised_address: peer.local_addr.clone(),
                local_port,
                remote_port,
            });
        }
        result.push(peers);
    }

    Ok(result)
}

/// Allocate a port plan for `players` and compute their peer lists.
pub fn assign_peers(
    players: &[Registrant],
    allocator: &mut PortAllocator,
) -> Result<Vec<Vec<PeerTuple>>, PortAllocationError> {
    let advertised: Vec<&[u16]> = players
        .iter()
        .map(|p| p.advertised_ports.as_slice())
        .collect();
    let plan = allocator.allocate_plan(&advertised)?;
    compute_peer_tuples(players, &plan)
}

fn missing_slot(plan: &PortPlan, position: usize) -> PortAllocationError {
    PortAllocationError::InconsistentPool {
        position,
        expected: plan.player_count().saturating_sub(1),
        actual: plan.pool(position).len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ports::DEFAULT_PORT_RANGE;
    use crate::matching::roster::RegistrantId;

    fn registrant(i: usize) -> Registrant {
        Registrant {
            id: RegistrantId(i as u64),
            name: format!("player{i}"),
            local_addr: format!("192.168.1.{}:{}", 10 + i, 9000 + i),
            advertised_ports: Vec::new(),
            observed_addr: format!("203.0.113.{}:{}", 1 + i, 40000 + i).parse().unwrap(),
        }
    }

    fn roster(n: usize) -> Vec<Registrant> {
        (0..n).map(registrant).collect()
    }

    /// Index of `j` within `i`'s peer list.
    fn peer_index(i: usize, j: usize) -> usize {
        if j < i {
            j
        } else {
            j - 1
        }
    }

    fn assert_symmetric(peers: &[Vec<PeerTuple>]) {
        let n = peers.len();
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let forward = &peers[i][peer_index(i, j)];
                let backward = &peers[j][peer_index(j, i)];
                assert_eq!(forward.local_port, backward.remote_port, "edge {i}->{j}");
                assert_eq!(forward.remote_port, backward.local_port, "edge {i}->{j}");
            }
        }
    }

    #[test]
    fn test_two_players_hand_built_plan() {
        let players = roster(2);
        let plan = PortPlan::from_pools(vec![vec![50010], vec![50020]]).unwrap();
        let peers = compute_peer_tuples(&players, &plan).unwrap();

        assert_eq!(peers.len(), 2);
        assert_eq!(
            peers[0],
            vec![PeerTuple {
                remote_address: "203.0.113.2".parse().unwrap(),
                remote_advertised_address: "192.168.1.11:9001".into(),
                local_port: 50010,
                remote_port: 50020,
            }]
        );
        assert_eq!(
            peers[1],
            vec![PeerTuple {
                remote_address: "203.0.113.1".parse().unwrap(),
                remote_advertised_address: "192.168.1.10:9000".into(),
                local_port: 50020,
                remote_port: 50010,
            }]
        );
    }

    #[test]
    fn test_four_players_hand_built_plan() {
        // Pool value encodes (owner, peer) so misrouting is visible
        let players = roster(4);
        let pools: Vec<Vec<u16>> = (0..4)
            .map(|i| {
                (0..4)
                    .filter(|&j| j != i)
                    .map(|j| 50000 + (i * 10 + j) as u16)
                    .collect()
            })
            .collect();
        let plan = PortPlan::from_pools(pools).unwrap();
        let peers = compute_peer_tuples(&players, &plan).unwrap();

        for i in 0..4 {
            let targets: Vec<usize> = (0..4).filter(|&j| j != i).collect();
            assert_eq!(peers[i].len(), 3);
            for (tuple, &j) in peers[i].iter().zip(&targets) {
                assert_eq!(tuple.local_port, 50000 + (i * 10 + j) as u16);
                assert_eq!(tuple.remote_port, 50000 + (j * 10 + i) as u16);
                assert_eq!(tuple.remote_advertised_address, players[j].local_addr);
                assert_eq!(tuple.remote_address, players[j].observed_addr.ip());
            }
        }
        assert_symmetric(&peers);
    }

    #[test]
    fn test_symmetry_exhaustive_over_sizes_and_seeds() {
        for n in 2..=4 {
            for seed in 0..64 {
                let players = roster(n);
                let mut allocator = PortAllocator::seeded(DEFAULT_PORT_RANGE, seed).unwrap();
                let peers = assign_peers(&players, &mut allocator).unwrap();

                assert_eq!(peers.len(), n);
                for list in &peers {
                    assert_eq!(list.len(), n - 1);
                }
                assert_symmetric(&peers);
            }
        }
    }

    #[test]
    fn test_peer_order_skips_self() {
        let players = roster(3);
        let mut allocator = PortAllocator::seeded(DEFAULT_PORT_RANGE, 1).unwrap();
        let peers = assign_peers(&players, &mut allocator).unwrap();

        let names = |i: usize| -> Vec<String> {
            peers[i]
                .iter()
                .map(|t| t.remote_advertised_address.clone())
                .collect()
        };
        assert_eq!(names(0), vec![players[1].local_addr.clone(), players[2].local_addr.clone()]);
        assert_eq!(names(1), vec![players[0].local_addr.clone(), players[2].local_addr.clone()]);
        assert_eq!(names(2), vec![players[0].local_addr.clone(), players[1].local_addr.clone()]);
    }

    #[test]
    fn test_same_and_cross_team_edges_symmetric() {
        // Positions 0 and 2 share a team, 0 and 1 do not; both must pair up
        let players = roster(4);
        let mut allocator = PortAllocator::seeded(DEFAULT_PORT_RANGE, 42).unwrap();
        let peers = assign_peers(&players, &mut allocator).unwrap();

        // 0 -> 2 (same team)
        assert_eq!(peers[0][1].local_port, peers[2][0].remote_port);
        // 1 -> 0 (cross team)
        assert_eq!(peers[1][0].local_port, peers[0][0].remote_port);
        // 3 -> 1 (same team)
        assert_eq!(peers[3][1].local_port, peers[1][2].remote_port);
    }

    #[test]
    fn test_advertised_ports_respected() {
        let mut players = roster(3);
        players[1].advertised_ports = vec![6000, 6001, 6002];
        let mut allocator = PortAllocator::seeded(DEFAULT_PORT_RANGE, 8).unwrap();
        let peers = assign_peers(&players, &mut allocator).unwrap();

        // Player 1 binds its own advertised ports, slot by slot
        assert_eq!(peers[1][0].local_port, 6000);
        assert_eq!(peers[1][1].local_port, 6001);
        // Peers see them as the remote port
        assert_eq!(peers[0][0].remote_port, 6000);
        assert_eq!(peers[2][1].remote_port, 6001);
        assert_symmetric(&peers);
    }

    #[test]
    fn test_ipv6_observed_address_strips_port() {
        let mut players = roster(2);
        players[1].observed_addr = "[2001:db8::7]:41000".parse().unwrap();
        let plan = PortPlan::from_pools(vec![vec![50001], vec![50002]]).unwrap();
        let peers = compute_peer_tuples(&players, &plan).unwrap();

        assert_eq!(peers[0][0].remote_address.to_string(), "2001:db8::7");
    }

    #[test]
    fn test_plan_size_mismatch() {
        let players = roster(3);
        let plan = PortPlan::from_pools(vec![vec![1], vec![2]]).unwrap();
        assert!(matches!(
            compute_peer_tuples(&players, &plan),
            Err(PortAllocationError::InconsistentPool { .. })
        ));
    }
}
