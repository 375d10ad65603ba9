//! Protocol Messages
//!
//! JSON payloads carried inside length-prefixed frames.
//! Field names follow the game client's camelCase conventions.

use std::collections::BTreeSet;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::matching::peers::PeerTuple;
use crate::matching::roster::{Registrant, RegistrantId};
use crate::{STARTING_PLAYER_ID, STARTING_TEAM_ID};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Registration sent by a client as its only message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Display name (opaque).
    pub name: String,
    /// Address the client believes it is reachable at.
    pub local_addr: String,
    /// Candidate hole-punching ports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
}

/// Registration payload that parsed but violates field rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationRuleError {
    /// `localAddr` was empty.
    #[error("localAddr must not be empty")]
    EmptyLocalAddr,

    /// An advertised port was 0.
    #[error("advertised port 0 is not usable")]
    ZeroPort,

    /// The same port was advertised twice.
    #[error("advertised port {0} listed more than once")]
    DuplicatePort(u16),
}

impl RegistrationRequest {
    /// Deserialize from JSON bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Serialize to JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Check field rules serde cannot express.
    pub fn validate(&self) -> Result<(), RegistrationRuleError> {
        if self.local_addr.trim().is_empty() {
            return Err(RegistrationRuleError::EmptyLocalAddr);
        }
        let mut seen = BTreeSet::new();
        for &port in &self.ports {
            if port == 0 {
                return Err(RegistrationRuleError::ZeroPort);
            }
            if !seen.insert(port) {
                return Err(RegistrationRuleError::DuplicatePort(port));
            }
        }
        Ok(())
    }

    /// Validate and attach connection identity.
    pub fn into_registrant(
        self,
        id: RegistrantId,
        observed_addr: SocketAddr,
    ) -> Result<Registrant, RegistrationRuleError> {
        self.validate()?;
        Ok(Registrant {
            id,
            name: self.name,
            local_addr: self.local_addr,
            advertised_ports: self.ports,
            observed_addr,
        })
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Everything a player needs to connect to its match peers.
    GameSetup(GameSetup),
}

/// Game setup for one player in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSetup {
    /// Players in the match.
    pub num_players: usize,
    /// Map to load (opaque).
    pub map_name: String,
    /// Player ID (100 + position).
    pub pid: u64,
    /// Team ID (200 + position parity).
    pub tid: u64,
    /// One entry per other player, in position order.
    pub peers: Vec<PeerInfo>,
}

/// Inconsistent game setup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    /// Peer list length does not match `num_players - 1`.
    #[error("Expected {expected} peers, got {actual}")]
    PeerCount {
        /// `num_players - 1`.
        expected: usize,
        /// Peers supplied.
        actual: usize,
    },

    /// Position is outside the match.
    #[error("Position {position} outside match of {num_players}")]
    Position {
        /// Requested position.
        position: usize,
        /// Players in the match.
        num_players: usize,
    },
}

impl GameSetup {
    /// Build the setup for the player at `position`.
    pub fn for_position(
        position: usize,
        num_players: usize,
        map_name: &str,
        peers: &[PeerTuple],
    ) -> Result<Self, SetupError> {
        if position >= num_players {
            return Err(SetupError::Position {
                position,
                num_players,
            });
        }
        let expected = num_players - 1;
        if peers.len() != expected {
            return Err(SetupError::PeerCount {
                expected,
                actual: peers.len(),
            });
        }

        Ok(Self {
            num_players,
            map_name: map_name.to_string(),
            pid: player_id_for(position),
            tid: team_id_for(position),
            peers: peers.iter().map(PeerInfo::from).collect(),
        })
    }
}

/// Player ID for a roster position.
pub fn player_id_for(position: usize) -> u64 {
    STARTING_PLAYER_ID + position as u64
}

/// Team ID for a roster position; adjacent positions alternate teams.
pub fn team_id_for(position: usize) -> u64 {
    STARTING_TEAM_ID + (position % 2) as u64
}

/// Addressing for one peer, as the client expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    /// Peer's observed public host.
    pub remote_addr: String,
    /// Peer's self-reported local address.
    pub local_addr: String,
    /// Port this player binds for the edge.
    #[serde(with = "port_string")]
    pub local_port: u16,
    /// Port the peer binds for the edge.
    #[serde(with = "port_string")]
    pub remote_port: u16,
}

impl From<&PeerTuple> for PeerInfo {
    fn from(tuple: &PeerTuple) -> Self {
        Self {
            remote_addr: tuple.remote_address.to_string(),
            local_addr: tuple.remote_advertised_address.clone(),
            local_port: tuple.local_port,
            remote_port: tuple.remote_port,
        }
    }
}

/// Ports travel as decimal strings for the game client.
mod port_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(port: &u16, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(port)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ServerMessage {
    /// Serialize to JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(last_octet: u8, local_port: u16, remote_port: u16) -> PeerTuple {
        PeerTuple {
            remote_address: format!("198.51.100.{last_octet}").parse().unwrap(),
            remote_advertised_address: format!("10.0.0.{last_octet}:9000"),
            local_port,
            remote_port,
        }
    }

    #[test]
    fn test_registration_parse_minimal() {
        let req = RegistrationRequest::from_slice(br#"{"name":"a","localAddr":"10.0.0.1:9000"}"#)
            .unwrap();
        assert_eq!(req.name, "a");
        assert_eq!(req.local_addr, "10.0.0.1:9000");
        assert!(req.ports.is_empty());
    }

    #[test]
    fn test_registration_parse_with_ports_and_unknown_fields() {
        let req = RegistrationRequest::from_slice(
            br#"{"name":"b","localAddr":"10.0.0.2:9001","ports":[6000,6001],"color":[1,0,0]}"#,
        )
        .unwrap();
        assert_eq!(req.ports, vec![6000, 6001]);
    }

    #[test]
    fn test_registration_parse_failures() {
        // Missing localAddr
        assert!(RegistrationRequest::from_slice(br#"{"name":"a"}"#).is_err());
        // Wrong type
        assert!(RegistrationRequest::from_slice(br#"{"name":1,"localAddr":"x"}"#).is_err());
        // Port out of range
        assert!(
            RegistrationRequest::from_slice(br#"{"name":"a","localAddr":"x","ports":[70000]}"#)
                .is_err()
        );
        // Not JSON
        assert!(RegistrationRequest::from_slice(b"hello").is_err());
    }

    #[test]
    fn test_registration_rules() {
        let mut req = RegistrationRequest {
            name: "a".into(),
            local_addr: "  ".into(),
            ports: vec![],
        };
        assert_eq!(req.validate(), Err(RegistrationRuleError::EmptyLocalAddr));

        req.local_addr = "10.0.0.1:9000".into();
        req.ports = vec![5000, 0];
        assert_eq!(req.validate(), Err(RegistrationRuleError::ZeroPort));

        req.ports = vec![5000, 5001, 5000];
        assert_eq!(req.validate(), Err(RegistrationRuleError::DuplicatePort(5000)));

        req.ports = vec![5000, 5001];
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_into_registrant() {
        let req = RegistrationRequest {
            name: "a".into(),
            local_addr: "10.0.0.1:9000".into(),
            ports: vec![6000],
        };
        let observed: SocketAddr = "203.0.113.9:41234".parse().unwrap();
        let registrant = req.into_registrant(RegistrantId(3), observed).unwrap();

        assert_eq!(registrant.id, RegistrantId(3));
        assert_eq!(registrant.name, "a");
        assert_eq!(registrant.advertised_ports, vec![6000]);
        assert_eq!(registrant.observed_addr, observed);
    }

    #[test]
    fn test_game_setup_ids() {
        let expected = [(100, 200), (101, 201), (102, 200), (103, 201)];
        for (position, (pid, tid)) in expected.iter().enumerate() {
            let peers = vec![
                tuple(1, 50000, 50001),
                tuple(2, 50002, 50003),
                tuple(3, 50004, 50005),
            ];
            let setup = GameSetup::for_position(position, 4, "debugMap", &peers).unwrap();
            assert_eq!(setup.pid, *pid);
            assert_eq!(setup.tid, *tid);
        }
    }

    #[test]
    fn test_game_setup_rejects_inconsistent_batch() {
        let peers = vec![tuple(1, 50000, 50001)];
        assert_eq!(
            GameSetup::for_position(0, 3, "debugMap", &peers),
            Err(SetupError::PeerCount {
                expected: 2,
                actual: 1,
            })
        );
        assert_eq!(
            GameSetup::for_position(2, 2, "debugMap", &peers),
            Err(SetupError::Position {
                position: 2,
                num_players: 2,
            })
        );
    }

    #[test]
    fn test_game_setup_wire_format() {
        let setup = GameSetup::for_position(1, 2, "debugMap", &[tuple(7, 50010, 50020)]).unwrap();
        let json = ServerMessage::GameSetup(setup).to_vec().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();

        assert_eq!(value["type"], "game_setup");
        assert_eq!(value["numPlayers"], 2);
        assert_eq!(value["mapName"], "debugMap");
        assert_eq!(value["pid"], 101);
        assert_eq!(value["tid"], 201);
        assert_eq!(value["peers"][0]["remoteAddr"], "198.51.100.7");
        assert_eq!(value["peers"][0]["localAddr"], "10.0.0.7:9000");
        assert_eq!(value["peers"][0]["localPort"], "50010");
        assert_eq!(value["peers"][0]["remotePort"], "50020");
    }

    #[test]
    fn test_server_message_roundtrip() {
        let setup = GameSetup::for_position(0, 2, "arena", &[tuple(4, 51000, 52000)]).unwrap();
        let msg = ServerMessage::GameSetup(setup);
        let parsed = ServerMessage::from_slice(&msg.to_vec().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }
}
