//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::game::fsm::{ActionKind, MovementState};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Player input for the current tick.
    Input {
        /// Client-supplied identity; the server ignores this and uses the
        /// authenticated connection identity instead
        #[serde(default)]
        player_id: Option<Uuid>,
        /// Client input sequence, monotonic per connection
        seq: i64,
        /// Advisory client tick, currently unused by the server
        #[serde(default)]
        client_tick: i64,
        up: bool,
        down: bool,
        left: bool,
        right: bool,
        attack: bool,
        jump: bool,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the session
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { player_id: Uuid, server_time: u64 },

    /// Player joined the session
    PlayerJoined { player_id: Uuid },

    /// Player left the session
    PlayerLeft { player_id: Uuid, reason: String },

    /// Full game state, sent once per tick
    Snapshot(StateSnapshot),

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Full-state snapshot broadcast to every client in the session.
///
/// Snapshots are level-triggered: a dropped one is superseded by the next
/// tick's, never retried or patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub session_id: Uuid,
    /// Server tick the snapshot was produced at
    pub server_tick: u64,
    /// All player records
    pub players: Vec<PlayerWire>,
    /// Last input sequence the server has *received* per player. This is
    /// an at-least-once signal recorded at buffering time; it does not
    /// mean the input's physics effect has landed in this snapshot.
    pub last_input_seq: HashMap<Uuid, i64>,
}

impl StateSnapshot {
    pub fn player(&self, id: Uuid) -> Option<&PlayerWire> {
        self.players.iter().find(|p| p.player_id == id)
    }
}

/// One player's replicated fields in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerWire {
    pub player_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub grounded: bool,
    pub ground_y: f32,
    pub movement_state: MovementState,
    pub movement_state_start_tick: u64,
    pub action_state: Option<ActionKind>,
    pub action_state_start_tick: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_input_round_trips_without_player_id() {
        let json = r#"{"type":"input","seq":7,"up":false,"down":false,"left":true,"right":false,"attack":true,"jump":false}"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        match msg {
            ClientMsg::Input {
                player_id,
                seq,
                left,
                attack,
                ..
            } => {
                assert_eq!(player_id, None);
                assert_eq!(seq, 7);
                assert!(left);
                assert!(attack);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn snapshot_serializes_layer_states_by_name() {
        let snapshot = StateSnapshot {
            session_id: Uuid::nil(),
            server_tick: 42,
            players: vec![PlayerWire {
                player_id: Uuid::nil(),
                x: 1.0,
                y: 0.0,
                vx: 0.0,
                vy: 0.0,
                grounded: true,
                ground_y: 0.0,
                movement_state: MovementState::Run,
                movement_state_start_tick: 40,
                action_state: Some(ActionKind::Jab),
                action_state_start_tick: Some(41),
            }],
            last_input_seq: HashMap::new(),
        };

        let json = serde_json::to_string(&ServerMsg::Snapshot(snapshot)).unwrap();
        assert!(json.contains(r#""type":"snapshot""#));
        assert!(json.contains(r#""movement_state":"run""#));
        assert!(json.contains(r#""action_state":"jab""#));
    }
}
