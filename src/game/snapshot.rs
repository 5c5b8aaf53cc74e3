//! Snapshot building for network transmission

use std::collections::HashMap;
use uuid::Uuid;

use crate::ws::protocol::{PlayerWire, ServerMsg, StateSnapshot};

use super::simulation::SimulationState;

/// Builds the once-per-tick full-state snapshot.
///
/// Tracks the last input sequence *received* per player, recorded when the
/// input is buffered rather than when it is applied. Clients must treat an
/// echoed sequence as "the server has it", not "this snapshot reflects it".
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    last_input_seq: HashMap<Uuid, i64>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received input sequence. Monotonic per player: a stale or
    /// duplicate sequence never lowers the acknowledged value.
    pub fn record_received(&mut self, player_id: Uuid, seq: i64) {
        let entry = self.last_input_seq.entry(player_id).or_insert(seq);
        if seq > *entry {
            *entry = seq;
        }
    }

    /// Drop a leaving player's acknowledgment entry.
    pub fn forget_player(&mut self, player_id: Uuid) {
        self.last_input_seq.remove(&player_id);
    }

    /// Build the snapshot message for the current state.
    pub fn build(&self, state: &SimulationState) -> ServerMsg {
        let players: Vec<PlayerWire> = state
            .players
            .values()
            .map(|p| PlayerWire {
                player_id: p.id,
                x: p.x,
                y: p.y,
                vx: p.vx,
                vy: p.vy,
                grounded: p.grounded,
                ground_y: p.ground_y,
                movement_state: p.movement,
                movement_state_start_tick: p.movement_since,
                action_state: p.action.map(|a| a.kind),
                action_state_start_tick: p.action.map(|a| a.start_tick),
            })
            .collect();

        ServerMsg::Snapshot(StateSnapshot {
            session_id: state.session_id,
            server_tick: state.tick,
            players,
            last_input_seq: self.last_input_seq.clone(),
        })
    }
}
