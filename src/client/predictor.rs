//! Client-side prediction for the local player
//!
//! Keeps a private simulation mirror containing only the local player and
//! advances it with a fixed-step accumulator, so prediction runs at the
//! server's tick cadence regardless of render frame rate. Remote players
//! are never predicted; they render straight from the latest snapshot.

use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::assets::manifest::AnimationManifest;
use crate::game::fsm::ActionStateMachine;
use crate::game::physics::Tuning;
use crate::game::{InputCommand, PlayerRecord, Simulation};
use crate::util::time::{tick_delta, tick_duration, TICK_DURATION_MS};
use crate::ws::protocol::{PlayerWire, StateSnapshot};

pub struct ClientPredictor {
    local_id: Uuid,
    sim: Simulation,
    /// Owned fixed-step accumulator, fed by render-frame deltas
    accumulator: Duration,
    next_seq: i64,
    /// Inputs sent but not yet acknowledged as received by the server
    pending_inputs: Vec<InputCommand>,
    /// Latest snapshot state for everyone but the local player
    remotes: HashMap<Uuid, PlayerWire>,
    last_server_tick: u64,
}

impl ClientPredictor {
    /// The tuning must match the server's exactly or prediction diverges.
    pub fn new(
        local_id: Uuid,
        session_id: Uuid,
        manifest: &AnimationManifest,
        tuning: Tuning,
    ) -> Self {
        let (jab_frames, jab_frame_ms) = manifest.jab_timing();
        let actions = ActionStateMachine::new(
            TICK_DURATION_MS,
            jab_frames,
            jab_frame_ms,
            tuning.action_debounce_ticks,
        );
        let mut sim = Simulation::new(session_id, tuning, actions);
        sim.add_player(local_id);

        Self {
            local_id,
            sim,
            accumulator: Duration::ZERO,
            next_seq: 0,
            pending_inputs: Vec::new(),
            remotes: HashMap::new(),
            last_server_tick: 0,
        }
    }

    pub fn local_player(&self) -> Option<&PlayerRecord> {
        self.sim.state().players.get(&self.local_id)
    }

    /// Remote players as last seen in a snapshot
    pub fn remote_players(&self) -> impl Iterator<Item = &PlayerWire> {
        self.remotes.values()
    }

    pub fn last_server_tick(&self) -> u64 {
        self.last_server_tick
    }

    /// Inputs awaiting a received-acknowledgment from the server
    pub fn pending_inputs(&self) -> &[InputCommand] {
        &self.pending_inputs
    }

    /// Build the next outgoing input with a fresh sequence number and
    /// remember it until the server acknowledges receipt.
    pub fn compose_input(
        &mut self,
        up: bool,
        down: bool,
        left: bool,
        right: bool,
        attack: bool,
        jump: bool,
    ) -> InputCommand {
        self.next_seq += 1;
        let input = InputCommand {
            player_id: self.local_id,
            seq: self.next_seq,
            client_tick: self.sim.state().tick as i64,
            up,
            down,
            left,
            right,
            attack,
            jump,
        };
        self.pending_inputs.push(input.clone());
        input
    }

    /// Called once per render frame with the elapsed wall-clock time.
    /// Steps the mirror zero or more times, carrying the remainder in the
    /// accumulator. Returns how many fixed steps were taken.
    pub fn advance(&mut self, frame_dt: Duration, input: Option<&InputCommand>) -> u32 {
        self.accumulator += frame_dt;
        let step = tick_duration();
        let mut steps = 0;

        while self.accumulator >= step {
            if let Some(input) = input {
                self.sim.enqueue_input(self.local_id, input.clone());
            }
            self.sim.step(tick_delta());
            self.accumulator -= step;
            steps += 1;
        }

        steps
    }

    /// Reconcile against an authoritative snapshot: hard-overwrite the
    /// local player's record and replace the remote-player cache.
    ///
    /// The echoed sequence means the server *received* those inputs, not
    /// that this snapshot already reflects their physics effect.
    pub fn apply_snapshot(&mut self, snapshot: &StateSnapshot) {
        self.last_server_tick = snapshot.server_tick;
        // Start-tick fields in the snapshot are in server ticks; the mirror
        // must count in the same domain for durations to elapse
        self.sim.resync_tick(snapshot.server_tick);

        if let Some(&ack) = snapshot.last_input_seq.get(&self.local_id) {
            self.pending_inputs.retain(|i| i.seq > ack);
        }

        self.remotes.clear();
        for wire in &snapshot.players {
            if wire.player_id == self.local_id {
                self.sim.overwrite_player(wire);
            } else {
                self.remotes.insert(wire.player_id, wire.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::fsm::{ActionKind, MovementState};

    fn predictor() -> ClientPredictor {
        ClientPredictor::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &AnimationManifest::default_manifest(),
            Tuning::default(),
        )
    }

    fn wire(player_id: Uuid) -> PlayerWire {
        PlayerWire {
            player_id,
            x: 12.5,
            y: 3.0,
            vx: 150.0,
            vy: -60.0,
            grounded: false,
            ground_y: 0.0,
            movement_state: MovementState::Fall,
            movement_state_start_tick: 90,
            action_state: Some(ActionKind::Jab),
            action_state_start_tick: Some(88),
        }
    }

    fn snapshot_with(players: Vec<PlayerWire>, acks: HashMap<Uuid, i64>) -> StateSnapshot {
        StateSnapshot {
            session_id: Uuid::new_v4(),
            server_tick: 100,
            players,
            last_input_seq: acks,
        }
    }

    #[test]
    fn accumulator_carries_the_remainder() {
        let mut p = predictor();
        // 30 ms frames against a 50 ms step: 0, 1, 0, 1, ... steps
        assert_eq!(p.advance(Duration::from_millis(30), None), 0);
        assert_eq!(p.advance(Duration::from_millis(30), None), 1);
        assert_eq!(p.advance(Duration::from_millis(30), None), 0);
        assert_eq!(p.advance(Duration::from_millis(30), None), 1);
        assert_eq!(p.sim.state().tick, 2);

        // 20 ms remainder carried; a long stall catches up in one frame
        assert_eq!(p.advance(Duration::from_millis(130), None), 3);
        assert_eq!(p.sim.state().tick, 5);
    }

    #[test]
    fn prediction_matches_an_identically_fed_simulation() {
        let mut p = predictor();
        let local_id = p.local_id;

        let mut reference = Simulation::new(
            Uuid::new_v4(),
            Tuning::default(),
            ActionStateMachine::new(TICK_DURATION_MS, 10, 80, 1),
        );
        reference.add_player(local_id);

        let input = p.compose_input(false, false, false, true, false, false);
        for _ in 0..8 {
            p.advance(tick_duration(), Some(&input));
            reference.enqueue_input(local_id, input.clone());
            reference.step(tick_delta());
        }

        assert_eq!(
            p.local_player().unwrap(),
            &reference.state().players[&local_id]
        );
    }

    #[test]
    fn snapshot_hard_overwrites_the_local_record() {
        let mut p = predictor();
        let local_id = p.local_id;

        // Drift the prediction first
        let input = p.compose_input(false, false, false, true, false, true);
        p.advance(Duration::from_millis(200), Some(&input));

        p.apply_snapshot(&snapshot_with(vec![wire(local_id)], HashMap::new()));

        let record = p.local_player().unwrap();
        assert_eq!(record.x, 12.5);
        assert_eq!(record.y, 3.0);
        assert_eq!(record.vx, 150.0);
        assert_eq!(record.vy, -60.0);
        assert!(!record.grounded);
        assert_eq!(record.movement, MovementState::Fall);
        assert_eq!(record.movement_since, 90);
        let action = record.action.expect("action restored from snapshot");
        assert_eq!(action.kind, ActionKind::Jab);
        assert_eq!(action.start_tick, 88);
        assert_eq!(p.last_server_tick(), 100);
    }

    #[test]
    fn reconciled_action_expires_on_the_server_clock() {
        let mut p = predictor();
        let local_id = p.local_id;

        // Default jab clip is 10 frames x 80 ms = 16 ticks; started at
        // server tick 88 it expires at tick 104
        p.apply_snapshot(&snapshot_with(vec![wire(local_id)], HashMap::new()));
        assert_eq!(p.sim.state().tick, 100);
        assert!(p.local_player().unwrap().action.is_some());

        p.advance(Duration::from_millis(200), None);
        assert!(p.local_player().unwrap().action.is_some());

        p.advance(Duration::from_millis(50), None);
        assert!(p.local_player().unwrap().action.is_none());
    }

    #[test]
    fn remote_players_come_straight_from_the_snapshot() {
        let mut p = predictor();
        let remote_id = Uuid::new_v4();

        p.apply_snapshot(&snapshot_with(
            vec![wire(p.local_id), wire(remote_id)],
            HashMap::new(),
        ));

        let remotes: Vec<_> = p.remote_players().collect();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].player_id, remote_id);

        // A remote that disappears from the next snapshot is dropped
        p.apply_snapshot(&snapshot_with(vec![wire(p.local_id)], HashMap::new()));
        assert_eq!(p.remote_players().count(), 0);
    }

    #[test]
    fn received_ack_prunes_pending_inputs() {
        let mut p = predictor();
        let local_id = p.local_id;
        for _ in 0..3 {
            p.compose_input(false, false, false, true, false, false);
        }
        assert_eq!(p.pending_inputs().len(), 3);

        p.apply_snapshot(&snapshot_with(
            vec![wire(local_id)],
            HashMap::from([(local_id, 2_i64)]),
        ));

        // Sequences 1 and 2 are received by the server; 3 is still in flight
        let pending: Vec<i64> = p.pending_inputs().iter().map(|i| i.seq).collect();
        assert_eq!(pending, vec![3]);
    }
}
