//! Canonical simulation state and the fixed-step update

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::ws::protocol::PlayerWire;

use super::fsm::{ActionStateMachine, ActiveAction, MovementStateMachine};
use super::physics::{Integrator, Tuning};
use super::{InputCommand, PlayerRecord};

/// Session-wide simulation state. Mutated only by [`Simulation::step`].
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub session_id: Uuid,
    /// Monotonic, incremented by exactly one per step
    pub tick: u64,
    pub players: HashMap<Uuid, PlayerRecord>,
    /// Advisory wall-clock timestamp, never consulted by the integrator
    pub last_updated: DateTime<Utc>,
}

/// One instance per session: owns the player records, the per-player input
/// mailboxes and both FSM layers, and advances them one tick at a time.
///
/// The same type backs the server's authoritative session and the client
/// predictor's local mirror; determinism between the two relies on using
/// identical [`Tuning`] and tick duration.
pub struct Simulation {
    state: SimulationState,
    inputs: HashMap<Uuid, InputCommand>,
    movement: MovementStateMachine,
    actions: ActionStateMachine,
    tuning: Tuning,
}

impl Simulation {
    pub fn new(session_id: Uuid, tuning: Tuning, actions: ActionStateMachine) -> Self {
        Self {
            state: SimulationState {
                session_id,
                tick: 0,
                players: HashMap::new(),
                last_updated: Utc::now(),
            },
            inputs: HashMap::new(),
            movement: MovementStateMachine::new(tuning.movement_debounce_ticks),
            actions,
            tuning,
        }
    }

    /// The live authoritative state. Treat as read-only outside of `step`.
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Add a player with a default record. No-op if already present.
    pub fn add_player(&mut self, id: Uuid) {
        let tick = self.state.tick;
        self.state
            .players
            .entry(id)
            .or_insert_with(|| PlayerRecord::new(id, tick));
    }

    /// Remove a player and every trace of its bookkeeping. Idempotent.
    pub fn remove_player(&mut self, id: Uuid) {
        self.state.players.remove(&id);
        self.inputs.remove(&id);
    }

    pub fn contains_player(&self, id: Uuid) -> bool {
        self.state.players.contains_key(&id)
    }

    pub fn player_count(&self) -> usize {
        self.state.players.len()
    }

    /// Record the latest input for a player, overwriting any unconsumed
    /// one. Input for an unknown player is inert, not an error.
    pub fn enqueue_input(&mut self, id: Uuid, input: InputCommand) {
        if self.state.players.contains_key(&id) {
            self.inputs.insert(id, input);
        }
    }

    /// Advance every player by one tick: integrate, then evaluate the
    /// movement layer, then the action layer. Buffered inputs are consumed
    /// here; a tick with no fresh input integrates neutral.
    pub fn step(&mut self, dt: f32) {
        let tick = self.state.tick;

        for (id, record) in self.state.players.iter_mut() {
            let input = self.inputs.remove(id);
            Integrator::integrate(record, input.as_ref(), dt, &self.tuning);
            self.movement.evaluate(record, tick);
            self.actions.evaluate(record, input.as_ref(), tick);
        }

        self.state.tick += 1;
        self.state.last_updated = Utc::now();
    }

    /// Jump the tick counter to an authoritative value. Only the client
    /// predictor's mirror uses this; the server's counter advances solely
    /// through [`Simulation::step`].
    pub fn resync_tick(&mut self, tick: u64) {
        self.state.tick = tick;
    }

    /// Hard-overwrite one player's replicated fields from an authoritative
    /// snapshot. Used by the client predictor for reconciliation; this is
    /// a full replacement, not smoothed error correction. Debounce
    /// candidates refer to the pre-overwrite timeline and are dropped.
    pub fn overwrite_player(&mut self, wire: &PlayerWire) {
        let Some(record) = self.state.players.get_mut(&wire.player_id) else {
            return;
        };
        record.x = wire.x;
        record.y = wire.y;
        record.vx = wire.vx;
        record.vy = wire.vy;
        record.grounded = wire.grounded;
        record.ground_y = wire.ground_y;
        record.movement = wire.movement_state;
        record.movement_since = wire.movement_state_start_tick;
        record.action = wire
            .action_state
            .zip(wire.action_state_start_tick)
            .map(|(kind, start_tick)| ActiveAction { kind, start_tick });
        record.movement_candidate = None;
        record.action_candidate = None;
    }
}
