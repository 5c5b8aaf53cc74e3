//! Layered player state machines
//!
//! Two independent tracks run over the same record: the movement layer
//! classifies locomotion (idle/run/jump/fall) and the action layer holds
//! timed overlays such as attacks. Neither layer reads the other, so a
//! player can be running with an active jab.
//!
//! Both layers debounce: a computed desired state must hold for a
//! configured number of consecutive ticks before the transition commits,
//! which filters single-tick velocity blips from input flicker.

use serde::{Deserialize, Serialize};

use super::{InputCommand, PlayerRecord};

/// Velocities below this are treated as rest
pub const VELOCITY_EPSILON: f32 = 1e-4;

/// A sustained-transition candidate for one FSM layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<T> {
    pub desired: T,
    pub since_tick: u64,
}

/// Movement-layer states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    Idle,
    Run,
    Jump,
    Fall,
}

impl MovementState {
    /// Higher value wins when several predicates hold
    pub fn priority(self) -> i32 {
        match self {
            MovementState::Jump => 20,
            MovementState::Fall => 15,
            MovementState::Run => 10,
            MovementState::Idle => 10,
        }
    }

    /// Entry predicate over the post-integration record
    pub fn can_enter(self, record: &PlayerRecord) -> bool {
        match self {
            MovementState::Idle => {
                record.vx.abs() < VELOCITY_EPSILON && record.vy.abs() < VELOCITY_EPSILON
            }
            MovementState::Run => record.grounded && record.vx.abs() >= VELOCITY_EPSILON,
            MovementState::Jump => !record.grounded && record.vy > 0.0,
            MovementState::Fall => !record.grounded && record.vy <= 0.0,
        }
    }
}

/// Action-layer state kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Jab,
}

/// An action currently running on a player, with the tick it entered at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveAction {
    pub kind: ActionKind,
    pub start_tick: u64,
}

/// Movement-layer evaluator. Stateless apart from its debounce count; the
/// per-player candidate lives on the record.
#[derive(Debug, Clone, Copy)]
pub struct MovementStateMachine {
    debounce_ticks: u64,
}

impl MovementStateMachine {
    // Priority order, highest first
    const STATES: [MovementState; 4] = [
        MovementState::Jump,
        MovementState::Fall,
        MovementState::Run,
        MovementState::Idle,
    ];

    pub fn new(debounce_ticks: u64) -> Self {
        Self { debounce_ticks }
    }

    /// Evaluate once per tick, after integration.
    pub fn evaluate(&self, record: &mut PlayerRecord, tick: u64) {
        let desired = Self::STATES
            .into_iter()
            .find(|s| s.can_enter(record))
            .unwrap_or(MovementState::Idle);

        match record.movement_candidate {
            Some(cand) if cand.desired == desired => {
                let sustained = tick - cand.since_tick;
                if sustained >= self.debounce_ticks && record.movement != desired {
                    self.exit(record, record.movement, tick);
                    self.enter(record, desired, tick);
                }
            }
            _ => {
                // New candidate, wait for it to sustain
                record.movement_candidate = Some(Candidate {
                    desired,
                    since_tick: tick,
                });
            }
        }
    }

    fn enter(&self, record: &mut PlayerRecord, state: MovementState, tick: u64) {
        record.movement = state;
        record.movement_since = tick;
        record.last_activity_tick = tick;
    }

    fn exit(&self, _record: &mut PlayerRecord, _state: MovementState, _tick: u64) {
        // Movement states carry no exit side effects today
    }
}

/// Description of one registered action
#[derive(Debug, Clone, Copy)]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub priority: i32,
    pub duration_ticks: u64,
    /// A strictly higher-priority trigger may pre-empt this action mid-run
    pub interruptible: bool,
}

impl ActionSpec {
    /// Whether this action should trigger on the current input. Only
    /// consulted while no action is active.
    fn triggered(&self, input: Option<&InputCommand>) -> bool {
        match self.kind {
            ActionKind::Jab => input.is_some_and(|i| i.attack),
        }
    }
}

/// Action-layer evaluator with its registered actions, ordered by
/// descending priority.
#[derive(Debug, Clone)]
pub struct ActionStateMachine {
    specs: Vec<ActionSpec>,
    debounce_ticks: u64,
}

impl ActionStateMachine {
    /// Build the reference configuration: a single non-interruptible jab
    /// whose duration derives from its animation clip timing.
    pub fn new(
        tick_duration_ms: u64,
        jab_frame_count: u64,
        jab_frame_duration_ms: u64,
        debounce_ticks: u64,
    ) -> Self {
        let duration_ticks = (jab_frame_count * jab_frame_duration_ms / tick_duration_ms).max(1);
        Self::with_specs(
            vec![ActionSpec {
                kind: ActionKind::Jab,
                priority: 10,
                duration_ticks,
                interruptible: false,
            }],
            debounce_ticks,
        )
    }

    /// Build from an explicit action list, highest priority evaluated first.
    pub fn with_specs(mut specs: Vec<ActionSpec>, debounce_ticks: u64) -> Self {
        specs.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            specs,
            debounce_ticks,
        }
    }

    pub fn duration_of(&self, kind: ActionKind) -> Option<u64> {
        self.spec(kind).map(|s| s.duration_ticks)
    }

    fn spec(&self, kind: ActionKind) -> Option<&ActionSpec> {
        self.specs.iter().find(|s| s.kind == kind)
    }

    /// Evaluate once per tick, after the movement layer.
    pub fn evaluate(&self, record: &mut PlayerRecord, input: Option<&InputCommand>, tick: u64) {
        if let Some(active) = record.action {
            match self.spec(active.kind) {
                // Configuration changed under a running action: clear the
                // layer rather than fail the tick
                None => {
                    record.action = None;
                    record.action_candidate = None;
                }
                Some(spec) => {
                    let elapsed = tick.saturating_sub(active.start_tick);
                    if elapsed >= spec.duration_ticks {
                        record.action = None;
                    } else if spec.interruptible {
                        // A strictly higher-priority trigger pre-empts an
                        // interruptible action immediately
                        let preempting = self
                            .specs
                            .iter()
                            .find(|s| s.priority > spec.priority && s.triggered(input));
                        if let Some(next) = preempting {
                            record.action = Some(ActiveAction {
                                kind: next.kind,
                                start_tick: tick,
                            });
                            record.last_activity_tick = tick;
                        }
                    }
                }
            }
            return;
        }

        // First registered action whose trigger holds, highest priority first
        let Some(spec) = self.specs.iter().find(|s| s.triggered(input)) else {
            return;
        };

        match record.action_candidate {
            Some(cand) if cand.desired == spec.kind => {
                let sustained = tick - cand.since_tick;
                if sustained >= self.debounce_ticks {
                    record.action = Some(ActiveAction {
                        kind: spec.kind,
                        start_tick: tick,
                    });
                    record.last_activity_tick = tick;
                }
            }
            _ => {
                record.action_candidate = Some(Candidate {
                    desired: spec.kind,
                    since_tick: tick,
                });
            }
        }
    }
}
