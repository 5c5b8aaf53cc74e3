//! Game simulation modules

pub mod fsm;
pub mod physics;
pub mod session;
pub mod simulation;
pub mod snapshot;

pub use session::{GameSession, SessionHandle, SessionRegistry};
pub use simulation::Simulation;

use uuid::Uuid;

use crate::ws::protocol::ClientMsg;
use fsm::{ActionKind, ActiveAction, Candidate, MovementState};

/// Message posted from a network-facing callback to a session task. The
/// session drains these before each step, so the step always sees a
/// consistent, fully-applied set of pending inputs.
#[derive(Debug, Clone)]
pub enum SessionInput {
    /// Connection opened; maps 1:1 to `add_player`
    Join { player_id: Uuid },
    /// Connection closed; maps 1:1 to `remove_player`
    Leave { player_id: Uuid },
    /// A parsed client message
    Msg {
        player_id: Uuid,
        msg: ClientMsg,
        received_at: u64,
    },
}

/// The most recent input a client has sent for one tick. Exactly one of
/// these is buffered per player; new arrivals overwrite, never queue.
#[derive(Debug, Clone, Default)]
pub struct InputCommand {
    pub player_id: Uuid,
    /// Client-assigned, monotonically increasing per connection
    pub seq: i64,
    /// Advisory client tick, currently unused by the server
    pub client_tick: i64,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub attack: bool,
    pub jump: bool,
}

/// Canonical per-player state (authoritative).
///
/// Debounce candidates for both FSM layers live on the record itself so
/// that removing a player cannot leave orphaned bookkeeping behind.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: Uuid,

    // Position and movement (+Y is up)
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub grounded: bool,
    /// Y value treated as the floor for this player
    pub ground_y: f32,

    // Layered FSM state
    pub movement: MovementState,
    pub movement_since: u64,
    pub action: Option<ActiveAction>,
    pub last_activity_tick: u64,

    pub movement_candidate: Option<Candidate<MovementState>>,
    pub action_candidate: Option<Candidate<ActionKind>>,
}

impl PlayerRecord {
    /// A freshly joined player: idle, resting on the baseline, no velocity.
    pub fn new(id: Uuid, tick: u64) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            grounded: true,
            ground_y: 0.0,
            movement: MovementState::Idle,
            movement_since: tick,
            action: None,
            last_activity_tick: tick,
            movement_candidate: None,
            action_candidate: None,
        }
    }
}
