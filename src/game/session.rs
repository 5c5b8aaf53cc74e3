//! Session state and the authoritative tick loop

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info};
use uuid::Uuid;

use crate::assets::manifest::AnimationManifest;
use crate::util::time::{tick_delta, tick_duration, TICK_DURATION_MS};
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::fsm::ActionStateMachine;
use super::physics::Tuning;
use super::simulation::Simulation;
use super::snapshot::SnapshotBuilder;
use super::{InputCommand, SessionInput};

/// Join requests beyond this are rejected with a `session_full` error
pub const MAX_SESSION_PLAYERS: usize = 16;

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<SessionInput>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    pub player_count: Arc<AtomicUsize>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }
}

/// Registry of all active sessions
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, h)| h)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_players(&self) -> usize {
        self.sessions.iter().map(|s| s.value().player_count()).sum()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game session.
///
/// Owns one [`Simulation`]; nothing else ever mutates it. Network-facing
/// callbacks post [`SessionInput`] messages onto the input channel and the
/// tick loop drains them fully before every step.
pub struct GameSession {
    sim: Simulation,
    snapshot_builder: SnapshotBuilder,
    input_rx: mpsc::Receiver<SessionInput>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    max_players: usize,
}

impl GameSession {
    /// Create a new session. Action timing comes from the animation
    /// manifest so overlay durations track the configured clips.
    pub fn new(id: Uuid, manifest: &AnimationManifest, tuning: Tuning) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = SessionHandle {
            id,
            input_tx,
            snapshot_tx: snapshot_tx.clone(),
            player_count: player_count.clone(),
        };

        let (jab_frames, jab_frame_ms) = manifest.jab_timing();
        let actions = ActionStateMachine::new(
            TICK_DURATION_MS,
            jab_frames,
            jab_frame_ms,
            tuning.action_debounce_ticks,
        );

        let session = Self {
            sim: Simulation::new(id, tuning, actions),
            snapshot_builder: SnapshotBuilder::new(),
            input_rx,
            snapshot_tx,
            player_count,
            max_players: MAX_SESSION_PLAYERS,
        };

        (session, handle)
    }

    #[cfg(test)]
    fn with_max_players(mut self, max_players: usize) -> Self {
        self.max_players = max_players;
        self
    }

    /// Run the authoritative tick loop.
    ///
    /// Missed intervals are skipped rather than replayed: an overrunning
    /// step sheds load and realigns to the next tick boundary. The loop
    /// exits between ticks once every handle to the input channel is gone.
    pub async fn run(mut self) {
        info!(session_id = %self.sim.state().session_id, "Session started");

        let mut ticker = interval(tick_duration());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if !self.process_inputs() {
                break;
            }

            self.sim.step(tick_delta());

            let snapshot = self.snapshot_builder.build(self.sim.state());
            // A failed send just means no receivers right now; the next
            // tick's full snapshot supersedes this one anyway
            let _ = self.snapshot_tx.send(snapshot);
        }

        info!(session_id = %self.sim.state().session_id, "Session stopped");
    }

    /// Drain every pending message, in arrival order. Returns false once
    /// the channel is closed and empty.
    fn process_inputs(&mut self) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => self.apply(input),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn apply(&mut self, input: SessionInput) {
        match input {
            SessionInput::Join { player_id } => self.handle_join(player_id),
            SessionInput::Leave { player_id } => self.handle_leave(player_id, "disconnected"),
            SessionInput::Msg { player_id, msg, .. } => match msg {
                ClientMsg::Input {
                    seq,
                    client_tick,
                    up,
                    down,
                    left,
                    right,
                    attack,
                    jump,
                    ..
                } => {
                    // Identity comes from the connection, never the payload
                    self.handle_input(
                        player_id,
                        InputCommand {
                            player_id,
                            seq,
                            client_tick,
                            up,
                            down,
                            left,
                            right,
                            attack,
                            jump,
                        },
                    );
                }
                ClientMsg::Ping { t } => {
                    let _ = self.snapshot_tx.send(ServerMsg::Pong { t });
                }
                ClientMsg::Leave => self.handle_leave(player_id, "left"),
            },
        }
    }

    fn handle_join(&mut self, player_id: Uuid) {
        if self.sim.contains_player(player_id) {
            debug!(player_id = %player_id, "Player already in session");
            return;
        }

        if self.sim.player_count() >= self.max_players {
            let _ = self.snapshot_tx.send(ServerMsg::Error {
                code: "session_full".to_string(),
                message: "Session is full".to_string(),
            });
            return;
        }

        self.sim.add_player(player_id);
        self.player_count
            .store(self.sim.player_count(), Ordering::Relaxed);

        let _ = self.snapshot_tx.send(ServerMsg::PlayerJoined { player_id });

        info!(
            session_id = %self.sim.state().session_id,
            player_id = %player_id,
            player_count = self.sim.player_count(),
            "Player joined session"
        );
    }

    fn handle_input(&mut self, player_id: Uuid, input: InputCommand) {
        if !self.sim.contains_player(player_id) {
            return;
        }
        // Acknowledged as *received*, before the step that applies it runs
        self.snapshot_builder.record_received(player_id, input.seq);
        self.sim.enqueue_input(player_id, input);
    }

    fn handle_leave(&mut self, player_id: Uuid, reason: &str) {
        if !self.sim.contains_player(player_id) {
            return;
        }

        // Record, buffered input and ack entry go together
        self.sim.remove_player(player_id);
        self.snapshot_builder.forget_player(player_id);
        self.player_count
            .store(self.sim.player_count(), Ordering::Relaxed);

        let _ = self.snapshot_tx.send(ServerMsg::PlayerLeft {
            player_id,
            reason: reason.to_string(),
        });

        info!(
            session_id = %self.sim.state().session_id,
            player_id = %player_id,
            "Player left session"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::unix_millis;
    use crate::ws::protocol::StateSnapshot;
    use std::time::Duration;
    use tokio::time::timeout;

    fn spawn_session() -> SessionHandle {
        let manifest = AnimationManifest::default_manifest();
        let (session, handle) = GameSession::new(Uuid::new_v4(), &manifest, Tuning::default());
        tokio::spawn(session.run());
        handle
    }

    fn spawn_session_with_capacity(max_players: usize) -> SessionHandle {
        let manifest = AnimationManifest::default_manifest();
        let (session, handle) = GameSession::new(Uuid::new_v4(), &manifest, Tuning::default());
        tokio::spawn(session.with_max_players(max_players).run());
        handle
    }

    async fn next_snapshot(rx: &mut broadcast::Receiver<ServerMsg>) -> StateSnapshot {
        loop {
            let msg = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for snapshot")
                .expect("broadcast closed");
            if let ServerMsg::Snapshot(snapshot) = msg {
                return snapshot;
            }
        }
    }

    /// Snapshots race with message delivery; scan a bounded number of
    /// them until the expected state shows up.
    async fn wait_for(
        rx: &mut broadcast::Receiver<ServerMsg>,
        mut pred: impl FnMut(&StateSnapshot) -> bool,
    ) -> StateSnapshot {
        for _ in 0..40 {
            let snapshot = next_snapshot(rx).await;
            if pred(&snapshot) {
                return snapshot;
            }
        }
        panic!("expected state never showed up in a snapshot");
    }

    fn input_msg(seq: i64, right: bool) -> ClientMsg {
        ClientMsg::Input {
            player_id: None,
            seq,
            client_tick: 0,
            up: false,
            down: false,
            left: false,
            right,
            attack: false,
            jump: false,
        }
    }

    #[tokio::test]
    async fn session_broadcasts_snapshots_with_received_acks() {
        let handle = spawn_session();
        let mut rx = handle.snapshot_tx.subscribe();
        let player_id = Uuid::new_v4();

        handle
            .input_tx
            .send(SessionInput::Join { player_id })
            .await
            .unwrap();
        handle
            .input_tx
            .send(SessionInput::Msg {
                player_id,
                msg: input_msg(1, true),
                received_at: unix_millis(),
            })
            .await
            .unwrap();

        let snapshot = wait_for(&mut rx, |s| {
            s.player(player_id).is_some() && s.last_input_seq.get(&player_id) == Some(&1)
        })
        .await;

        // Ticks advance between snapshots
        let later = next_snapshot(&mut rx).await;
        assert!(later.server_tick > snapshot.server_tick);
    }

    #[tokio::test]
    async fn leave_drops_record_and_ack_atomically() {
        let handle = spawn_session();
        let mut rx = handle.snapshot_tx.subscribe();
        let player_id = Uuid::new_v4();

        handle
            .input_tx
            .send(SessionInput::Join { player_id })
            .await
            .unwrap();
        handle
            .input_tx
            .send(SessionInput::Msg {
                player_id,
                msg: input_msg(5, false),
                received_at: unix_millis(),
            })
            .await
            .unwrap();
        handle
            .input_tx
            .send(SessionInput::Leave { player_id })
            .await
            .unwrap();

        // Both the record and the ack entry are gone in the same snapshot
        let snapshot = wait_for(&mut rx, |s| s.player(player_id).is_none()).await;
        assert!(!snapshot.last_input_seq.contains_key(&player_id));
        assert_eq!(handle.player_count(), 0);
    }

    #[tokio::test]
    async fn acks_stay_monotonic_across_snapshots() {
        let handle = spawn_session();
        let mut rx = handle.snapshot_tx.subscribe();
        let player_id = Uuid::new_v4();

        handle
            .input_tx
            .send(SessionInput::Join { player_id })
            .await
            .unwrap();

        let mut last_ack = 0;
        for seq in [2_i64, 4, 3, 6] {
            handle
                .input_tx
                .send(SessionInput::Msg {
                    player_id,
                    msg: input_msg(seq, true),
                    received_at: unix_millis(),
                })
                .await
                .unwrap();

            let snapshot = next_snapshot(&mut rx).await;
            if let Some(&ack) = snapshot.last_input_seq.get(&player_id) {
                assert!(ack >= last_ack);
                last_ack = ack;
            }
        }
        // Out-of-order seq 3 must never have lowered the ack below 4
        wait_for(&mut rx, |s| s.last_input_seq.get(&player_id) == Some(&6)).await;
    }

    #[tokio::test]
    async fn join_beyond_capacity_is_rejected_with_an_error() {
        let handle = spawn_session_with_capacity(2);
        let mut rx = handle.snapshot_tx.subscribe();

        for _ in 0..3 {
            handle
                .input_tx
                .send(SessionInput::Join {
                    player_id: Uuid::new_v4(),
                })
                .await
                .unwrap();
        }

        // The third join gets a session_full error instead of a record
        loop {
            let msg = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for session_full")
                .expect("broadcast closed");
            if let ServerMsg::Error { code, .. } = msg {
                assert_eq!(code, "session_full");
                break;
            }
        }

        wait_for(&mut rx, |s| s.players.len() == 2).await;
        assert_eq!(handle.player_count(), 2);
    }
}
