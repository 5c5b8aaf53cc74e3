//! Application state shared across routes

use std::sync::Arc;
use uuid::Uuid;

use crate::assets::manifest::AnimationManifest;
use crate::config::Config;
use crate::game::physics::Tuning;
use crate::game::{GameSession, SessionHandle, SessionRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manifest: Arc<AnimationManifest>,
    pub sessions: Arc<SessionRegistry>,
    /// The session every connection joins (one default session per server)
    pub default_session: SessionHandle,
}

impl AppState {
    /// Build the shared state and spawn the default session's tick loop.
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let manifest = Arc::new(AnimationManifest::load_or_default(
            config.manifest_path.as_deref(),
        ));

        let sessions = Arc::new(SessionRegistry::new());

        let (session, handle) = GameSession::new(Uuid::new_v4(), &manifest, Tuning::default());
        sessions.insert(handle.clone());
        tokio::spawn(session.run());

        Self {
            config,
            manifest,
            sessions,
            default_session: handle,
        }
    }
}
