//! Animation manifest - per-state sprite clip configuration
//!
//! Consumed by the rendering front-end (served at `/manifest`) and by the
//! action layer to derive overlay durations. The manifest's assumed tick
//! duration must equal the server's actual interval; a mismatch silently
//! desyncs animation speed on clients, not the simulated physics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use tracing::warn;

use crate::util::time::TICK_DURATION_MS;

/// One animation clip: sprite sheet key plus frame timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationClip {
    /// Asset key the renderer resolves to a sprite sheet
    pub asset_key: String,
    pub frame_count: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_duration_ms: u32,
    #[serde(rename = "loop")]
    pub looping: bool,
}

/// Per-state animation configuration plus the tick duration it assumes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationManifest {
    pub tick_duration_ms: u64,
    pub states: HashMap<String, AnimationClip>,
}

/// Manifest loading errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
}

impl AnimationManifest {
    /// Load from a JSON file.
    pub fn load(path: &str) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&contents)?;
        Ok(manifest)
    }

    /// Load from the configured path, falling back to the built-in
    /// manifest on any failure rather than aborting startup.
    pub fn load_or_default(path: Option<&str>) -> Self {
        let manifest = match path {
            None => Self::default_manifest(),
            Some(path) => match Self::load(path) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(path = %path, error = %e, "Falling back to built-in animation manifest");
                    Self::default_manifest()
                }
            },
        };

        if manifest.tick_duration_ms != TICK_DURATION_MS {
            warn!(
                manifest_tick_ms = manifest.tick_duration_ms,
                server_tick_ms = TICK_DURATION_MS,
                "Manifest tick duration differs from server tick; client animation timing will drift"
            );
        }

        manifest
    }

    /// The hardcoded reference configuration.
    pub fn default_manifest() -> Self {
        fn clip(asset_key: &str, frame_count: u32, frame_duration_ms: u32, looping: bool) -> AnimationClip {
            AnimationClip {
                asset_key: asset_key.to_string(),
                frame_count,
                frame_width: 64,
                frame_height: 64,
                frame_duration_ms,
                looping,
            }
        }

        let states = HashMap::from([
            ("idle".to_string(), clip("player_idle", 10, 100, true)),
            ("run".to_string(), clip("player_run", 8, 80, true)),
            ("jump".to_string(), clip("player_jump", 3, 100, false)),
            ("fall".to_string(), clip("player_fall", 3, 100, false)),
            ("jab".to_string(), clip("player_jab", 10, 80, false)),
        ]);

        Self {
            tick_duration_ms: TICK_DURATION_MS,
            states,
        }
    }

    /// Frame count and frame duration of the jab clip, with the built-in
    /// timing as fallback if the configured manifest lacks the state.
    pub fn jab_timing(&self) -> (u64, u64) {
        match self.states.get("jab") {
            Some(clip) => (clip.frame_count as u64, clip.frame_duration_ms as u64),
            None => (10, 80),
        }
    }
}
