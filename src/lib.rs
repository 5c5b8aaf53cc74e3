//! Brawl game server library
//!
//! The simulation (`game`), wire protocol (`ws::protocol`) and predictor
//! (`client`) are shared: the server binary drives the authoritative
//! session, and a native client embeds the same simulation for local
//! prediction. Keeping them in one crate guarantees both sides run
//! identical tuning and tick logic.

pub mod app;
pub mod assets;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
