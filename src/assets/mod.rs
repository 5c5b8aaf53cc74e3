//! Render-facing configuration served to clients

pub mod manifest;
