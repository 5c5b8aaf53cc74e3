//! Player movement integration
//!
//! Sign convention: +Y is up. Gravity subtracts from `vy`, jumping sets a
//! positive `vy`, and the ground check clamps when `y` falls to
//! `ground_y`. The collision check below uses the same convention; do not
//! mix them.

use super::{InputCommand, PlayerRecord};

/// Tunable movement constants. A client predictor must run with the exact
/// same values as the server or its prediction diverges every tick.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    /// Horizontal speed in units per second
    pub horizontal_speed: f32,
    /// Initial upward velocity when a jump fires
    pub jump_velocity: f32,
    /// Downward acceleration in units per second squared
    pub gravity: f32,
    /// Horizontal control multiplier while airborne (< 1)
    pub air_control: f32,
    /// Consecutive ticks a desired movement state must hold before committing
    pub movement_debounce_ticks: u64,
    /// Consecutive ticks an action trigger must hold before committing
    pub action_debounce_ticks: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            horizontal_speed: 150.0,
            jump_velocity: 500.0,
            gravity: 1200.0,
            air_control: 0.9,
            movement_debounce_ticks: 1,
            action_debounce_ticks: 1,
        }
    }
}

/// Pure integration of one player over one fixed tick
pub struct Integrator;

impl Integrator {
    /// Advance a single player record by `dt` seconds.
    ///
    /// No input is not a fault: horizontal velocity falls back to zero and
    /// gravity still applies while airborne.
    pub fn integrate(
        record: &mut PlayerRecord,
        input: Option<&InputCommand>,
        dt: f32,
        tuning: &Tuning,
    ) {
        // Horizontal velocity straight from directional flags
        record.vx = match input {
            None => 0.0,
            Some(input) => {
                let dx = (input.right as i32 - input.left as i32) as f32;
                let speed = if record.grounded {
                    tuning.horizontal_speed
                } else {
                    tuning.horizontal_speed * tuning.air_control
                };
                dx * speed
            }
        };

        // Jump is an edge trigger: only from the ground
        if let Some(input) = input {
            if input.jump && record.grounded {
                record.grounded = false;
                record.vy = tuning.jump_velocity;
            }
        }

        // Gravity accumulates every airborne tick
        if !record.grounded {
            record.vy -= tuning.gravity * dt;
        }

        // Integrate each axis independently
        record.x += record.vx * dt;
        record.y += record.vy * dt;

        // Ground collision: clamp to baseline and land
        if !record.grounded && record.y <= record.ground_y {
            record.y = record.ground_y;
            record.vy = 0.0;
            record.grounded = true;
        }
    }
}
