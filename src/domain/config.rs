// Track configuration shared by the terrain builder, physics and lap tracking.

use serde::{Deserialize, Serialize};

pub const MIN_LENGTH: usize = 20;
pub const MAX_LENGTH: usize = 1000;
pub const MIN_LAPS: u32 = 1;
pub const MAX_LAPS: u32 = 99;
pub const MAX_ACCEL_IMPULSE: f64 = 5.0;
pub const MAX_TRAIL: u32 = 20;
pub const MAX_RAMP_HEIGHT: f64 = 127.0;

/// Immutable parameters of one race.
///
/// Values coming from outside (config file, HTTP API) always pass through
/// [`TrackConfig::clamped`]; out-of-range input is clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Number of discrete positions ("LEDs") on the strip.
    pub length: usize,
    /// Depth/height of the single ramp, in gravity-map units.
    pub ramp_height: f64,
    /// Speed added by one control activation.
    pub accel_impulse: f64,
    /// Per-step friction coefficient.
    pub friction: f64,
    /// Per-step gravity coefficient applied to terrain slope.
    pub gravity: f64,
    /// Completed laps needed to win.
    pub laps_to_win: u32,
    /// Length of the visual trail behind each racer.
    pub trail_length: u32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            length: 100,
            ramp_height: 12.0,
            accel_impulse: 0.2,
            friction: 0.015,
            gravity: 0.003,
            laps_to_win: 5,
            trail_length: 3,
        }
    }
}

impl TrackConfig {
    /// Returns a copy with every field forced into its valid range.
    pub fn clamped(self) -> Self {
        let defaults = Self::default();
        Self {
            length: self.length.clamp(MIN_LENGTH, MAX_LENGTH),
            ramp_height: clamp_real(self.ramp_height, 0.0, MAX_RAMP_HEIGHT, defaults.ramp_height),
            accel_impulse: clamp_real(
                self.accel_impulse,
                0.0,
                MAX_ACCEL_IMPULSE,
                defaults.accel_impulse,
            ),
            friction: clamp_real(self.friction, 0.0, 1.0, defaults.friction),
            gravity: clamp_real(self.gravity, 0.0, 1.0, defaults.gravity),
            laps_to_win: self.laps_to_win.clamp(MIN_LAPS, MAX_LAPS),
            trail_length: self.trail_length.min(MAX_TRAIL),
        }
    }

    /// Ramp center, kept away from both strip ends.
    pub fn ramp_center(&self) -> usize {
        let center = (self.length as f64 * 0.33).round() as usize;
        center.clamp(1, self.length.saturating_sub(2).max(1))
    }

    /// Number of positions covered by each half of the ramp.
    pub fn ramp_half_width(&self) -> usize {
        ((self.length as f64 / 30.0).round() as usize).max(2)
    }
}

// Non-finite input has no meaningful clamp target, so it falls back to the default.
fn clamp_real(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// Clamps a loosely typed integer field (e.g. a form value) into `[min, max]`.
pub fn clamp_count(value: f64, min: u32, max: u32, fallback: u32) -> u32 {
    if value.is_finite() {
        value.round().clamp(min as f64, max as f64) as u32
    } else {
        fallback
    }
}

/// Partial update of a [`TrackConfig`]. Absent fields keep the base value.
///
/// Counts arrive as loose numbers and are rounded into range.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigPatch {
    pub length: Option<f64>,
    pub laps_to_win: Option<f64>,
    pub trail_length: Option<f64>,
    pub accel_impulse: Option<f64>,
    pub friction: Option<f64>,
    pub gravity: Option<f64>,
    pub ramp_height: Option<f64>,
}

impl ConfigPatch {
    pub fn apply_to(&self, base: TrackConfig) -> TrackConfig {
        let mut config = base;
        if let Some(length) = self.length {
            config.length =
                clamp_count(length, MIN_LENGTH as u32, MAX_LENGTH as u32, base.length as u32)
                    as usize;
        }
        if let Some(laps) = self.laps_to_win {
            config.laps_to_win = clamp_count(laps, MIN_LAPS, MAX_LAPS, base.laps_to_win);
        }
        if let Some(trail) = self.trail_length {
            config.trail_length = clamp_count(trail, 0, MAX_TRAIL, base.trail_length);
        }
        config.accel_impulse = self.accel_impulse.unwrap_or(base.accel_impulse);
        config.friction = self.friction.unwrap_or(base.friction);
        config.gravity = self.gravity.unwrap_or(base.gravity);
        config.ramp_height = self.ramp_height.unwrap_or(base.ramp_height);
        config.clamped()
    }
}
