// Static gravity profile of the strip.

use super::config::TrackConfig;

/// Neutral gravity value. Below it the strip runs downhill, above it uphill.
pub const BASELINE: f64 = 127.0;

/// Per-position gravity values, built once per track configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMap {
    values: Vec<f64>,
    ramp_center: usize,
    ramp_half_width: usize,
}

impl TerrainMap {
    /// Flat baseline with a single symmetric ramp around the configured center.
    pub fn build(config: &TrackConfig) -> Self {
        let mut map = Self::flat(config.length);
        // A ramp needs a center with a neighbour on both sides.
        if config.length < 3 {
            return map;
        }

        let center = config.ramp_center();
        let half_width = config.ramp_half_width();
        map.ramp_center = center;
        map.ramp_half_width = half_width;
        let start = center.saturating_sub(half_width);
        let end = (center + half_width).min(config.length - 1);
        map.set_ramp(config.ramp_height, start, center, end);
        map
    }

    pub fn flat(length: usize) -> Self {
        Self {
            values: vec![BASELINE; length],
            ramp_center: 0,
            ramp_half_width: 0,
        }
    }

    // Descent over [start, center), baseline at center, ascent over (center, end].
    fn set_ramp(&mut self, height: f64, start: usize, center: usize, end: usize) {
        let down = center - start;
        for i in 0..down {
            self.values[start + i] = BASELINE - i as f64 * (height / down as f64);
        }
        self.values[center] = BASELINE;
        let up = end - center;
        for i in 0..up {
            self.values[center + i + 1] = BASELINE + height - i as f64 * (height / up as f64);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Gravity value at `pos`; positions past the end read as baseline.
    pub fn get(&self, pos: usize) -> f64 {
        self.values.get(pos).copied().unwrap_or(BASELINE)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn ramp_center(&self) -> usize {
        self.ramp_center
    }

    pub fn ramp_half_width(&self) -> usize {
        self.ramp_half_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_length(length: usize) -> TrackConfig {
        TrackConfig {
            length,
            ..TrackConfig::default()
        }
    }

    #[test]
    fn center_is_baseline_for_every_valid_length() {
        for length in 20..=1000 {
            let config = config_with_length(length);
            let terrain = TerrainMap::build(&config);
            assert_eq!(terrain.len(), length);
            assert_eq!(terrain.ramp_center(), config.ramp_center());
            assert_eq!(terrain.get(terrain.ramp_center()), BASELINE, "length {length}");
        }
    }

    #[test]
    fn default_track_has_expected_ramp_profile() {
        let terrain = TerrainMap::build(&TrackConfig::default());
        // center 33, half width 3 => ramp spans 30..=36
        assert_eq!(terrain.get(29), BASELINE);
        assert_eq!(terrain.get(30), BASELINE);
        assert_eq!(terrain.get(31), BASELINE - 4.0);
        assert_eq!(terrain.get(32), BASELINE - 8.0);
        assert_eq!(terrain.get(33), BASELINE);
        assert_eq!(terrain.get(34), BASELINE + 12.0);
        assert_eq!(terrain.get(35), BASELINE + 8.0);
        assert_eq!(terrain.get(36), BASELINE + 4.0);
        assert_eq!(terrain.get(37), BASELINE);
    }

    #[test]
    fn map_carries_the_geometry_it_was_built_with() {
        let terrain = TerrainMap::build(&config_with_length(240));
        assert_eq!(terrain.ramp_center(), 79);
        assert_eq!(terrain.ramp_half_width(), 8);
    }

    #[test]
    fn everything_outside_the_ramp_is_flat() {
        let config = TrackConfig::default();
        let terrain = TerrainMap::build(&config);
        let start = config.ramp_center() - config.ramp_half_width();
        let end = config.ramp_center() + config.ramp_half_width();

        for (pos, value) in terrain.values().iter().enumerate() {
            if pos < start || pos > end {
                assert_eq!(*value, BASELINE, "pos {pos}");
            }
        }
    }

    #[test]
    fn zero_height_ramp_is_flat() {
        let config = TrackConfig {
            ramp_height: 0.0,
            ..TrackConfig::default()
        };
        let terrain = TerrainMap::build(&config);
        assert!(terrain.values().iter().all(|v| *v == BASELINE));
    }

    #[test]
    fn out_of_range_position_reads_as_baseline() {
        let terrain = TerrainMap::build(&TrackConfig::default());
        assert_eq!(terrain.get(10_000), BASELINE);
    }
}
