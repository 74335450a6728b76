//! Energy to VU level mapping.

use lumina_core::config::RenderConfig;

/// Compression curve from normalized energy to a meter level.
///
/// `level = floor(clamp(energy * gain, 0, 1) ^ gamma * visual_max)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCurve {
    gain: f32,
    gamma: f32,
    visual_max: u16,
}

impl LevelCurve {
    pub const fn new(gain: f32, gamma: f32, visual_max: u16) -> Self {
        Self {
            gain,
            gamma,
            visual_max,
        }
    }

    pub const fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.gain, config.gamma, config.visual_max())
    }

    /// Apply gain and clamp into `[0, 1]`.
    pub fn compress(&self, energy: f32) -> f32 {
        let scaled = energy * self.gain;
        if scaled.is_finite() {
            scaled.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Meter level for an already compressed value.
    pub fn level_of(&self, compressed: f32) -> u16 {
        let shaped = compressed.clamp(0.0, 1.0).powf(self.gamma);
        let level = (shaped * f32::from(self.visual_max)).floor();
        (level as u16).min(self.visual_max)
    }

    /// Meter level for a raw envelope sample.
    pub fn level(&self, energy: f32) -> u16 {
        self.level_of(self.compress(energy))
    }

    pub const fn visual_max(&self) -> u16 {
        self.visual_max
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_range() {
        let curve = LevelCurve::default();
        assert_eq!(curve.visual_max(), 48);
        assert_eq!(curve.level(0.0), 0);
        assert_eq!(curve.level(1.0), 48);
        // Gain saturates before full scale
        assert_eq!(curve.level(0.8), 48);
    }

    #[test]
    fn test_out_of_range_input() {
        let curve = LevelCurve::new(1.25, 0.85, 48);
        assert_eq!(curve.level(-0.5), 0);
        assert_eq!(curve.level(7.0), 48);
        assert_eq!(curve.level(f32::NAN), 0);
        assert_eq!(curve.level(f32::INFINITY), 0);
    }

    #[test]
    fn test_gamma_lifts_quiet_passages() {
        let linear = LevelCurve::new(1.0, 1.0, 48);
        let compressed = LevelCurve::new(1.0, 0.6, 48);
        assert_eq!(linear.level(0.25), 12);
        assert!(compressed.level(0.25) > 12);
    }

    proptest! {
        #[test]
        fn prop_level_monotonic_and_bounded(
            a in 0.0f32..=1.0,
            b in 0.0f32..=1.0,
            gain in 1.25f32..=1.35,
            gamma in 0.6f32..=0.85,
            visual_max in 1u16..=255,
        ) {
            let curve = LevelCurve::new(gain, gamma, visual_max);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(curve.level(lo) <= curve.level(hi));
            prop_assert!(curve.level(hi) <= visual_max);
        }
    }
}
