//! Adaptive peak detection over envelope energy.

use lumina_core::config::DetectorConfig;

/// Turns a continuous energy stream into discrete peak events.
///
/// Keeps an exponential moving average of the energy and a slowly creeping
/// noise floor. A sample is a peak when it clears
/// `max(min_threshold, ema + margin)` and the previous peak lies at least
/// `cooldown_ms` in the past.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    config: DetectorConfig,
    ema: f32,
    floor: f32,
    last_peak_ms: Option<u64>,
}

impl PeakDetector {
    pub const fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            ema: 0.0,
            floor: 0.0,
            last_peak_ms: None,
        }
    }

    /// Feed one sample taken at `elapsed_ms`. Returns whether it is a peak.
    pub fn update(&mut self, energy: f32, elapsed_ms: u64) -> bool {
        let energy = if energy.is_finite() { energy } else { 0.0 };
        let alpha = self.config.alpha;

        self.ema = (1.0 - alpha).mul_add(self.ema, alpha * energy);
        self.floor = (self.floor + self.config.floor_increment).min(self.ema * self.config.floor_ratio);

        let cooled = match self.last_peak_ms {
            // Time went backwards (seek or clock-master correction): re-anchor
            Some(last) if elapsed_ms < last => {
                self.last_peak_ms = Some(elapsed_ms);
                false
            }
            Some(last) => elapsed_ms - last >= self.config.cooldown_ms,
            None => true,
        };

        if cooled && energy > self.threshold() {
            self.last_peak_ms = Some(elapsed_ms);
            true
        } else {
            false
        }
    }

    /// Level a sample must exceed to count as a peak.
    pub fn threshold(&self) -> f32 {
        self.config.min_threshold.max(self.ema + self.config.margin)
    }

    /// Energy below which the contour is switched off.
    pub const fn gate(&self) -> f32 {
        self.config.low_energy_floor
    }

    pub const fn floor(&self) -> f32 {
        self.floor
    }

    pub const fn ema(&self) -> f32 {
        self.ema
    }

    pub const fn last_peak_ms(&self) -> Option<u64> {
        self.last_peak_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fires_on_burst() {
        let mut detector = PeakDetector::new(DetectorConfig::default());
        assert!(!detector.update(0.0, 0));
        assert!(!detector.update(0.1, 20));
        assert!(detector.update(1.0, 40));
        assert_eq!(detector.last_peak_ms(), Some(40));
    }

    #[test]
    fn test_quiet_signal_never_fires() {
        let mut detector = PeakDetector::new(DetectorConfig::default());
        for i in 0..500 {
            assert!(!detector.update(0.3, i * 16));
        }
    }

    #[test]
    fn test_cooldown_suppresses_second_peak() {
        let config = DetectorConfig {
            cooldown_ms: 120,
            ..DetectorConfig::default()
        };
        let mut detector = PeakDetector::new(config);
        assert!(detector.update(1.0, 0));
        assert!(!detector.update(0.0, 60));
        assert!(!detector.update(1.0, 100));
        assert!(detector.update(1.0, 140));
    }

    #[test]
    fn test_backwards_time_reanchors_cooldown() {
        let mut detector = PeakDetector::new(DetectorConfig::default());
        assert!(detector.update(1.0, 1000));
        assert!(!detector.update(1.0, 200));
        assert_eq!(detector.last_peak_ms(), Some(200));
        assert!(!detector.update(1.0, 300));
        assert!(detector.update(1.0, 330));
    }

    #[test]
    fn test_floor_tracks_ema() {
        let mut detector = PeakDetector::new(DetectorConfig::default());
        for i in 0..2000 {
            detector.update(0.5, i * 16);
        }
        assert!((detector.ema() - 0.5).abs() < 0.01);
        // Floor has crept up but stays capped below the average
        assert!(detector.floor() > 0.05);
        assert!(detector.floor() <= detector.ema() * 0.85 + f32::EPSILON);
        // The contour gate does not follow it
        assert!((detector.gate() - 0.05).abs() < f32::EPSILON);
    }

    proptest! {
        #[test]
        fn prop_never_fires_within_cooldown(
            samples in prop::collection::vec((0.0f32..=1.0, 1u64..80), 1..400),
            cooldown_ms in 90u64..=140,
        ) {
            let config = DetectorConfig { cooldown_ms, ..DetectorConfig::default() };
            let mut detector = PeakDetector::new(config);
            let mut elapsed = 0u64;
            let mut last_peak: Option<u64> = None;

            for (energy, step) in samples {
                elapsed += step;
                if detector.update(energy, elapsed) {
                    if let Some(last) = last_peak {
                        prop_assert!(elapsed - last >= cooldown_ms);
                    }
                    last_peak = Some(elapsed);
                }
            }
        }
    }
}
