//! Per-step render state: envelope energy in, flood-controlled commands out.

use lumina_core::config::{DetectorConfig, RenderConfig};
use lumina_core::{Command, Palette};

use crate::detector::PeakDetector;
use crate::mapper::LevelCurve;

/// Commands produced by a single tick, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub vu: Option<Command>,
    pub contour: Option<Command>,
    pub peak: bool,
}

impl Frame {
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.vu.iter().chain(self.contour.iter())
    }

    pub const fn is_empty(&self) -> bool {
        self.vu.is_none() && self.contour.is_none()
    }
}

/// Everything the render loop remembers about the active step.
///
/// Created fresh on every `play`, so no peak, hue or dedup state leaks from
/// one step into the next.
#[derive(Debug, Clone)]
pub struct RenderState {
    curve: LevelCurve,
    detector: PeakDetector,
    hues: Vec<u8>,
    hue_index: usize,
    contour: Command,
    contour_resend_ms: u64,
    sent_vu: Option<u16>,
    sent_contour: Option<Command>,
    contour_sent_at: u64,
}

impl RenderState {
    pub fn new(render: &RenderConfig, detector: &DetectorConfig, palette: Palette) -> Self {
        Self {
            curve: LevelCurve::from_config(render),
            detector: PeakDetector::new(detector.clone()),
            hues: palette.hue_rotation(render.hue_count, render.hue_spread),
            hue_index: 0,
            contour: Command::ContourOff,
            contour_resend_ms: render.contour_resend_ms,
            sent_vu: None,
            sent_contour: None,
            contour_sent_at: 0,
        }
    }

    /// Process one envelope sample taken at `elapsed_ms`.
    pub fn tick(&mut self, energy: f32, elapsed_ms: u64) -> Frame {
        let compressed = self.curve.compress(energy);
        let level = self.curve.level_of(compressed);
        let peak = self.detector.update(compressed, elapsed_ms);

        if peak {
            let hue = self.hues[self.hue_index % self.hues.len()];
            self.hue_index = (self.hue_index + 1) % self.hues.len();
            self.contour = Command::ContourSolid(hue);
        } else if compressed < self.detector.gate() {
            self.contour = Command::ContourOff;
        }

        Frame {
            vu: self.take_vu(level),
            contour: self.take_contour(elapsed_ms),
            peak,
        }
    }

    /// Dark output while the clock can't be trusted, under the same dedup.
    pub fn neutral(&mut self, elapsed_ms: u64) -> Frame {
        self.contour = Command::ContourOff;
        let vu = self.take_vu(0);
        let contour = if self.sent_contour.as_ref() == Some(&Command::ContourOff) {
            None
        } else {
            self.take_contour(elapsed_ms)
        };
        Frame {
            vu,
            contour,
            peak: false,
        }
    }

    /// Forget what was sent so the next tick re-emits everything.
    pub fn invalidate(&mut self) {
        self.sent_vu = None;
        self.sent_contour = None;
    }

    /// Contour the loop currently wants on the actuators.
    pub const fn contour(&self) -> &Command {
        &self.contour
    }

    pub const fn hue_index(&self) -> usize {
        self.hue_index
    }

    pub fn hues(&self) -> &[u8] {
        &self.hues
    }

    pub const fn detector(&self) -> &PeakDetector {
        &self.detector
    }

    fn take_vu(&mut self, level: u16) -> Option<Command> {
        if self.sent_vu == Some(level) {
            return None;
        }
        self.sent_vu = Some(level);
        Some(Command::Vu(level))
    }

    fn take_contour(&mut self, elapsed_ms: u64) -> Option<Command> {
        let changed = self.sent_contour.as_ref() != Some(&self.contour);
        let resend_due = elapsed_ms < self.contour_sent_at
            || elapsed_ms - self.contour_sent_at >= self.contour_resend_ms;

        if changed || resend_due {
            self.sent_contour = Some(self.contour.clone());
            self.contour_sent_at = elapsed_ms;
            Some(self.contour.clone())
        } else {
            None
        }
    }
}
