//! Step type representing one entry of the show playlist.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Palette, StepType};
use crate::error::{Error, Result};

/// Tempo assumed when the preparation pipeline did not estimate one.
pub const DEFAULT_BPM: u16 = 120;

/// Preparation status of a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Queued,
    #[default]
    Processing,
    Ready,
    Error,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Error => "error",
        })
    }
}

/// A validated playlist step.
///
/// Steps are immutable once ready; the executor only reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Pipeline-assigned identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Content kind.
    pub step_type: StepType,
    /// Preparation status.
    pub status: StepStatus,
    /// Track duration in milliseconds (0 if unknown).
    pub duration_ms: u64,
    /// Estimated tempo.
    pub bpm: u16,
    /// Color scheme.
    pub palette: Palette,
    /// Normalized loudness samples, each in `[0, 1]`.
    pub energy_envelope: Vec<f32>,
    /// Sampling interval of the envelope in milliseconds.
    pub energy_frame_ms: u32,
}

impl Step {
    /// Create a ready step with the given envelope.
    pub fn ready(
        id: impl Into<String>,
        title: impl Into<String>,
        energy_envelope: Vec<f32>,
        energy_frame_ms: u32,
    ) -> Self {
        let energy_envelope: Vec<f32> = energy_envelope
            .into_iter()
            .map(|e| if e.is_finite() { e.clamp(0.0, 1.0) } else { 0.0 })
            .collect();
        let duration_ms = energy_envelope.len() as u64 * u64::from(energy_frame_ms);

        Self {
            id: id.into(),
            title: title.into(),
            step_type: StepType::Music,
            status: StepStatus::Ready,
            duration_ms,
            bpm: DEFAULT_BPM,
            palette: Palette::default(),
            energy_envelope,
            energy_frame_ms,
        }
    }

    /// Create a step that is still being prepared.
    pub fn pending(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            step_type: StepType::Music,
            status: StepStatus::Processing,
            duration_ms: 0,
            bpm: DEFAULT_BPM,
            palette: Palette::default(),
            energy_envelope: Vec::new(),
            energy_frame_ms: 0,
        }
    }

    #[must_use]
    pub const fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    #[must_use]
    pub const fn with_bpm(mut self, bpm: u16) -> Self {
        self.bpm = bpm;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.status == StepStatus::Ready
    }

    /// Envelope frame covering `elapsed_ms`.
    pub fn frame_index(&self, elapsed_ms: u64) -> Option<usize> {
        let frame = elapsed_ms.checked_div(u64::from(self.energy_frame_ms))?;
        usize::try_from(frame).ok()
    }

    /// Loudness at `elapsed_ms`. Anything outside the envelope is silence.
    pub fn energy_at(&self, elapsed_ms: u64) -> f32 {
        self.frame_index(elapsed_ms)
            .and_then(|i| self.energy_envelope.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// Length of the envelope in milliseconds.
    pub fn envelope_span_ms(&self) -> u64 {
        self.energy_envelope.len() as u64 * u64::from(self.energy_frame_ms)
    }
}

/// Step record as handed over by the preparation pipeline.
///
/// Every field except `id` may be missing while the step is processing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawStep {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: StepStatus,
    pub duration_ms: Option<i64>,
    pub bpm: Option<i64>,
    pub palette: Palette,
    pub energy_envelope: Option<Vec<f64>>,
    pub energy_frame_ms: Option<i64>,
}

impl TryFrom<RawStep> for Step {
    type Error = Error;

    fn try_from(raw: RawStep) -> Result<Self> {
        if raw.id.trim().is_empty() {
            return Err(Error::InvalidStep("step id is empty".into()));
        }

        let mut clamped = 0usize;
        let energy_envelope = raw
            .energy_envelope
            .as_deref()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, &e)| {
                if !e.is_finite() {
                    return Err(Error::InvalidStep(format!(
                        "step {}: envelope sample {i} is not finite",
                        raw.id
                    )));
                }
                if !(0.0..=1.0).contains(&e) {
                    clamped += 1;
                }
                Ok(e.clamp(0.0, 1.0) as f32)
            })
            .collect::<Result<Vec<f32>>>()?;

        if clamped > 0 {
            debug!("Step {}: clamped {clamped} envelope samples into [0, 1]", raw.id);
        }

        let energy_frame_ms = match raw.energy_frame_ms {
            Some(ms) if ms > 0 => u32::try_from(ms).map_err(|_| {
                Error::InvalidStep(format!("step {}: energyFrameMs {ms} too large", raw.id))
            })?,
            Some(ms) if raw.status == StepStatus::Ready => {
                return Err(Error::InvalidStep(format!(
                    "step {}: energyFrameMs must be positive, got {ms}",
                    raw.id
                )));
            }
            None if raw.status == StepStatus::Ready => {
                return Err(Error::InvalidStep(format!(
                    "step {}: ready step has no energyFrameMs",
                    raw.id
                )));
            }
            _ => 0,
        };

        if raw.status == StepStatus::Ready && raw.energy_envelope.is_none() {
            return Err(Error::InvalidStep(format!(
                "step {}: ready step has no energyEnvelope",
                raw.id
            )));
        }

        let bpm = raw
            .bpm
            .filter(|&b| b > 0)
            .and_then(|b| u16::try_from(b).ok())
            .unwrap_or(DEFAULT_BPM);

        // Unknown duration falls back to the envelope length
        let span_ms = energy_envelope.len() as u64 * u64::from(energy_frame_ms);
        let duration_ms = raw
            .duration_ms
            .filter(|&d| d > 0)
            .map_or(span_ms, |d| d as u64);

        Ok(Self {
            id: raw.id,
            title: raw.title,
            step_type: raw.step_type,
            status: raw.status,
            duration_ms,
            bpm,
            palette: raw.palette,
            energy_envelope,
            energy_frame_ms,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_sampling() {
        let step = Step::ready("a", "A", vec![0.1, 0.5, 0.9], 20);
        assert!((step.energy_at(0) - 0.1).abs() < f32::EPSILON);
        assert!((step.energy_at(19) - 0.1).abs() < f32::EPSILON);
        assert!((step.energy_at(20) - 0.5).abs() < f32::EPSILON);
        assert!((step.energy_at(59) - 0.9).abs() < f32::EPSILON);
        // Past the end is silence
        assert!(step.energy_at(60).abs() < f32::EPSILON);
        assert!(step.energy_at(u64::MAX).abs() < f32::EPSILON);
        assert_eq!(step.envelope_span_ms(), 60);
    }

    #[test]
    fn test_raw_step_defaults_while_processing() {
        let raw: RawStep = serde_json::from_str(r#"{"id":"s1","title":"Intro"}"#).unwrap();
        let step = Step::try_from(raw).unwrap();
        assert_eq!(step.status, StepStatus::Processing);
        assert_eq!(step.bpm, DEFAULT_BPM);
        assert!(step.energy_envelope.is_empty());
        assert_eq!(step.duration_ms, 0);
        assert!(step.energy_at(1000).abs() < f32::EPSILON);
    }

    #[test]
    fn test_raw_step_ready_validation() {
        let json = r#"{
            "id": "s2", "title": "Drop", "type": "music", "status": "ready",
            "durationMs": 1000, "bpm": 128, "palette": "orange",
            "energyEnvelope": [0.0, 0.4, 1.2, -0.1], "energyFrameMs": 20
        }"#;
        let step = Step::try_from(serde_json::from_str::<RawStep>(json).unwrap()).unwrap();
        assert_eq!(step.palette, Palette::Orange);
        assert_eq!(step.bpm, 128);
        assert_eq!(step.energy_envelope, vec![0.0, 0.4, 1.0, 0.0]);
        assert_eq!(step.duration_ms, 1000);

        let missing_frame = RawStep {
            id: "s3".into(),
            status: StepStatus::Ready,
            energy_envelope: Some(vec![0.5]),
            ..RawStep::default()
        };
        assert!(matches!(
            Step::try_from(missing_frame),
            Err(Error::InvalidStep(_))
        ));

        let not_finite = RawStep {
            id: "s4".into(),
            status: StepStatus::Ready,
            energy_envelope: Some(vec![0.5, f64::NAN]),
            energy_frame_ms: Some(20),
            ..RawStep::default()
        };
        assert!(Step::try_from(not_finite).is_err());
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(Step::try_from(RawStep::default()).is_err());
    }
}
