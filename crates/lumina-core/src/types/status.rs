//! Published player status and the patches that update it.

use serde::{Deserialize, Serialize};

use super::step::{Step, DEFAULT_BPM};
use super::{Palette, StepType};

/// Last-known player status as seen by observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    pub is_playing: bool,
    /// Active step index, -1 when nothing is active.
    pub active_index: i64,
    pub elapsed_ms: u64,
    pub bpm: u16,
    pub palette: Palette,
    pub current_title: String,
    pub current_type: StepType,
    /// Active step id, empty when nothing is active.
    pub current_step_id: String,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            is_playing: false,
            active_index: -1,
            elapsed_ms: 0,
            bpm: DEFAULT_BPM,
            palette: Palette::default(),
            current_title: String::new(),
            current_type: StepType::default(),
            current_step_id: String::new(),
        }
    }
}

impl PlayerStatus {
    /// Merge a patch into this record.
    pub fn apply(&mut self, patch: &StatusPatch) {
        if let Some(v) = patch.is_playing {
            self.is_playing = v;
        }
        if let Some(v) = patch.active_index {
            self.active_index = v;
        }
        if let Some(v) = patch.elapsed_ms {
            self.elapsed_ms = v;
        }
        if let Some(v) = patch.bpm {
            self.bpm = v;
        }
        if let Some(v) = patch.palette {
            self.palette = v;
        }
        if let Some(v) = &patch.current_title {
            self.current_title.clone_from(v);
        }
        if let Some(v) = patch.current_type {
            self.current_type = v;
        }
        if let Some(v) = &patch.current_step_id {
            self.current_step_id.clone_from(v);
        }
    }

    /// Whether a step is active (playing or paused).
    pub const fn has_active(&self) -> bool {
        self.active_index >= 0
    }
}

/// Partial status update. Absent fields leave the record untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palette: Option<Palette>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_type: Option<StepType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
}

impl StatusPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full description of a freshly started step.
    pub fn step_started(index: usize, step: &Step) -> Self {
        Self {
            is_playing: Some(true),
            active_index: Some(index as i64),
            elapsed_ms: Some(0),
            bpm: Some(step.bpm),
            palette: Some(step.palette),
            current_title: Some(step.title.clone()),
            current_type: Some(step.step_type),
            current_step_id: Some(step.id.clone()),
        }
    }

    /// Nothing active any more.
    pub fn stopped() -> Self {
        Self {
            is_playing: Some(false),
            active_index: Some(-1),
            elapsed_ms: Some(0),
            current_title: Some(String::new()),
            current_step_id: Some(String::new()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_playing(mut self, is_playing: bool) -> Self {
        self.is_playing = Some(is_playing);
        self
    }

    #[must_use]
    pub const fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub const fn is_empty(&self) -> bool {
        self.is_playing.is_none()
            && self.active_index.is_none()
            && self.elapsed_ms.is_none()
            && self.bpm.is_none()
            && self.palette.is_none()
            && self.current_title.is_none()
            && self.current_type.is_none()
            && self.current_step_id.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status() {
        let status = PlayerStatus::default();
        assert!(!status.is_playing);
        assert_eq!(status.active_index, -1);
        assert_eq!(status.bpm, 120);
        assert!(!status.has_active());
    }

    #[test]
    fn test_apply_patch_merges() {
        let step = Step::ready("s1", "Opening", vec![0.2], 20)
            .with_palette(Palette::Green)
            .with_bpm(128);
        let mut status = PlayerStatus::default();
        status.apply(&StatusPatch::step_started(1, &step));
        assert!(status.is_playing);
        assert_eq!(status.active_index, 1);
        assert_eq!(status.palette, Palette::Green);
        assert_eq!(status.current_title, "Opening");

        status.apply(&StatusPatch::new().with_elapsed_ms(250));
        assert_eq!(status.elapsed_ms, 250);
        assert_eq!(status.current_step_id, "s1");

        status.apply(&StatusPatch::stopped());
        assert!(!status.is_playing);
        assert_eq!(status.active_index, -1);
        // Stopping keeps the last palette and bpm
        assert_eq!(status.bpm, 128);
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = StatusPatch::new().with_playing(false);
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"isPlaying":false}"#);
        assert!(StatusPatch::new().is_empty());
        assert!(!patch.is_empty());
    }
}
