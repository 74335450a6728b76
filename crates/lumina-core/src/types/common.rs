//! Common types shared across the executor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Color scheme of a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    #[default]
    Blue,
    Purple,
    Green,
    Orange,
}

impl Palette {
    /// Contour hue (0..=255) the palette is anchored on.
    pub const fn base_hue(self) -> u8 {
        match self {
            Self::Blue => 160,
            Self::Purple => 200,
            Self::Green => 96,
            Self::Orange => 24,
        }
    }

    /// Hues the contour cycles through on detected peaks, starting at the
    /// base hue and stepping by `spread` around the 8-bit color wheel.
    pub fn hue_rotation(self, count: usize, spread: u8) -> Vec<u8> {
        let base = self.base_hue();
        (0..count.max(1))
            .map(|i| base.wrapping_add((i as u8).wrapping_mul(spread)))
            .collect()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Purple => "purple",
            Self::Green => "green",
            Self::Orange => "orange",
        }
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of content a step carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    #[default]
    Music,
    Presentation,
    Pause,
}

/// Playback position in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position(pub u64);

impl Position {
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Negative and non-finite inputs collapse to zero.
    pub fn from_seconds(seconds: f64) -> Self {
        if seconds.is_finite() && seconds > 0.0 {
            Self((seconds * 1000.0).round() as u64)
        } else {
            Self(0)
        }
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    pub const fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }

    /// Format as MM:SS or HH:MM:SS.
    pub fn format(&self) -> String {
        let total_secs = self.0 / 1000;
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.format(), self.0 % 1000)
    }
}

impl From<u64> for Position {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

/// Playback state reported by an external clock master.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Playing,
    Paused,
    Ended,
    Idle,
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "playing" => Ok(Self::Playing),
            "paused" => Ok(Self::Paused),
            "ended" => Ok(Self::Ended),
            "idle" => Ok(Self::Idle),
            other => Err(Error::Protocol(format!("unknown playback state: {other}"))),
        }
    }
}

/// Periodic time report from the clock master (the audio player front end).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    pub step_id: String,
    pub player_time_seconds: f64,
    pub duration_seconds: f64,
    pub playback_state: SyncState,
}

impl SyncMessage {
    pub fn new(
        step_id: impl Into<String>,
        player_time_seconds: f64,
        duration_seconds: f64,
        playback_state: SyncState,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            player_time_seconds,
            duration_seconds,
            playback_state,
        }
    }

    pub fn position(&self) -> Position {
        Position::from_seconds(self.player_time_seconds)
    }
}
