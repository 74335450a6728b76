//! Show playlist management.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::step::{RawStep, Step};
use crate::error::Result;

/// Playlist file layout: either a bare array of steps or `{"steps": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PlaylistFile {
    Steps(Vec<RawStep>),
    Wrapped { steps: Vec<RawStep> },
}

/// Ordered list of show steps.
///
/// Steps are shared (`Arc`) so the executor can hold the active step while
/// the pipeline swaps in updated records.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    steps: Vec<Arc<Step>>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into_iter().map(Arc::new).collect(),
        }
    }

    /// Validate raw pipeline records into a playlist.
    pub fn from_raw(raw: Vec<RawStep>) -> Result<Self> {
        let steps = raw
            .into_iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_steps(steps))
    }

    /// Parse a playlist from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw = match serde_json::from_str(json)? {
            PlaylistFile::Steps(steps) | PlaylistFile::Wrapped { steps } => steps,
        };
        Self::from_raw(raw)
    }

    /// Load a playlist JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Get all steps.
    pub fn steps(&self) -> &[Arc<Step>] {
        &self.steps
    }

    /// Get the step at `index`.
    pub fn get(&self, index: usize) -> Option<&Arc<Step>> {
        self.steps.get(index)
    }

    /// Get the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the playlist is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the step with the given id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Index following `current`, wrapping at the end. With nothing active
    /// the first step is next.
    pub fn next_index(&self, current: Option<usize>) -> Option<usize> {
        if self.steps.is_empty() {
            return None;
        }
        Some(current.map_or(0, |i| (i + 1) % self.steps.len()))
    }

    /// Replace the step with the same id, or append it. Returns its index.
    pub fn upsert(&mut self, step: Step) -> usize {
        if let Some(index) = self.position(&step.id) {
            self.steps[index] = Arc::new(step);
            index
        } else {
            self.steps.push(Arc::new(step));
            self.steps.len() - 1
        }
    }

    /// Number of steps that are ready to play.
    pub fn ready_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_ready()).count()
    }
}
