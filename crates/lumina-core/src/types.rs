//! Core domain types for Lumina.

pub mod common;
pub mod playlist;
pub mod status;
pub mod step;

pub use common::*;
pub use playlist::Playlist;
pub use status::{PlayerStatus, StatusPatch};
pub use step::{RawStep, Step, StepStatus};
