//! Error types for Lumina.

use thiserror::Error;

use crate::types::StepStatus;

/// Result type alias using Lumina's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Lumina.
#[derive(Error, Debug)]
pub enum Error {
    // Control surface rejections
    #[error("Invalid step index {index} (playlist has {len} steps)")]
    InvalidIndex { index: usize, len: usize },

    #[error("Step {id} is not ready (status: {status})")]
    StepNotReady { id: String, status: StepStatus },

    // Boundary validation
    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Delivery errors
    #[error("Device error: {0}")]
    Device(String),

    #[error("Executor is shut down")]
    ExecutorClosed,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error is a rejected control command that the
    /// operator should see. Everything else is transient or internal.
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidIndex { .. } | Self::StepNotReady { .. } | Self::ExecutorClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_user_facing() {
        assert!(Error::InvalidIndex { index: 3, len: 2 }.is_user_facing());
        assert!(Error::StepNotReady {
            id: "a".into(),
            status: StepStatus::Processing
        }
        .is_user_facing());
        assert!(!Error::Device("unreachable".into()).is_user_facing());
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidIndex { index: 5, len: 2 };
        assert_eq!(err.to_string(), "Invalid step index 5 (playlist has 2 steps)");

        let err = Error::StepNotReady {
            id: "intro".into(),
            status: StepStatus::Error,
        };
        assert_eq!(err.to_string(), "Step intro is not ready (status: error)");
    }
}
