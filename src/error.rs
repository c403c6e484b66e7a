//! Error types for cogtrend

use thiserror::Error;

/// Errors that can occur while generating or windowing sessions
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Subject {subject_id} has {sessions} sessions, {required} required for a window")]
    InsufficientSessions {
        subject_id: String,
        sessions: usize,
        required: usize,
    },

    #[error("Non-finite value for {field} of subject {subject_id}: {value}")]
    NumericRange {
        subject_id: String,
        field: &'static str,
        value: f64,
    },

    #[error("Invalid session sequence: {0}")]
    InvalidSession(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(String),
}

impl SynthError {
    /// Whether this error only excludes one subject rather than the batch.
    pub fn is_subject_local(&self) -> bool {
        matches!(
            self,
            SynthError::InsufficientSessions { .. }
                | SynthError::NumericRange { .. }
                | SynthError::InvalidSession(_)
        )
    }
}

/// Reject NaN and infinities before any clipping happens.
pub(crate) fn ensure_finite(
    subject_id: &str,
    field: &'static str,
    value: f64,
) -> Result<f64, SynthError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SynthError::NumericRange {
            subject_id: subject_id.to_string(),
            field,
            value,
        })
    }
}
