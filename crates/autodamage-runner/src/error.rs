use std::time::Duration;

use autodamage_vision::{DecodeError, DetectError};
use thiserror::Error;

use crate::Analysis;

/// Why an analysis produced no report, or only part of one.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("detector unavailable: {0}")]
    ModelUnavailable(String),
    #[error("detector did not answer within {0:?}")]
    Timeout(Duration),
    #[error("confidence threshold must be inside (0, 1), got {0}")]
    InvalidConfidence(f32),
    /// The text report is intact; some other output is missing or degraded.
    /// Everything that was produced is still carried here.
    #[error("report generated with problems: {}", .0.problems().join("; "))]
    PartialReportFailure(Box<Analysis>),
}

impl From<DetectError> for AnalysisError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::ModelUnavailable(msg) => AnalysisError::ModelUnavailable(msg),
            DetectError::Timeout(t) => AnalysisError::Timeout(t),
        }
    }
}
