use std::time::Duration;

use thiserror::Error;

/// The uploaded bytes are not an image we can read. The caller has to resupply.
#[derive(Debug, Error)]
#[error("could not decode image: {0}")]
pub struct DecodeError(#[from] pub image::ImageError);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectError {
    /// Load, warm-up or inference failed. Safe to retry on a later request.
    #[error("detector unavailable: {0}")]
    ModelUnavailable(String),
    #[error("detector did not answer within {0:?}")]
    Timeout(Duration),
}
