//! Skin Feature Extraction
//!
//! Turns one captured frame into eight numeric skin metrics and averages the
//! samples of a completed capture session.

mod aggregate;
mod extractor;
mod filters;
mod metrics;

pub use aggregate::{aggregate, AggregatedMetrics, SAMPLES_PER_SESSION};
pub use extractor::{FeatureExtractor, SampleResult};
pub use metrics::{MetricBand, SkinMetric, SkinMetrics};

use model_manager::DetectionError;
use thiserror::Error;

/// Errors while extracting one sample
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No face in the frame; only this sample is lost
    #[error("No face detected in image")]
    NoFaceDetected,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Models were never loaded, or were disposed
    #[error("Compute backend unavailable")]
    ComputeBackendUnavailable,

    #[error("Face detection failed: {0}")]
    Detection(#[from] DetectionError),
}

impl ExtractionError {
    /// Whether recapturing the same slot can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractionError::NoFaceDetected)
    }
}

/// Aggregation invoked with the wrong number of samples. Always a defect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Aggregation requires exactly {expected} samples, got {actual}")]
    Precondition { expected: usize, actual: usize },
}
