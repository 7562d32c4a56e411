//! Detection Model Lifecycle
//!
//! Loads the face localization and face landmark models at most once per
//! process, shares them read-only across capture sessions, and releases them
//! (together with any outstanding compute buffers) on teardown.

mod backend;
mod config;
mod detector;
mod manager;
pub mod mock;
mod runtime;
mod source;

pub use backend::{BufferBytes, ComputeBackend, Tracked};
pub use config::ModelConfig;
pub use detector::{FaceLocalizer, FaceRegion, Landmark, LandmarkLocalizer};
pub use manager::{DetectionProvider, DetectionResources, ModelLifecycleManager};
pub use runtime::{ModelRuntime, OnnxRuntime};
pub use source::{FsModelSource, ModelSource};

use thiserror::Error;

/// Errors while bringing the detection models up.
///
/// A failed load never publishes a partial handle; the next
/// `ensure_loaded` call retries from scratch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelLoadError {
    #[error("Failed to fetch model artifact '{model}': {reason}")]
    Fetch { model: String, reason: String },
    #[error("Failed to initialize model '{model}': {reason}")]
    Runtime { model: String, reason: String },
}

impl ModelLoadError {
    /// Name of the artifact that failed
    pub fn model(&self) -> &str {
        match self {
            ModelLoadError::Fetch { model, .. } | ModelLoadError::Runtime { model, .. } => model,
        }
    }
}

/// Errors raised by a loaded detector
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Runtime initialization failed: {0}")]
    Runtime(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Unexpected model output: {0}")]
    InvalidOutput(String),
}
