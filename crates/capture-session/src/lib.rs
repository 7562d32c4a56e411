//! Capture Session
//!
//! Drives one three-sample skin analysis session:
//! - Explicit state machine with a pure transition function
//! - Exclusive camera access across concurrent sessions
//! - Frame readiness race against a fixed timeout
//! - Per-sample retry on recoverable failures, session failure otherwise

pub mod config;
pub mod device;
pub mod session;
pub mod state;

pub use config::CaptureConfig;
pub use device::CameraDevice;
pub use session::{CaptureOutcome, CaptureSession};
pub use state::{transition, CaptureEvent, CaptureState};

use camera_capture::CameraError;
use model_manager::ModelLoadError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a session ended in `Error`. Each carries a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionFailure {
    ModelLoad,
    PermissionDenied,
    NoDevice,
    Camera,
    Processing,
}

impl SessionFailure {
    pub fn message(&self) -> &'static str {
        match self {
            SessionFailure::ModelLoad => "Failed to load ML models. Please try again.",
            SessionFailure::PermissionDenied => {
                "Camera access denied. Please ensure camera permissions are granted."
            }
            SessionFailure::NoDevice => "No camera found. Please connect a camera and try again.",
            SessionFailure::Camera => "Failed to access camera. Please try again.",
            SessionFailure::Processing => "Failed to process captures. Please try again.",
        }
    }
}

impl From<&CameraError> for SessionFailure {
    fn from(err: &CameraError) -> Self {
        match err {
            CameraError::PermissionDenied(_) => SessionFailure::PermissionDenied,
            CameraError::NoDevice(_) => SessionFailure::NoDevice,
            _ => SessionFailure::Camera,
        }
    }
}

/// Recoverable per-sample failure; the same slot may be captured again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryReason {
    NoFace,
    FrameTimeout,
}

impl RetryReason {
    pub fn message(&self) -> &'static str {
        match self {
            RetryReason::NoFace => "No face detected. Please center your face and try again.",
            RetryReason::FrameTimeout => "Video stream timeout. Please try again.",
        }
    }
}

/// Rejected state machine input
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid transition: {} in state {}", .event.name(), .state.name())]
pub struct TransitionError {
    pub state: CaptureState,
    pub event: CaptureEvent,
}

/// Capture session errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Camera is in use by another session")]
    CameraBusy,

    #[error("Failed to load ML models: {0}")]
    ModelLoad(#[from] ModelLoadError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Please wait for camera to initialize")]
    CameraNotReady,

    #[error("Capture already in progress")]
    CaptureInProgress,

    #[error("Capture limit reached")]
    QuotaReached,

    #[error("Failed to process captures: {0}")]
    Processing(String),

    #[error(transparent)]
    InvalidState(#[from] TransitionError),
}
