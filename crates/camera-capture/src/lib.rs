//! Camera Capture Library for Skin Analysis
//!
//! Defines the live video contract the hosting UI layer supplies:
//! - `VideoSource`: start/stop the stream, poll frame readiness, grab stills
//! - `VideoFrame`: decoded RGB24 still frame
//! - `ReplaySource`: replays still images as a video source (CLI, demos)
//! - `mock::ScriptedCamera`: scripted source for tests

pub mod frame;
pub mod mock;
pub mod replay;
pub mod source;

pub use frame::VideoFrame;
pub use replay::ReplaySource;
pub use source::VideoSource;

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("No camera device found: {0}")]
    NoDevice(String),

    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture timeout")]
    Timeout,

    #[error("Camera not initialized")]
    NotInitialized,
}

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Mirror frames horizontally (selfie view)
    pub mirrored: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { mirrored: true }
    }
}
