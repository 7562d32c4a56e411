//! Live video source contract

use std::future::Future;

use crate::{CameraError, VideoFrame};

/// A live camera supplied by the hosting UI layer.
///
/// `start_capture` resolves once the device delivers its first usable frame.
/// `is_frame_ready` mirrors the video element's "have enough data" signal and is
/// polled by the capture orchestrator before every still grab.
pub trait VideoSource: Send {
    /// Request live video access
    fn start_capture(&mut self) -> impl Future<Output = Result<(), CameraError>> + Send;

    /// Release the device. Must be safe to call when not streaming.
    fn stop_capture(&mut self);

    /// Whether a complete frame is available to grab
    fn is_frame_ready(&self) -> bool;

    /// Grab the current still frame
    fn grab_frame(&mut self) -> Result<VideoFrame, CameraError>;

    /// Whether the device is currently streaming
    fn is_streaming(&self) -> bool;
}
