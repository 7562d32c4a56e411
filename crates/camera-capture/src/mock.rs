//! Scripted camera for tests and demos

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{CameraError, VideoFrame, VideoSource};

/// Observes a `ScriptedCamera` after it has been moved into a device handle
#[derive(Debug, Clone, Default)]
pub struct CameraProbe {
    streaming: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    grabs: Arc<AtomicUsize>,
}

impl CameraProbe {
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn grab_count(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

/// Camera whose behavior is fully scripted
pub struct ScriptedCamera {
    start_error: Option<CameraError>,
    grab_error: Option<CameraError>,
    ready: bool,
    frames: VecDeque<VideoFrame>,
    fallback: VideoFrame,
    probe: CameraProbe,
}

impl ScriptedCamera {
    /// Camera that always serves `frame`
    pub fn new(frame: VideoFrame) -> Self {
        Self {
            start_error: None,
            grab_error: None,
            ready: true,
            frames: VecDeque::new(),
            fallback: frame,
            probe: CameraProbe::default(),
        }
    }

    /// Fail `start_capture` with `error`
    pub fn failing_start(mut self, error: CameraError) -> Self {
        self.start_error = Some(error);
        self
    }

    /// Fail every `grab_frame` with `error`, as a device lost mid-stream would
    pub fn failing_grab(mut self, error: CameraError) -> Self {
        self.grab_error = Some(error);
        self
    }

    /// Never report a ready frame
    pub fn never_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Serve `frames` in order before falling back to the default frame
    pub fn with_frames(mut self, frames: Vec<VideoFrame>) -> Self {
        self.frames = frames.into();
        self
    }

    /// Handle for observing the camera after it has been moved
    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }
}

impl VideoSource for ScriptedCamera {
    async fn start_capture(&mut self) -> Result<(), CameraError> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.start_error.clone() {
            return Err(err);
        }
        self.probe.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        self.probe.streaming.store(false, Ordering::SeqCst);
    }

    fn is_frame_ready(&self) -> bool {
        self.ready && self.probe.is_streaming()
    }

    fn grab_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if !self.probe.is_streaming() {
            return Err(CameraError::NotInitialized);
        }
        if let Some(err) = self.grab_error.clone() {
            return Err(err);
        }
        self.probe.grabs.fetch_add(1, Ordering::SeqCst);
        Ok(self.frames.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }

    fn is_streaming(&self) -> bool {
        self.probe.is_streaming()
    }
}

/// Deterministic skin-toned frame with a faint checker texture
pub fn skin_frame(width: u32, height: u32) -> VideoFrame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let bump = if (x / 2 + y / 2) % 2 == 0 { 6 } else { 0 };
            data.extend_from_slice(&[196 + bump, 150 + bump, 128 + bump]);
        }
    }
    VideoFrame::new(data, width, height, 0)
}
