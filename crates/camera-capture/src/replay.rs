//! Still-image replay source

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{CameraConfig, CameraError, VideoFrame, VideoSource};

/// Replays a fixed list of still images as if they came from a live camera.
///
/// Images are decoded when the capture starts; each `grab_frame` yields the next
/// image, cycling once the list is exhausted.
pub struct ReplaySource {
    paths: Vec<PathBuf>,
    config: CameraConfig,
    frames: Vec<VideoFrame>,
    cursor: usize,
    streaming: bool,
}

impl ReplaySource {
    /// Create a replay source over image files
    pub fn new<P: AsRef<Path>>(paths: &[P], config: CameraConfig) -> Self {
        Self {
            paths: paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            config,
            frames: Vec::new(),
            cursor: 0,
            streaming: false,
        }
    }

    /// Create a replay source over already-decoded frames
    pub fn from_frames(frames: Vec<VideoFrame>) -> Self {
        Self {
            paths: Vec::new(),
            config: CameraConfig { mirrored: false },
            frames,
            cursor: 0,
            streaming: false,
        }
    }

    fn decode_all(&self) -> Result<Vec<VideoFrame>, CameraError> {
        self.paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let img = image::open(path)
                    .map_err(|e| CameraError::Stream(format!("{}: {}", path.display(), e)))?;
                let frame = VideoFrame::from_image(img.to_rgb8(), i as u32);
                Ok(if self.config.mirrored { frame.mirrored() } else { frame })
            })
            .collect()
    }
}

impl VideoSource for ReplaySource {
    async fn start_capture(&mut self) -> Result<(), CameraError> {
        if !self.paths.is_empty() {
            self.frames = self.decode_all()?;
        }
        if self.frames.is_empty() {
            return Err(CameraError::NoDevice("no frames to replay".into()));
        }
        info!("Replay source started with {} frames", self.frames.len());
        self.cursor = 0;
        self.streaming = true;
        Ok(())
    }

    fn stop_capture(&mut self) {
        if self.streaming {
            debug!("Replay source stopped");
        }
        self.streaming = false;
    }

    fn is_frame_ready(&self) -> bool {
        self.streaming && !self.frames.is_empty()
    }

    fn grab_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if !self.streaming {
            return Err(CameraError::NotInitialized);
        }
        let frame = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor += 1;
        Ok(frame)
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }
}
