//! Runtime initialization of fetched artifacts

use tracing::info;

use crate::detector::{BlazeFaceDetector, FaceMeshDetector};
use crate::{DetectionError, FaceLocalizer, LandmarkLocalizer};

/// Turns fetched artifact bytes into runnable detectors.
///
/// Called from a blocking task; implementations may be CPU heavy.
pub trait ModelRuntime: Send + Sync + 'static {
    fn load_face_localizer(&self, bytes: &[u8]) -> Result<Box<dyn FaceLocalizer>, DetectionError>;

    fn load_landmark_localizer(&self, bytes: &[u8])
        -> Result<Box<dyn LandmarkLocalizer>, DetectionError>;
}

/// ONNX runtime backed by tract
#[derive(Debug, Clone)]
pub struct OnnxRuntime {
    face_confidence: f32,
}

impl OnnxRuntime {
    pub fn new(face_confidence: f32) -> Self {
        Self { face_confidence }
    }
}

impl Default for OnnxRuntime {
    fn default() -> Self {
        Self::new(0.75)
    }
}

impl ModelRuntime for OnnxRuntime {
    fn load_face_localizer(&self, bytes: &[u8]) -> Result<Box<dyn FaceLocalizer>, DetectionError> {
        let detector = BlazeFaceDetector::from_bytes(bytes, self.face_confidence)?;
        info!("Face detector initialized ({} bytes)", bytes.len());
        Ok(Box::new(detector))
    }

    fn load_landmark_localizer(
        &self,
        bytes: &[u8],
    ) -> Result<Box<dyn LandmarkLocalizer>, DetectionError> {
        let detector = FaceMeshDetector::from_bytes(bytes)?;
        info!("Face landmarks detector initialized ({} bytes)", bytes.len());
        Ok(Box::new(detector))
    }
}
