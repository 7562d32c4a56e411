//! Model artifact configuration

use serde::{Deserialize, Serialize};

/// Where the detection artifacts live and how they are named
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory the filesystem source reads artifacts from
    pub dir: String,
    /// Face localization artifact (BlazeFace)
    pub face_detector: String,
    /// Face landmark artifact (FaceMesh)
    pub face_landmarks: String,
    /// Minimum face detection confidence
    pub face_confidence: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: "models".to_string(),
            face_detector: "face_detector.onnx".to_string(),
            face_landmarks: "face_landmarks.onnx".to_string(),
            face_confidence: 0.75,
        }
    }
}
