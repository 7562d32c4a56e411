//! Per-sample feature extraction

use camera_capture::VideoFrame;
use image::{imageops, RgbImage};
use model_manager::{ComputeBackend, DetectionResources, FaceRegion, Landmark, Tracked};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::filters::compute_metrics;
use crate::{ExtractionError, SkinMetrics};

/// Landmarks needed before the crop is tightened to their hull
const MIN_REFINE_LANDMARKS: usize = 3;

/// Metrics for one accepted frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    pub metrics: SkinMetrics,
    /// Face region the metrics were computed over, in frame pixels
    pub face: FaceRegion,
}

/// Turns frames into skin metric samples using the loaded detection models
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    refine_with_landmarks: bool,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self {
            refine_with_landmarks: true,
        }
    }

    /// Skip the landmark refinement step and measure the raw face box
    pub fn without_landmarks(mut self) -> Self {
        self.refine_with_landmarks = false;
        self
    }

    /// Extract one sample.
    ///
    /// Pure with respect to its inputs. Every intermediate buffer is
    /// released before returning, whatever the outcome.
    pub fn extract(
        &self,
        frame: &VideoFrame,
        resources: &DetectionResources,
    ) -> Result<SampleResult, ExtractionError> {
        if frame.is_malformed() {
            return Err(ExtractionError::MalformedFrame(format!(
                "{}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }

        let backend = resources.backend();
        if !backend.is_ready() {
            return Err(ExtractionError::ComputeBackendUnavailable);
        }

        let image = backend.track(
            frame
                .to_rgb_image()
                .ok_or_else(|| ExtractionError::MalformedFrame("buffer rejected".into()))?,
        );

        let face = resources
            .localize_faces(&image)?
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .ok_or(ExtractionError::NoFaceDetected)?;
        debug!("Face detected with confidence {:.2}", face.confidence);

        let crop = crop_region(backend, &image, &face).ok_or(ExtractionError::NoFaceDetected)?;

        let region = if self.refine_with_landmarks {
            refine(resources, &crop, &face)
        } else {
            face
        };

        let metrics = if region == face {
            compute_metrics(backend, &crop)
        } else {
            let refined = crop_region(backend, &image, &region).ok_or(ExtractionError::NoFaceDetected)?;
            compute_metrics(backend, &refined)
        };

        Ok(SampleResult {
            metrics,
            face: region,
        })
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn crop_region(
    backend: &ComputeBackend,
    image: &RgbImage,
    region: &FaceRegion,
) -> Option<Tracked<RgbImage>> {
    let (x, y, w, h) = region.crop_rect(image.width(), image.height())?;
    Some(backend.track(imageops::crop_imm(image, x, y, w, h).to_image()))
}

/// Tighten the face box to the landmark hull. Falls back to the box when
/// landmarks are unavailable or degenerate.
fn refine(resources: &DetectionResources, crop: &RgbImage, face: &FaceRegion) -> FaceRegion {
    let landmarks = match resources.landmarks(crop) {
        Ok(landmarks) => landmarks,
        Err(e) => {
            warn!("Landmark detection failed, using face box: {}", e);
            return *face;
        }
    };
    if landmarks.len() < MIN_REFINE_LANDMARKS {
        return *face;
    }

    let offset_x = face.x_min.max(0.0).floor();
    let offset_y = face.y_min.max(0.0).floor();
    let hull = hull(&landmarks, offset_x, offset_y, face.confidence);

    face.intersect(&hull).unwrap_or(*face)
}

fn hull(landmarks: &[Landmark], offset_x: f32, offset_y: f32, confidence: f32) -> FaceRegion {
    let init = FaceRegion {
        x_min: f32::MAX,
        y_min: f32::MAX,
        x_max: f32::MIN,
        y_max: f32::MIN,
        confidence,
    };
    landmarks.iter().fold(init, |r, p| FaceRegion {
        x_min: r.x_min.min(p.x + offset_x),
        y_min: r.y_min.min(p.y + offset_y),
        x_max: r.x_max.max(p.x + offset_x),
        y_max: r.y_max.max(p.y + offset_y),
        confidence,
    })
}
