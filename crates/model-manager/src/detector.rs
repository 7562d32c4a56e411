//! Face localization and landmark models

use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;
use tracing::debug;

use crate::DetectionError;

/// BlazeFace input edge length
const FACE_INPUT_SIZE: usize = 128;

/// Number of BlazeFace anchors (16x16x2 + 8x8x6)
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output (box + 6 keypoints)
const REGRESSOR_STRIDE: usize = 16;

/// Non-maximum suppression IOU threshold
const NMS_THRESHOLD: f32 = 0.3;

/// FaceMesh input edge length
const MESH_INPUT_SIZE: usize = 192;

/// FaceMesh landmark count
const MESH_LANDMARKS: usize = 468;

/// Minimum FaceMesh face-presence score
const MESH_PRESENCE_THRESHOLD: f32 = 0.5;

/// Detected face bounding region in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub confidence: f32,
}

impl FaceRegion {
    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    /// Integer crop rectangle `(x, y, w, h)` clamped to an image, or `None`
    /// when nothing of the region lies inside it
    pub fn crop_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x_min.max(0.0).floor() as u32;
        let y0 = self.y_min.max(0.0).floor() as u32;
        let x1 = (self.x_max.min(width as f32).floor() as u32).min(width);
        let y1 = (self.y_max.min(height as f32).floor() as u32).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }

    /// Intersection with another region, keeping this region's confidence
    pub fn intersect(&self, other: &FaceRegion) -> Option<FaceRegion> {
        let region = FaceRegion {
            x_min: self.x_min.max(other.x_min),
            y_min: self.y_min.max(other.y_min),
            x_max: self.x_max.min(other.x_max),
            y_max: self.y_max.min(other.y_max),
            confidence: self.confidence,
        };
        (region.width() > 0.0 && region.height() > 0.0).then_some(region)
    }

    fn iou(&self, other: &FaceRegion) -> f32 {
        let intersection = self.intersect(other).map_or(0.0, |r| r.width() * r.height());
        let union = self.width() * self.height() + other.width() * other.height() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Facial landmark in face-crop pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Locates faces in a full frame
pub trait FaceLocalizer: Send + Sync {
    fn localize(&self, image: &RgbImage) -> Result<Vec<FaceRegion>, DetectionError>;
}

/// Locates landmarks inside a face crop
pub trait LandmarkLocalizer: Send + Sync {
    fn landmarks(&self, face: &RgbImage) -> Result<Vec<Landmark>, DetectionError>;
}

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Load an ONNX graph with a fixed NCHW float input
pub(crate) fn load_plan(bytes: &[u8], edge: usize) -> Result<OnnxPlan, DetectionError> {
    tract_onnx::onnx()
        .model_for_read(&mut std::io::Cursor::new(bytes))
        .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, edge, edge]).into()))
        .and_then(|model| model.into_optimized())
        .and_then(|model| model.into_runnable())
        .map_err(|e| DetectionError::Runtime(e.to_string()))
}

/// Resize to `edge`x`edge` and lay out as NCHW with `normalize` applied per channel value
fn to_nchw(image: &RgbImage, edge: usize, normalize: impl Fn(u8) -> f32) -> Result<Tensor, DetectionError> {
    let resized = image::imageops::resize(image, edge as u32, edge as u32, FilterType::Triangle);
    let plane = edge * edge;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let idx = y as usize * edge + x as usize;
        for c in 0..3 {
            data[c * plane + idx] = normalize(pixel[c]);
        }
    }
    Tensor::from_shape(&[1, 3, edge, edge], &data).map_err(|e| DetectionError::InvalidInputShape {
        expected: format!("[1, 3, {edge}, {edge}]"),
        actual: e.to_string(),
    })
}

fn run_plan(plan: &OnnxPlan, input: Tensor) -> Result<Vec<Vec<f32>>, DetectionError> {
    let outputs = plan
        .run(tvec!(input.into()))
        .map_err(|e| DetectionError::Inference(e.to_string()))?;
    outputs
        .iter()
        .map(|out| {
            out.to_array_view::<f32>()
                .map(|view| view.iter().copied().collect())
                .map_err(|e| DetectionError::InvalidOutput(e.to_string()))
        })
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-100.0, 100.0)).exp())
}

/// Anchor centers for the two BlazeFace feature map scales
fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (grid, per_cell) in [(16u8, 2), (8u8, 6)] {
        for y in 0..grid {
            for x in 0..grid {
                for _ in 0..per_cell {
                    anchors.push([
                        (f32::from(x) + 0.5) / f32::from(grid),
                        (f32::from(y) + 0.5) / f32::from(grid),
                    ]);
                }
            }
        }
    }
    anchors
}

/// Decode raw BlazeFace output into regions in source-image pixels
fn decode_faces(
    scores: &[f32],
    boxes: &[f32],
    anchors: &[[f32; 2]],
    threshold: f32,
    width: f32,
    height: f32,
) -> Vec<FaceRegion> {
    let input = FACE_INPUT_SIZE as f32;
    let mut detections: Vec<FaceRegion> = anchors
        .iter()
        .enumerate()
        .filter_map(|(i, anchor)| {
            let score = sigmoid(*scores.get(i)?);
            if score < threshold {
                return None;
            }
            let raw = boxes.get(i * REGRESSOR_STRIDE..i * REGRESSOR_STRIDE + 4)?;
            let cx = anchor[0] + raw[0] / input;
            let cy = anchor[1] + raw[1] / input;
            let w = raw[2] / input;
            let h = raw[3] / input;
            Some(FaceRegion {
                x_min: (cx - w / 2.0).clamp(0.0, 1.0) * width,
                y_min: (cy - h / 2.0).clamp(0.0, 1.0) * height,
                x_max: (cx + w / 2.0).clamp(0.0, 1.0) * width,
                y_max: (cy + h / 2.0).clamp(0.0, 1.0) * height,
                confidence: score,
            })
        })
        .collect();

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<FaceRegion> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| k.iou(&det) < NMS_THRESHOLD) {
            keep.push(det);
        }
    }
    keep
}

/// BlazeFace short-range face detector
pub struct BlazeFaceDetector {
    plan: OnnxPlan,
    anchors: Vec<[f32; 2]>,
    confidence_threshold: f32,
}

impl BlazeFaceDetector {
    pub fn from_bytes(bytes: &[u8], confidence_threshold: f32) -> Result<Self, DetectionError> {
        Ok(Self {
            plan: load_plan(bytes, FACE_INPUT_SIZE)?,
            anchors: generate_anchors(),
            confidence_threshold,
        })
    }
}

impl FaceLocalizer for BlazeFaceDetector {
    fn localize(&self, image: &RgbImage) -> Result<Vec<FaceRegion>, DetectionError> {
        let input = to_nchw(image, FACE_INPUT_SIZE, |v| f32::from(v) / 127.5 - 1.0)?;
        let outputs = run_plan(&self.plan, input)?;

        let boxes = outputs
            .iter()
            .find(|o| o.len() == NUM_ANCHORS * REGRESSOR_STRIDE)
            .ok_or_else(|| DetectionError::InvalidOutput("missing regressor output".into()))?;
        let scores = outputs
            .iter()
            .find(|o| o.len() == NUM_ANCHORS)
            .ok_or_else(|| DetectionError::InvalidOutput("missing score output".into()))?;

        let faces = decode_faces(
            scores,
            boxes,
            &self.anchors,
            self.confidence_threshold,
            image.width() as f32,
            image.height() as f32,
        );
        debug!("BlazeFace found {} faces", faces.len());
        Ok(faces)
    }
}

/// FaceMesh landmark model
pub struct FaceMeshDetector {
    plan: OnnxPlan,
}

impl FaceMeshDetector {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DetectionError> {
        Ok(Self {
            plan: load_plan(bytes, MESH_INPUT_SIZE)?,
        })
    }
}

impl LandmarkLocalizer for FaceMeshDetector {
    fn landmarks(&self, face: &RgbImage) -> Result<Vec<Landmark>, DetectionError> {
        let input = to_nchw(face, MESH_INPUT_SIZE, |v| f32::from(v) / 255.0)?;
        let outputs = run_plan(&self.plan, input)?;

        let coords = outputs
            .iter()
            .find(|o| o.len() == MESH_LANDMARKS * 3)
            .ok_or_else(|| DetectionError::InvalidOutput("missing landmark output".into()))?;
        if let Some(presence) = outputs.iter().find(|o| o.len() == 1) {
            if sigmoid(presence[0]) < MESH_PRESENCE_THRESHOLD {
                return Ok(Vec::new());
            }
        }

        let sx = face.width() as f32 / MESH_INPUT_SIZE as f32;
        let sy = face.height() as f32 / MESH_INPUT_SIZE as f32;
        Ok(coords
            .chunks_exact(3)
            .map(|p| Landmark {
                x: p[0] * sx,
                y: p[1] * sy,
                z: p[2],
            })
            .collect())
    }
}
