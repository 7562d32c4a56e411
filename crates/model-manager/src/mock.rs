//! In-memory model source and fixed-output runtime for tests and demos

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;

use crate::{
    DetectionError, FaceLocalizer, FaceRegion, Landmark, LandmarkLocalizer, ModelConfig,
    ModelLoadError, ModelRuntime, ModelSource,
};

/// Shared call counter
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Serves artifacts from memory, optionally slowly or failing
pub struct StaticModelSource {
    artifacts: HashMap<String, Vec<u8>>,
    delay: Duration,
    failures_remaining: Arc<AtomicUsize>,
    fetches: CallCounter,
}

impl StaticModelSource {
    pub fn new(artifacts: HashMap<String, Vec<u8>>) -> Self {
        Self {
            artifacts,
            delay: Duration::ZERO,
            failures_remaining: Arc::new(AtomicUsize::new(0)),
            fetches: CallCounter::default(),
        }
    }

    /// Placeholder bytes under the default artifact names
    pub fn with_default_artifacts() -> Self {
        let config = ModelConfig::default();
        Self::new(HashMap::from([
            (config.face_detector, b"face".to_vec()),
            (config.face_landmarks, b"mesh".to_vec()),
        ]))
    }

    /// Delay every fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `count` fetches
    pub fn fail_next(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    pub fn fetch_counter(&self) -> CallCounter {
        self.fetches.clone()
    }
}

impl ModelSource for StaticModelSource {
    fn fetch_model(&self, name: &str) -> impl Future<Output = Result<Vec<u8>, ModelLoadError>> + Send {
        self.fetches.bump();
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let result = match self.artifacts.get(name) {
            Some(bytes) if !failing => Ok(bytes.clone()),
            Some(_) => Err(ModelLoadError::Fetch {
                model: name.to_string(),
                reason: "scripted failure".into(),
            }),
            None => Err(ModelLoadError::Fetch {
                model: name.to_string(),
                reason: "no such artifact".into(),
            }),
        };
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        }
    }
}

/// Face box expressed as fractions of the image size
#[derive(Debug, Clone, Copy)]
pub struct RelativeBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// Runtime whose detectors return fixed answers
#[derive(Debug, Clone)]
pub struct FixedRuntime {
    faces: Vec<RelativeBox>,
    landmarks: Vec<Landmark>,
    failing: bool,
    inits: CallCounter,
}

impl FixedRuntime {
    /// One face covering the central half of every frame
    pub fn centered_face() -> Self {
        Self::with_faces(vec![RelativeBox {
            x_min: 0.25,
            y_min: 0.25,
            x_max: 0.75,
            y_max: 0.75,
        }])
    }

    /// No face in any frame
    pub fn no_face() -> Self {
        Self::with_faces(Vec::new())
    }

    pub fn with_faces(faces: Vec<RelativeBox>) -> Self {
        Self {
            faces,
            landmarks: Vec::new(),
            failing: false,
            inits: CallCounter::default(),
        }
    }

    /// Landmarks (in face-crop pixels) returned for every crop
    pub fn with_landmarks(mut self, landmarks: Vec<Landmark>) -> Self {
        self.landmarks = landmarks;
        self
    }

    /// Fail runtime initialization
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn init_counter(&self) -> CallCounter {
        self.inits.clone()
    }

    fn check(&self) -> Result<(), DetectionError> {
        self.inits.bump();
        if self.failing {
            return Err(DetectionError::Runtime("scripted failure".into()));
        }
        Ok(())
    }
}

impl ModelRuntime for FixedRuntime {
    fn load_face_localizer(&self, _bytes: &[u8]) -> Result<Box<dyn FaceLocalizer>, DetectionError> {
        self.check()?;
        Ok(Box::new(FixedFaces(self.faces.clone())))
    }

    fn load_landmark_localizer(
        &self,
        _bytes: &[u8],
    ) -> Result<Box<dyn LandmarkLocalizer>, DetectionError> {
        self.check()?;
        Ok(Box::new(FixedLandmarks(self.landmarks.clone())))
    }
}

struct FixedFaces(Vec<RelativeBox>);

impl FaceLocalizer for FixedFaces {
    fn localize(&self, image: &RgbImage) -> Result<Vec<FaceRegion>, DetectionError> {
        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(self
            .0
            .iter()
            .enumerate()
            .map(|(i, b)| FaceRegion {
                x_min: b.x_min * w,
                y_min: b.y_min * h,
                x_max: b.x_max * w,
                y_max: b.y_max * h,
                confidence: 0.95 - i as f32 * 0.1,
            })
            .collect())
    }
}

struct FixedLandmarks(Vec<Landmark>);

impl LandmarkLocalizer for FixedLandmarks {
    fn landmarks(&self, _face: &RgbImage) -> Result<Vec<Landmark>, DetectionError> {
        Ok(self.0.clone())
    }
}
