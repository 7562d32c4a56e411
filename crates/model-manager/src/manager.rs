//! Model lifecycle manager

use std::future::Future;
use std::sync::Arc;

use image::RgbImage;
use metrics::counter;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};

use crate::{
    ComputeBackend, DetectionError, FaceLocalizer, FaceRegion, Landmark, LandmarkLocalizer,
    ModelConfig, ModelLoadError, ModelRuntime, ModelSource,
};

/// Both loaded detection models plus the backend they run on.
///
/// Read-only after loading; shared by every capture session.
pub struct DetectionResources {
    face: Box<dyn FaceLocalizer>,
    landmarks: Box<dyn LandmarkLocalizer>,
    backend: ComputeBackend,
}

impl DetectionResources {
    pub fn new(
        face: Box<dyn FaceLocalizer>,
        landmarks: Box<dyn LandmarkLocalizer>,
        backend: ComputeBackend,
    ) -> Self {
        Self {
            face,
            landmarks,
            backend,
        }
    }

    /// Locate faces in a full frame
    pub fn localize_faces(&self, image: &RgbImage) -> Result<Vec<FaceRegion>, DetectionError> {
        self.face.localize(image)
    }

    /// Locate landmarks in a face crop
    pub fn landmarks(&self, face: &RgbImage) -> Result<Vec<Landmark>, DetectionError> {
        self.landmarks.landmarks(face)
    }

    pub fn backend(&self) -> &ComputeBackend {
        &self.backend
    }
}

type LoadOutcome = Result<Arc<DetectionResources>, ModelLoadError>;

enum Slot {
    Empty,
    /// A load is in flight; its outcome is published on the channel
    Loading(watch::Receiver<Option<LoadOutcome>>),
    Loaded(Arc<DetectionResources>),
}

/// Anything that can hand out loaded detection resources
pub trait DetectionProvider: Send + Sync + 'static {
    fn ensure_loaded(
        &self,
    ) -> impl Future<Output = Result<Arc<DetectionResources>, ModelLoadError>> + Send;
}

/// Owns loading, caching and disposal of the detection models.
///
/// Created by the hosting application's composition root and injected into
/// whatever needs the models.
pub struct ModelLifecycleManager<S: ModelSource, R: ModelRuntime> {
    source: S,
    runtime: Arc<R>,
    config: ModelConfig,
    backend: ComputeBackend,
    slot: Mutex<Slot>,
}

impl<S: ModelSource, R: ModelRuntime> ModelLifecycleManager<S, R> {
    pub fn new(source: S, runtime: R, config: ModelConfig) -> Self {
        Self {
            source,
            runtime: Arc::new(runtime),
            config,
            backend: ComputeBackend::new(),
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Load both models unless already loaded.
    ///
    /// Idempotent. Callers arriving while a load is in flight wait for it and
    /// share its outcome, failure included. A failed load leaves nothing
    /// cached so the next call starts over.
    pub async fn ensure_loaded(&self) -> Result<Arc<DetectionResources>, ModelLoadError> {
        loop {
            let mut pending = {
                let mut slot = self.slot.lock().await;
                match &*slot {
                    Slot::Loaded(resources) => return Ok(Arc::clone(resources)),
                    Slot::Loading(pending) => pending.clone(),
                    Slot::Empty => {
                        let (publish, pending) = watch::channel(None);
                        *slot = Slot::Loading(pending);
                        drop(slot);
                        return self.lead_load(publish).await;
                    }
                }
            };

            let published = pending
                .wait_for(Option::is_some)
                .await
                .map(|outcome| Option::clone(&outcome));
            if let Ok(Some(outcome)) = published {
                return outcome;
            }

            // The loading caller was dropped before publishing
            let mut slot = self.slot.lock().await;
            if matches!(&*slot, Slot::Loading(current) if current.same_channel(&pending)) {
                *slot = Slot::Empty;
            }
        }
    }

    async fn lead_load(&self, publish: watch::Sender<Option<LoadOutcome>>) -> LoadOutcome {
        info!("Loading ML models...");
        let outcome = self.load().await.map(Arc::new);

        let mut slot = self.slot.lock().await;
        match &outcome {
            Ok(resources) => {
                *slot = Slot::Loaded(Arc::clone(resources));
                self.backend.activate();
                counter!("skin_model_loads_total").increment(1);
                info!("All ML models loaded successfully");
            }
            Err(e) => {
                *slot = Slot::Empty;
                counter!("skin_model_load_failures_total").increment(1);
                error!("Failed to load ML models: {}", e);
            }
        }
        drop(slot);

        publish.send_replace(Some(outcome.clone()));
        outcome
    }

    async fn load(&self) -> Result<DetectionResources, ModelLoadError> {
        let face_name = self.config.face_detector.clone();
        let mesh_name = self.config.face_landmarks.clone();

        let (face_bytes, mesh_bytes) = tokio::try_join!(
            self.source.fetch_model(&face_name),
            self.source.fetch_model(&mesh_name),
        )?;
        counter!("skin_model_fetches_total").increment(2);

        let runtime = Arc::clone(&self.runtime);
        let face = initialize(face_name, move || runtime.load_face_localizer(&face_bytes)).await?;
        info!("Face detector loaded");

        let runtime = Arc::clone(&self.runtime);
        let landmarks =
            initialize(mesh_name, move || runtime.load_landmark_localizer(&mesh_bytes)).await?;
        info!("Face landmarks detector loaded");

        Ok(DetectionResources::new(face, landmarks, self.backend.clone()))
    }

    /// Release both models and deactivate the backend. No-op when never loaded.
    pub async fn dispose(&self) {
        let mut slot = self.slot.lock().await;
        if let Slot::Loaded(_) = &*slot {
            *slot = Slot::Empty;
            self.backend.deactivate();
            info!("ML models disposed");
        }
    }

    pub async fn is_loaded(&self) -> bool {
        matches!(*self.slot.lock().await, Slot::Loaded(_))
    }

    pub fn backend(&self) -> &ComputeBackend {
        &self.backend
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl<S: ModelSource, R: ModelRuntime> DetectionProvider for ModelLifecycleManager<S, R> {
    async fn ensure_loaded(&self) -> Result<Arc<DetectionResources>, ModelLoadError> {
        ModelLifecycleManager::ensure_loaded(self).await
    }
}

/// Run a runtime initializer on the blocking pool, tagging failures with the artifact name
async fn initialize<T, F>(model: String, init: F) -> Result<T, ModelLoadError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DetectionError> + Send + 'static,
{
    match tokio::task::spawn_blocking(init).await {
        Ok(Ok(loaded)) => Ok(loaded),
        Ok(Err(e)) => Err(ModelLoadError::Runtime {
            model,
            reason: e.to_string(),
        }),
        Err(e) => Err(ModelLoadError::Runtime {
            model,
            reason: format!("initializer panicked: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FixedRuntime, StaticModelSource};
    use std::time::Duration;

    fn manager(source: StaticModelSource, runtime: FixedRuntime) -> ModelLifecycleManager<StaticModelSource, FixedRuntime> {
        ModelLifecycleManager::new(source, runtime, ModelConfig::default())
    }

    #[tokio::test]
    async fn test_load_once_and_reuse() {
        let source = StaticModelSource::with_default_artifacts();
        let fetches = source.fetch_counter();
        let runtime = FixedRuntime::centered_face();
        let inits = runtime.init_counter();
        let manager = manager(source, runtime);

        let first = manager.ensure_loaded().await.unwrap();
        let second = manager.ensure_loaded().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetches.get(), 2);
        assert_eq!(inits.get(), 2);
        assert!(manager.backend().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_are_deduplicated() {
        let source = StaticModelSource::with_default_artifacts().with_delay(Duration::from_millis(500));
        let fetches = source.fetch_counter();
        let manager = Arc::new(manager(source, FixedRuntime::centered_face()));

        let (a, b) = tokio::join!(manager.ensure_loaded(), manager.ensure_loaded());

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        // One fetch per artifact, not per caller
        assert_eq!(fetches.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_is_shared_with_waiters() {
        let source = StaticModelSource::with_default_artifacts()
            .with_delay(Duration::from_millis(500))
            .fail_next(1);
        let fetches = source.fetch_counter();
        let manager = manager(source, FixedRuntime::centered_face());

        let (a, b) = tokio::join!(manager.ensure_loaded(), manager.ensure_loaded());

        let a = a.err().unwrap();
        assert!(matches!(a, ModelLoadError::Fetch { .. }));
        assert_eq!(b.err(), Some(a));
        // The waiter did not start a load of its own
        assert_eq!(fetches.get(), 2);
        assert!(!manager.is_loaded().await);
        assert!(!manager.backend().is_ready());

        manager.ensure_loaded().await.unwrap();
        assert_eq!(fetches.get(), 4);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_distinguished_and_retryable() {
        let source = StaticModelSource::with_default_artifacts().fail_next(1);
        let fetches = source.fetch_counter();
        let manager = manager(source, FixedRuntime::centered_face());

        let err = manager.ensure_loaded().await.err().unwrap();
        assert!(matches!(err, ModelLoadError::Fetch { .. }));
        assert!(!manager.is_loaded().await);
        assert!(!manager.backend().is_ready());

        manager.ensure_loaded().await.unwrap();
        assert!(manager.is_loaded().await);
        assert_eq!(fetches.get(), 4);
    }

    #[tokio::test]
    async fn test_runtime_failure_is_distinguished() {
        let manager = manager(
            StaticModelSource::with_default_artifacts(),
            FixedRuntime::centered_face().failing(),
        );

        let err = manager.ensure_loaded().await.err().unwrap();
        assert_eq!(
            err,
            ModelLoadError::Runtime {
                model: "face_detector.onnx".into(),
                reason: "Runtime initialization failed: scripted failure".into(),
            }
        );
        assert!(!manager.is_loaded().await);
    }

    #[tokio::test]
    async fn test_dispose_releases_and_allows_reload() {
        let source = StaticModelSource::with_default_artifacts();
        let fetches = source.fetch_counter();
        let manager = manager(source, FixedRuntime::centered_face());

        // Never loaded: no-op
        manager.dispose().await;
        assert!(!manager.is_loaded().await);

        let stale = manager.ensure_loaded().await.unwrap();
        manager.dispose().await;
        assert!(!manager.is_loaded().await);
        assert!(!stale.backend().is_ready());

        manager.ensure_loaded().await.unwrap();
        assert!(manager.backend().is_ready());
        assert_eq!(fetches.get(), 4);
    }
}
