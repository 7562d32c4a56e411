//! Skin Analysis Engine
//!
//! Composition root: owns the detection model lifecycle, the assessment
//! repository and capture timing, and wires them into the assessment flow.

mod config;
mod logging;

pub use crate::config::{EngineConfig, LoggingConfig, ENV_PREFIX};
pub use logging::init_logging;

use std::sync::Arc;

use camera_capture::VideoSource;
use capture_session::{
    CameraDevice, CaptureConfig, CaptureError, CaptureOutcome, CaptureSession, RetryReason,
};
use model_manager::{FsModelSource, ModelLifecycleManager, ModelRuntime, ModelSource, OnnxRuntime};
use risk_scoring::{QuestionnaireInput, ValidationError};
use skin_features::AggregatedMetrics;
use storage::{AssessmentRepository, InMemoryAssessmentRepository, StorageError, StoredAssessment};
use thiserror::Error;
use tracing::{info, warn};

/// Attempts per sample slot before a guided session gives up
pub const MAX_ATTEMPTS_PER_SAMPLE: usize = 5;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Invalid questionnaire: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Gave up on sample {slot} after {attempts} attempts: {}", .reason.message())]
    RetriesExhausted {
        slot: usize,
        attempts: usize,
        reason: RetryReason,
    },
}

/// Detection models served from the filesystem through tract
pub type OnnxModels = ModelLifecycleManager<FsModelSource, OnnxRuntime>;

pub struct Engine<S: ModelSource, R: ModelRuntime, Repo: AssessmentRepository> {
    models: Arc<ModelLifecycleManager<S, R>>,
    repository: Repo,
    capture: CaptureConfig,
}

impl Engine<FsModelSource, OnnxRuntime, InMemoryAssessmentRepository> {
    /// Filesystem models, ONNX runtime and an in-memory repository
    pub fn from_config(config: &EngineConfig) -> Self {
        let models = ModelLifecycleManager::new(
            FsModelSource::new(&config.models.dir),
            OnnxRuntime::new(config.models.face_confidence),
            config.models.clone(),
        );
        Self::new(models, InMemoryAssessmentRepository::new(), config.capture.clone())
    }
}

impl<S: ModelSource, R: ModelRuntime, Repo: AssessmentRepository> Engine<S, R, Repo> {
    pub fn new(models: ModelLifecycleManager<S, R>, repository: Repo, capture: CaptureConfig) -> Self {
        Self {
            models: Arc::new(models),
            repository,
            capture,
        }
    }

    pub fn models(&self) -> &ModelLifecycleManager<S, R> {
        &self.models
    }

    pub fn repository(&self) -> &Repo {
        &self.repository
    }

    /// Validate, score and store the user's current assessment
    pub async fn assess(
        &self,
        user_id: &str,
        questionnaire: &QuestionnaireInput,
        metrics: Option<&AggregatedMetrics>,
    ) -> Result<StoredAssessment, EngineError> {
        let assessment = risk_scoring::assess(questionnaire, metrics)?;
        info!(
            "Assessment for {}: score {} ({})",
            user_id,
            assessment.rounded_score,
            assessment.tier.label()
        );
        Ok(self.repository.upsert_latest(user_id, assessment).await?)
    }

    pub async fn latest(&self, user_id: &str) -> Result<Option<StoredAssessment>, EngineError> {
        Ok(self.repository.get_latest(user_id).await?)
    }

    /// New capture session sharing this engine's models
    pub fn capture_session<V: VideoSource>(
        &self,
        camera: &CameraDevice<V>,
    ) -> CaptureSession<V, ModelLifecycleManager<S, R>> {
        CaptureSession::new(camera.clone(), Arc::clone(&self.models), self.capture.clone())
    }

    /// Run a whole session unattended, retrying recoverable samples, and
    /// return the aggregated metrics once it has settled
    pub async fn analyze<V: VideoSource>(
        &self,
        camera: &CameraDevice<V>,
    ) -> Result<AggregatedMetrics, EngineError> {
        let mut session = self.capture_session(camera);
        session.start().await?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            match session.capture().await? {
                CaptureOutcome::Accepted { accepted, progress } => {
                    info!("Sample {} accepted ({:.0}%)", accepted, progress);
                    attempts = 0;
                }
                CaptureOutcome::Retry { slot, reason } => {
                    warn!("Sample {} rejected: {}", slot + 1, reason.message());
                    if attempts >= MAX_ATTEMPTS_PER_SAMPLE {
                        session.cancel()?;
                        return Err(EngineError::RetriesExhausted {
                            slot,
                            attempts,
                            reason,
                        });
                    }
                }
                CaptureOutcome::Complete(metrics) => {
                    session.settle().await;
                    return Ok(metrics);
                }
            }
        }
    }

    /// Release the detection models
    pub async fn shutdown(&self) {
        self.models.dispose().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::mock::{skin_frame, ScriptedCamera};
    use model_manager::mock::{FixedRuntime, StaticModelSource};
    use model_manager::ModelConfig;
    use risk_scoring::{Melanation, RiskTier, SkinType, SunExposure};

    type TestEngine = Engine<StaticModelSource, FixedRuntime, InMemoryAssessmentRepository>;

    fn engine(runtime: FixedRuntime) -> TestEngine {
        Engine::new(
            ModelLifecycleManager::new(
                StaticModelSource::with_default_artifacts(),
                runtime,
                ModelConfig::default(),
            ),
            InMemoryAssessmentRepository::new(),
            CaptureConfig::default(),
        )
    }

    fn questionnaire() -> QuestionnaireInput {
        QuestionnaireInput {
            age: 40,
            gender: "Female".into(),
            skin_type: SkinType::Sensitive,
            melanation: Melanation::Dark,
            concerns: vec!["ACNE".into()],
            allergies: vec![],
            underlying_conditions: vec![],
            medications: vec![],
            smoking: false,
            sun_exposure: SunExposure::Moderate,
            water_intake: None,
            treatments_wanted: vec![],
            pregnancy_or_breastfeeding: false,
        }
    }

    #[tokio::test]
    async fn test_assess_scores_and_stores() {
        let engine = engine(FixedRuntime::centered_face());

        let stored = engine.assess("user-1", &questionnaire(), None).await.unwrap();
        assert_eq!(stored.assessment.rounded_score, 80);
        assert_eq!(stored.assessment.tier, RiskTier::Low);

        let latest = engine.latest("user-1").await.unwrap().unwrap();
        assert_eq!(latest.id, stored.id);
    }

    #[tokio::test]
    async fn test_invalid_questionnaire_is_not_stored() {
        let engine = engine(FixedRuntime::centered_face());
        let mut input = questionnaire();
        input.age = 150;

        let err = engine.assess("user-1", &input, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(engine.latest("user-1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_then_assess() {
        let engine = engine(FixedRuntime::centered_face());
        let camera = CameraDevice::new(ScriptedCamera::new(skin_frame(48, 48)));

        let metrics = engine.analyze(&camera).await.unwrap();
        assert!(metrics.metrics.in_bounds());
        assert!(camera.is_available());

        let stored = engine.assess("user-2", &questionnaire(), Some(&metrics)).await.unwrap();
        assert_eq!(stored.assessment.metrics, Some(metrics));
        assert_eq!(stored.assessment.rounded_score, 80);
    }

    #[tokio::test]
    async fn test_analyze_gives_up_without_a_face() {
        let engine = engine(FixedRuntime::no_face());
        let camera = CameraDevice::new(ScriptedCamera::new(skin_frame(32, 32)));

        let err = engine.analyze(&camera).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::RetriesExhausted {
                slot: 0,
                attempts: MAX_ATTEMPTS_PER_SAMPLE,
                reason: RetryReason::NoFace
            }
        ));
        assert!(camera.is_available());
    }

    #[tokio::test]
    async fn test_shutdown_disposes_models() {
        let engine = engine(FixedRuntime::centered_face());
        engine.models().ensure_loaded().await.unwrap();
        assert!(engine.models().is_loaded().await);

        engine.shutdown().await;
        assert!(!engine.models().is_loaded().await);
    }
}
