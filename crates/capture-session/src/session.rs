//! Capture session driver

use std::sync::Arc;

use camera_capture::{VideoFrame, VideoSource};
use metrics::counter;
use model_manager::{DetectionProvider, DetectionResources};
use skin_features::{AggregatedMetrics, FeatureExtractor, SampleResult, SAMPLES_PER_SESSION};
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::state::{transition, CaptureEvent, CaptureState};
use crate::{
    CameraDevice, CaptureConfig, CaptureError, RetryReason, SessionFailure, TransitionError,
};

/// Result of one `capture` call
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Sample stored; more are needed
    Accepted { accepted: usize, progress: f32 },
    /// Sample lost; capture the same slot again
    Retry { slot: usize, reason: RetryReason },
    /// Third sample stored and the session aggregated
    Complete(AggregatedMetrics),
}

/// One user-initiated three-sample analysis.
///
/// Owns its sample list and, while active, the camera.
pub struct CaptureSession<V: VideoSource, P: DetectionProvider> {
    id: Uuid,
    device: CameraDevice<V>,
    provider: Arc<P>,
    extractor: FeatureExtractor,
    config: CaptureConfig,
    state: CaptureState,
    camera: Option<OwnedMutexGuard<V>>,
    resources: Option<Arc<DetectionResources>>,
    samples: Vec<SampleResult>,
    progress: f32,
    result: Option<AggregatedMetrics>,
    /// When a completed session may be replaced by a fresh one
    settle_deadline: Option<Instant>,
}

impl<V: VideoSource, P: DetectionProvider> CaptureSession<V, P> {
    pub fn new(device: CameraDevice<V>, provider: Arc<P>, config: CaptureConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            provider,
            extractor: FeatureExtractor::new(),
            config,
            state: CaptureState::Idle,
            camera: None,
            resources: None,
            samples: Vec::with_capacity(SAMPLES_PER_SESSION),
            progress: 0.0,
            result: None,
            settle_deadline: None,
        }
    }

    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Percentage of the session completed, 0 after a rejection or reset
    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn accepted(&self) -> usize {
        self.samples.len()
    }

    /// Aggregated metrics once the session is complete
    pub fn result(&self) -> Option<&AggregatedMetrics> {
        self.result.as_ref()
    }

    /// User-facing message when the session has failed
    pub fn error_message(&self) -> Option<&'static str> {
        match self.state {
            CaptureState::Error(failure) => Some(failure.message()),
            _ => None,
        }
    }

    /// Load the models and open the camera.
    ///
    /// A completed session whose settle delay has passed is reset first.
    /// Fails fast with `CameraBusy`, leaving the session idle, when another
    /// session holds the camera.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_settled() {
            self.reset()?;
        }
        if self.state != CaptureState::Idle {
            return Err(TransitionError {
                state: self.state,
                event: CaptureEvent::Start,
            }
            .into());
        }
        let mut camera = self.device.try_acquire()?;
        self.apply(CaptureEvent::Start)?;
        info!(session = %self.id, "Starting capture session");

        let resources = match self.provider.ensure_loaded().await {
            Ok(resources) => resources,
            Err(e) => {
                error!(session = %self.id, "Failed to load ML models: {}", e);
                drop(camera);
                self.fail(SessionFailure::ModelLoad);
                return Err(e.into());
            }
        };

        if let Err(e) = camera.start_capture().await {
            error!(session = %self.id, "Camera initialization error: {}", e);
            camera.stop_capture();
            drop(camera);
            self.fail(SessionFailure::from(&e));
            return Err(e.into());
        }

        self.camera = Some(camera);
        self.resources = Some(resources);
        self.apply(CaptureEvent::CameraOpened)?;
        info!(session = %self.id, "Camera initialized successfully");
        Ok(())
    }

    /// Capture and analyze the next sample.
    ///
    /// Rejected rather than queued while a capture is in flight or once the
    /// quota is met.
    pub async fn capture(&mut self) -> Result<CaptureOutcome, CaptureError> {
        let slot = match self.state {
            CaptureState::CameraReady { accepted } if accepted < SAMPLES_PER_SESSION => accepted,
            CaptureState::Capturing { .. } => return Err(CaptureError::CaptureInProgress),
            CaptureState::CameraReady { .. } | CaptureState::Processing | CaptureState::Complete => {
                return Err(CaptureError::QuotaReached)
            }
            CaptureState::CameraStarting => return Err(CaptureError::CameraNotReady),
            state => {
                return Err(TransitionError {
                    state,
                    event: CaptureEvent::CaptureRequested,
                }
                .into())
            }
        };
        self.apply(CaptureEvent::CaptureRequested)?;
        debug!(session = %self.id, slot, "Capturing sample");

        let frame = match self.grab_when_ready().await {
            Ok(frame) => frame,
            Err(CaptureError::Camera(camera_capture::CameraError::Timeout)) => {
                return self.reject(slot, RetryReason::FrameTimeout)
            }
            Err(e) => {
                error!(session = %self.id, "Capture failed: {}", e);
                let failure = match &e {
                    CaptureError::Camera(camera_error) => SessionFailure::from(camera_error),
                    _ => SessionFailure::Camera,
                };
                self.fail(failure);
                return Err(e);
            }
        };

        let Some(resources) = self.resources.clone() else {
            self.fail(SessionFailure::Processing);
            return Err(CaptureError::Processing("detection resources missing".into()));
        };

        match self.extractor.extract(&frame, &resources) {
            Ok(sample) => self.accept(sample),
            // The final sample is processed as part of the session; no retry
            Err(e) if e.is_retryable() && slot + 1 < SAMPLES_PER_SESSION => {
                info!(session = %self.id, slot, "Sample rejected: {}", e);
                self.reject(slot, RetryReason::NoFace)
            }
            Err(e) => {
                error!(session = %self.id, "Failed to process captures: {}", e);
                self.fail(SessionFailure::Processing);
                Err(CaptureError::Processing(e.to_string()))
            }
        }
    }

    /// Tear the session down before processing begins.
    ///
    /// Releases the camera before returning and ends in `Idle`.
    pub fn cancel(&mut self) -> Result<(), CaptureError> {
        self.apply(CaptureEvent::Cancel)?;
        self.release_camera();
        self.clear();
        info!(session = %self.id, "Capture session cancelled");
        self.apply(CaptureEvent::Reset)?;
        Ok(())
    }

    /// Return to `Idle` from a terminal state. No-op when already idle.
    pub fn reset(&mut self) -> Result<(), CaptureError> {
        if self.state == CaptureState::Idle {
            return Ok(());
        }
        self.apply(CaptureEvent::Reset)?;
        self.release_camera();
        self.clear();
        Ok(())
    }

    /// Whether the session is complete and its settle delay has passed
    pub fn is_settled(&self) -> bool {
        self.state == CaptureState::Complete
            && self.settle_deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// After completion, wait out the settle delay and reset for a fresh session.
    ///
    /// Optional: `start` resets a settled session on its own. Returns the
    /// aggregated metrics the session produced, if any.
    pub async fn settle(&mut self) -> Option<AggregatedMetrics> {
        if self.state != CaptureState::Complete {
            return None;
        }
        if let Some(deadline) = self.settle_deadline {
            tokio::time::sleep_until(deadline).await;
        }
        let result = self.result.take();
        if let Err(e) = self.reset() {
            warn!(session = %self.id, "Reset after settle failed: {}", e);
        }
        result
    }

    async fn grab_when_ready(&mut self) -> Result<VideoFrame, CaptureError> {
        let timeout = self.config.frame_timeout();
        let poll = self.config.ready_poll_interval();
        let camera = self.camera.as_mut().ok_or(CaptureError::CameraNotReady)?;

        let ready = tokio::time::timeout(timeout, async {
            while !camera.is_frame_ready() {
                tokio::time::sleep(poll).await;
            }
        })
        .await;
        if ready.is_err() {
            warn!("Video stream timeout after {:?}", timeout);
            return Err(CaptureError::Camera(camera_capture::CameraError::Timeout));
        }

        Ok(camera.grab_frame()?)
    }

    fn accept(&mut self, sample: SampleResult) -> Result<CaptureOutcome, CaptureError> {
        self.samples.push(sample);
        self.apply(CaptureEvent::SampleAccepted)?;
        counter!("skin_samples_accepted_total").increment(1);

        let accepted = self.samples.len();
        self.progress = accepted as f32 / SAMPLES_PER_SESSION as f32 * 100.0;
        info!(session = %self.id, accepted, "Sample accepted");

        if self.state != CaptureState::Processing {
            return Ok(CaptureOutcome::Accepted {
                accepted,
                progress: self.progress,
            });
        }

        match AggregatedMetrics::try_from_samples(&self.samples) {
            Ok(metrics) => {
                self.apply(CaptureEvent::Aggregated)?;
                self.result = Some(metrics);
                self.release_camera();
                self.settle_deadline = Some(Instant::now() + self.config.settle_delay());
                counter!("skin_sessions_completed_total").increment(1);
                info!(session = %self.id, "Capture session complete");
                Ok(CaptureOutcome::Complete(metrics))
            }
            Err(e) => {
                error!(session = %self.id, "Failed to process captures: {}", e);
                self.fail(SessionFailure::Processing);
                Err(CaptureError::Processing(e.to_string()))
            }
        }
    }

    fn reject(&mut self, slot: usize, reason: RetryReason) -> Result<CaptureOutcome, CaptureError> {
        self.apply(CaptureEvent::SampleRejected)?;
        self.progress = 0.0;
        counter!("skin_samples_rejected_total").increment(1);
        Ok(CaptureOutcome::Retry { slot, reason })
    }

    /// Move to `Error`, discarding every accepted sample
    fn fail(&mut self, failure: SessionFailure) {
        match transition(self.state, CaptureEvent::Failed(failure)) {
            Ok(next) => self.state = next,
            Err(e) => warn!(session = %self.id, "{}", e),
        }
        self.release_camera();
        self.clear();
        counter!("skin_sessions_failed_total").increment(1);
    }

    fn apply(&mut self, event: CaptureEvent) -> Result<(), CaptureError> {
        let next = transition(self.state, event)?;
        debug!(session = %self.id, "{} -> {}", self.state.name(), next.name());
        self.state = next;
        Ok(())
    }

    fn release_camera(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.stop_capture();
            debug!(session = %self.id, "Camera released");
        }
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.resources = None;
        self.progress = 0.0;
        self.result = None;
        self.settle_deadline = None;
    }
}

impl<V: VideoSource, P: DetectionProvider> Drop for CaptureSession<V, P> {
    fn drop(&mut self) {
        self.release_camera();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::mock::{skin_frame, CameraProbe, ScriptedCamera};
    use camera_capture::CameraError;
    use model_manager::mock::{FixedRuntime, StaticModelSource};
    use model_manager::{ModelConfig, ModelLifecycleManager};
    use std::time::Duration;

    type Provider = ModelLifecycleManager<StaticModelSource, FixedRuntime>;

    fn provider(runtime: FixedRuntime) -> Arc<Provider> {
        Arc::new(ModelLifecycleManager::new(
            StaticModelSource::with_default_artifacts(),
            runtime,
            ModelConfig::default(),
        ))
    }

    fn session(camera: ScriptedCamera, runtime: FixedRuntime) -> (CaptureSession<ScriptedCamera, Provider>, CameraProbe) {
        let probe = camera.probe();
        let device = CameraDevice::new(camera);
        (
            CaptureSession::new(device, provider(runtime), CaptureConfig::default()),
            probe,
        )
    }

    #[tokio::test]
    async fn test_three_samples_complete_the_session() {
        let (mut session, probe) = session(ScriptedCamera::new(skin_frame(48, 48)), FixedRuntime::centered_face());
        session.start().await.unwrap();
        assert_eq!(session.state(), CaptureState::CameraReady { accepted: 0 });

        let first = session.capture().await.unwrap();
        assert!(matches!(first, CaptureOutcome::Accepted { accepted: 1, .. }));
        assert!((session.progress() - 100.0 / 3.0).abs() < 1e-4);

        session.capture().await.unwrap();
        let last = session.capture().await.unwrap();
        let CaptureOutcome::Complete(metrics) = last else {
            panic!("expected completion, got {last:?}");
        };
        assert!(metrics.metrics.in_bounds());
        assert_eq!(session.state(), CaptureState::Complete);
        assert_eq!(session.progress(), 100.0);
        assert_eq!(probe.grab_count(), 3);

        assert!(matches!(session.capture().await, Err(CaptureError::QuotaReached)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_resets_and_releases_camera() {
        let (mut session, probe) = session(ScriptedCamera::new(skin_frame(32, 32)), FixedRuntime::centered_face());
        session.start().await.unwrap();
        for _ in 0..3 {
            session.capture().await.unwrap();
        }

        let started = tokio::time::Instant::now();
        let result = session.settle().await;

        assert!(result.is_some());
        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(session.accepted(), 0);
        assert!(!probe.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_timeout_retries_same_slot() {
        let (mut session, probe) = session(
            ScriptedCamera::new(skin_frame(32, 32)).never_ready(),
            FixedRuntime::centered_face(),
        );
        session.start().await.unwrap();

        let started = tokio::time::Instant::now();
        let outcome = session.capture().await.unwrap();

        assert_eq!(
            outcome,
            CaptureOutcome::Retry {
                slot: 0,
                reason: RetryReason::FrameTimeout
            }
        );
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(session.state(), CaptureState::CameraReady { accepted: 0 });
        assert_eq!(session.progress(), 0.0);
        assert_eq!(probe.grab_count(), 0);
    }

    #[tokio::test]
    async fn test_no_face_retries_same_slot() {
        let (mut session, _probe) = session(ScriptedCamera::new(skin_frame(32, 32)), FixedRuntime::no_face());
        session.start().await.unwrap();

        let outcome = session.capture().await.unwrap();
        assert_eq!(
            outcome,
            CaptureOutcome::Retry {
                slot: 0,
                reason: RetryReason::NoFace
            }
        );
        assert_eq!(RetryReason::NoFace.message(), "No face detected. Please center your face and try again.");
        assert_eq!(session.accepted(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_fails_session_and_discards_samples() {
        let frames = vec![skin_frame(32, 32), VideoFrame::new(vec![1, 2, 3], 8, 8, 1)];
        let (mut session, probe) = session(
            ScriptedCamera::new(skin_frame(32, 32)).with_frames(frames),
            FixedRuntime::centered_face(),
        );
        session.start().await.unwrap();
        session.capture().await.unwrap();
        assert_eq!(session.accepted(), 1);

        let err = session.capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::Processing(_)));
        assert_eq!(session.state(), CaptureState::Error(SessionFailure::Processing));
        assert_eq!(session.error_message(), Some("Failed to process captures. Please try again."));
        assert_eq!(session.accepted(), 0);
        assert!(!probe.is_streaming());

        session.reset().unwrap();
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_no_face_on_final_sample_fails_session() {
        // A 1x1 frame leaves no pixels inside the centered face box
        let frames = vec![skin_frame(32, 32), skin_frame(32, 32), skin_frame(1, 1)];
        let (mut session, probe) = session(
            ScriptedCamera::new(skin_frame(32, 32)).with_frames(frames),
            FixedRuntime::centered_face(),
        );
        session.start().await.unwrap();
        session.capture().await.unwrap();
        session.capture().await.unwrap();
        assert_eq!(session.state(), CaptureState::CameraReady { accepted: 2 });

        let err = session.capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::Processing(_)));
        assert_eq!(session.state(), CaptureState::Error(SessionFailure::Processing));
        assert_eq!(session.accepted(), 0);
        assert!(session.result().is_none());
        assert!(!probe.is_streaming());
    }

    #[tokio::test]
    async fn test_grab_failure_keeps_camera_error_kind() {
        let (mut session, probe) = session(
            ScriptedCamera::new(skin_frame(32, 32))
                .failing_grab(CameraError::NoDevice("unplugged".into())),
            FixedRuntime::centered_face(),
        );
        session.start().await.unwrap();

        let err = session.capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::Camera(CameraError::NoDevice(_))));
        assert_eq!(session.state(), CaptureState::Error(SessionFailure::NoDevice));
        assert_eq!(
            session.error_message(),
            Some("No camera found. Please connect a camera and try again.")
        );
        assert!(!probe.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_session_restarts_after_settle_delay() {
        let camera = ScriptedCamera::new(skin_frame(32, 32));
        let probe = camera.probe();
        let device = CameraDevice::new(camera);
        let mut session = CaptureSession::new(
            device.clone(),
            provider(FixedRuntime::centered_face()),
            CaptureConfig::default(),
        );
        session.start().await.unwrap();
        for _ in 0..3 {
            session.capture().await.unwrap();
        }

        // Completion hands the camera back right away
        assert_eq!(session.state(), CaptureState::Complete);
        assert!(!probe.is_streaming());
        assert!(device.is_available());

        assert!(!session.is_settled());
        assert!(matches!(session.start().await, Err(CaptureError::InvalidState(_))));

        tokio::time::sleep(CaptureConfig::default().settle_delay()).await;
        assert!(session.is_settled());

        session.start().await.unwrap();
        assert_eq!(session.state(), CaptureState::CameraReady { accepted: 0 });
        assert_eq!(session.accepted(), 0);
        assert!(session.result().is_none());
        assert_eq!(probe.start_count(), 2);
    }

    #[tokio::test]
    async fn test_interrupted_capture_rejects_reentry() {
        let (mut session, _probe) = session(
            ScriptedCamera::new(skin_frame(32, 32)).never_ready(),
            FixedRuntime::centered_face(),
        );
        session.start().await.unwrap();

        // Abandon the in-flight capture mid-wait
        let abandoned = tokio::time::timeout(Duration::from_millis(10), session.capture()).await;
        assert!(abandoned.is_err());
        assert!(matches!(session.capture().await, Err(CaptureError::CaptureInProgress)));

        session.cancel().unwrap();
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_releases_camera() {
        let (mut session, probe) = session(ScriptedCamera::new(skin_frame(32, 32)), FixedRuntime::centered_face());
        session.start().await.unwrap();
        session.capture().await.unwrap();

        session.cancel().unwrap();

        assert!(!probe.is_streaming());
        assert_eq!(probe.stop_count(), 1);
        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(session.accepted(), 0);
    }

    #[tokio::test]
    async fn test_second_session_is_busy() {
        let camera = ScriptedCamera::new(skin_frame(32, 32));
        let device = CameraDevice::new(camera);
        let models = provider(FixedRuntime::centered_face());

        let mut first = CaptureSession::new(device.clone(), Arc::clone(&models), CaptureConfig::default());
        let mut second = CaptureSession::new(device.clone(), models, CaptureConfig::default());

        first.start().await.unwrap();
        assert!(matches!(second.start().await, Err(CaptureError::CameraBusy)));
        assert_eq!(second.state(), CaptureState::Idle);

        first.cancel().unwrap();
        second.start().await.unwrap();
    }

    #[tokio::test]
    async fn test_camera_errors_are_distinguished() {
        let cases = [
            (CameraError::PermissionDenied("denied".into()), SessionFailure::PermissionDenied),
            (CameraError::NoDevice("none".into()), SessionFailure::NoDevice),
            (CameraError::Open("busy".into()), SessionFailure::Camera),
        ];
        for (error, expected) in cases {
            let (mut session, probe) = session(
                ScriptedCamera::new(skin_frame(8, 8)).failing_start(error),
                FixedRuntime::centered_face(),
            );
            assert!(matches!(session.start().await, Err(CaptureError::Camera(_))));
            assert_eq!(session.state(), CaptureState::Error(expected));
            assert!(!probe.is_streaming());
        }
    }

    #[tokio::test]
    async fn test_model_load_failure_fails_session() {
        let (mut session, probe) = session(
            ScriptedCamera::new(skin_frame(8, 8)),
            FixedRuntime::centered_face().failing(),
        );
        assert!(matches!(session.start().await, Err(CaptureError::ModelLoad(_))));
        assert_eq!(session.state(), CaptureState::Error(SessionFailure::ModelLoad));
        assert_eq!(probe.start_count(), 0);
    }

    #[tokio::test]
    async fn test_capture_before_start_is_invalid() {
        let (mut session, _probe) = session(ScriptedCamera::new(skin_frame(8, 8)), FixedRuntime::centered_face());
        assert!(matches!(session.capture().await, Err(CaptureError::InvalidState(_))));
    }
}
