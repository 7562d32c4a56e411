//! Capture session state machine

use serde::{Deserialize, Serialize};

use crate::{SessionFailure, TransitionError};
use skin_features::SAMPLES_PER_SESSION;

/// Where a capture session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureState {
    /// No camera access held
    #[default]
    Idle,
    /// Models loading and camera access requested
    CameraStarting,
    /// Waiting for the user to trigger the next capture
    CameraReady { accepted: usize },
    /// Capturing and extracting the sample for `slot`
    Capturing { slot: usize },
    /// All samples accepted; aggregating
    Processing,
    Complete,
    Error(SessionFailure),
    Cancelled,
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "Idle",
            CaptureState::CameraStarting => "CameraStarting",
            CaptureState::CameraReady { .. } => "CameraReady",
            CaptureState::Capturing { .. } => "Capturing",
            CaptureState::Processing => "Processing",
            CaptureState::Complete => "Complete",
            CaptureState::Error(_) => "Error",
            CaptureState::Cancelled => "Cancelled",
        }
    }

    /// Complete, Error and Cancelled only leave via reset
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CaptureState::Complete | CaptureState::Error(_) | CaptureState::Cancelled
        )
    }

    /// Cancellation is allowed until processing begins
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            CaptureState::Idle
                | CaptureState::CameraStarting
                | CaptureState::CameraReady { .. }
                | CaptureState::Capturing { .. }
        )
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    Start,
    CameraOpened,
    CaptureRequested,
    SampleAccepted,
    /// Recoverable per-sample failure; the slot is retried
    SampleRejected,
    Aggregated,
    Failed(SessionFailure),
    Cancel,
    Reset,
}

impl CaptureEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureEvent::Start => "Start",
            CaptureEvent::CameraOpened => "CameraOpened",
            CaptureEvent::CaptureRequested => "CaptureRequested",
            CaptureEvent::SampleAccepted => "SampleAccepted",
            CaptureEvent::SampleRejected => "SampleRejected",
            CaptureEvent::Aggregated => "Aggregated",
            CaptureEvent::Failed(_) => "Failed",
            CaptureEvent::Cancel => "Cancel",
            CaptureEvent::Reset => "Reset",
        }
    }
}

/// Pure transition function
pub fn transition(state: CaptureState, event: CaptureEvent) -> Result<CaptureState, TransitionError> {
    use CaptureEvent as E;
    use CaptureState as S;

    let next = match (state, event) {
        (S::Idle, E::Start) => S::CameraStarting,
        (S::CameraStarting, E::CameraOpened) => S::CameraReady { accepted: 0 },
        (S::CameraReady { accepted }, E::CaptureRequested) if accepted < SAMPLES_PER_SESSION => {
            S::Capturing { slot: accepted }
        }
        (S::Capturing { slot }, E::SampleAccepted) => {
            if slot + 1 < SAMPLES_PER_SESSION {
                S::CameraReady { accepted: slot + 1 }
            } else {
                S::Processing
            }
        }
        (S::Capturing { slot }, E::SampleRejected) => S::CameraReady { accepted: slot },
        (S::Processing, E::Aggregated) => S::Complete,
        (s, E::Failed(failure)) if !s.is_terminal() => S::Error(failure),
        (s, E::Cancel) if s.is_cancellable() => S::Cancelled,
        (s, E::Reset) if s.is_terminal() => S::Idle,
        (state, event) => return Err(TransitionError { state, event }),
    };
    Ok(next)
}
