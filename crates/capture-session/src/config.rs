//! Capture timing configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capture session timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// How long to wait for the camera to report a ready frame (milliseconds)
    pub frame_timeout_ms: u64,

    /// Pause after completion before the session resets (milliseconds)
    pub settle_delay_ms: u64,

    /// Frame readiness polling interval (milliseconds)
    pub ready_poll_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: 10_000,
            settle_delay_ms: 1_500,
            ready_poll_interval_ms: 100,
        }
    }
}

impl CaptureConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        // Zero would spin without yielding to the timer
        Duration::from_millis(self.ready_poll_interval_ms.max(1))
    }
}
