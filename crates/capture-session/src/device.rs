//! Exclusive camera device handle

use std::sync::Arc;

use camera_capture::VideoSource;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::CaptureError;

/// Shared handle to the one physical camera.
///
/// Sessions acquire it without waiting; a second concurrent session gets
/// `CameraBusy` instead of queueing.
pub struct CameraDevice<V: VideoSource> {
    inner: Arc<Mutex<V>>,
}

impl<V: VideoSource> CameraDevice<V> {
    pub fn new(source: V) -> Self {
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }

    /// Whether no session currently holds the camera
    pub fn is_available(&self) -> bool {
        self.inner.try_lock().is_ok()
    }

    pub(crate) fn try_acquire(&self) -> Result<OwnedMutexGuard<V>, CaptureError> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .map_err(|_| CaptureError::CameraBusy)
    }
}

impl<V: VideoSource> Clone for CameraDevice<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
