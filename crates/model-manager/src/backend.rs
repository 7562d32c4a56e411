//! Compute backend and scoped buffer accounting

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use image::{ImageBuffer, Pixel};
use tracing::{debug, info, warn};

/// Anything that occupies a measurable amount of compute memory
pub trait BufferBytes {
    fn byte_len(&self) -> usize;
}

impl<P: Pixel> BufferBytes for ImageBuffer<P, Vec<P::Subpixel>> {
    fn byte_len(&self) -> usize {
        self.as_raw().len() * std::mem::size_of::<P::Subpixel>()
    }
}

impl<A, D: ndarray::Dimension> BufferBytes for ndarray::Array<A, D> {
    fn byte_len(&self) -> usize {
        self.len() * std::mem::size_of::<A>()
    }
}

impl<T> BufferBytes for Vec<T> {
    fn byte_len(&self) -> usize {
        self.len() * std::mem::size_of::<T>()
    }
}

#[derive(Debug, Default)]
struct BackendInner {
    ready: AtomicBool,
    live_buffers: AtomicUsize,
    live_bytes: AtomicUsize,
}

/// Handle to the numeric backend the extraction pipeline allocates from.
///
/// Starts inactive; the model manager activates it once both detection
/// models are loaded and deactivates it on dispose.
#[derive(Debug, Clone, Default)]
pub struct ComputeBackend {
    inner: Arc<BackendInner>,
}

impl ComputeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the backend has been initialized by the model manager
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn activate(&self) {
        self.inner.ready.store(true, Ordering::SeqCst);
        debug!("Compute backend activated");
    }

    pub(crate) fn deactivate(&self) {
        self.inner.ready.store(false, Ordering::SeqCst);
        let outstanding = self.live_buffers();
        if outstanding > 0 {
            warn!(
                "Compute backend deactivated with {} buffers ({} bytes) still held",
                outstanding,
                self.live_bytes()
            );
        } else {
            info!("Compute backend deactivated");
        }
    }

    /// Number of buffers currently alive
    pub fn live_buffers(&self) -> usize {
        self.inner.live_buffers.load(Ordering::SeqCst)
    }

    /// Bytes currently held by live buffers
    pub fn live_bytes(&self) -> usize {
        self.inner.live_bytes.load(Ordering::SeqCst)
    }

    /// Register `value` with the backend; it is released when the guard drops
    pub fn track<T: BufferBytes>(&self, value: T) -> Tracked<T> {
        let bytes = value.byte_len();
        self.inner.live_buffers.fetch_add(1, Ordering::SeqCst);
        self.inner.live_bytes.fetch_add(bytes, Ordering::SeqCst);
        Tracked {
            value,
            bytes,
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A buffer registered with a `ComputeBackend`
pub struct Tracked<T: BufferBytes> {
    value: T,
    bytes: usize,
    inner: Arc<BackendInner>,
}

impl<T: BufferBytes> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: BufferBytes> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.inner.live_buffers.fetch_sub(1, Ordering::SeqCst);
        self.inner.live_bytes.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_buffers_release_on_drop() {
        let backend = ComputeBackend::new();
        {
            let a = backend.track(vec![0f32; 16]);
            let b = backend.track(image::GrayImage::new(4, 4));
            assert_eq!(backend.live_buffers(), 2);
            assert_eq!(backend.live_bytes(), 64 + 16);
            assert_eq!(a.len(), 16);
            assert_eq!(b.width(), 4);
        }
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_bytes(), 0);
    }

    #[test]
    fn test_release_on_early_return() {
        fn fails(backend: &ComputeBackend) -> Result<(), ()> {
            let _scratch = backend.track(ndarray::Array2::<f32>::zeros((8, 8)));
            Err(())
        }

        let backend = ComputeBackend::new();
        assert!(fails(&backend).is_err());
        assert_eq!(backend.live_bytes(), 0);
    }

    #[test]
    fn test_activation_shared_across_clones() {
        let backend = ComputeBackend::new();
        let clone = backend.clone();
        assert!(!clone.is_ready());
        backend.activate();
        assert!(clone.is_ready());
        backend.deactivate();
        assert!(!clone.is_ready());
    }
}
