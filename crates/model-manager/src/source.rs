//! Model artifact sources

use std::future::Future;
use std::path::PathBuf;

use tracing::debug;

use crate::ModelLoadError;

/// Fetches raw model artifacts by name
pub trait ModelSource: Send + Sync + 'static {
    fn fetch_model(&self, name: &str) -> impl Future<Output = Result<Vec<u8>, ModelLoadError>> + Send;
}

/// Reads artifacts from a local directory
#[derive(Debug, Clone)]
pub struct FsModelSource {
    dir: PathBuf,
}

impl FsModelSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ModelSource for FsModelSource {
    async fn fetch_model(&self, name: &str) -> Result<Vec<u8>, ModelLoadError> {
        let path = self.dir.join(name);
        debug!("Reading model artifact {}", path.display());
        tokio::fs::read(&path).await.map_err(|e| ModelLoadError::Fetch {
            model: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_artifact_is_fetch_error() {
        let source = FsModelSource::new("/nonexistent-model-dir");
        let err = source.fetch_model("face_detector.onnx").await.unwrap_err();
        assert!(matches!(err, ModelLoadError::Fetch { .. }));
        assert_eq!(err.model(), "face_detector.onnx");
    }

    #[tokio::test]
    async fn test_reads_artifact_bytes() {
        let dir = std::env::temp_dir().join(format!("skin-models-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("tiny.onnx"), b"onnx").await.unwrap();

        let source = FsModelSource::new(&dir);
        assert_eq!(source.fetch_model("tiny.onnx").await.unwrap(), b"onnx");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
