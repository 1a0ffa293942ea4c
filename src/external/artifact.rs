use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::utils::error::AppError;

/// Blob storage for uploaded images (payment proofs). Failures during a
/// proof upload are the critical path and propagate; removals after a
/// release are best-effort and only logged by callers.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores the bytes and returns an opaque reference for later removal.
    async fn store(&self, bytes: &[u8]) -> Result<String, AppError>;

    async fn remove(&self, reference: &str) -> Result<(), AppError>;
}

/// Artifact store over a local directory. Each blob gets a fresh UUID file
/// name; the reference is the file name, never a caller-supplied path.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(&self, bytes: &[u8]) -> Result<String, AppError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            AppError::ExternalService(format!("artifact directory unavailable: {e}"))
        })?;

        let name = format!("{}.bin", Uuid::new_v4());
        tokio::fs::write(self.root.join(&name), bytes)
            .await
            .map_err(|e| {
                AppError::ExternalService(format!("failed to store artifact: {e}"))
            })?;
        Ok(name)
    }

    async fn remove(&self, reference: &str) -> Result<(), AppError> {
        // References are server-generated file names; anything else is a bug
        // upstream, not a request to walk the filesystem.
        if reference.contains('/') || reference.contains('\\') {
            return Err(AppError::ExternalService(format!(
                "malformed artifact reference: {reference}"
            )));
        }
        tokio::fs::remove_file(self.root.join(reference))
            .await
            .map_err(|e| {
                AppError::ExternalService(format!("failed to remove artifact: {e}"))
            })
    }
}

/// Keeps blobs in a map. Used by the test suite and local development.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.blobs
            .lock()
            .expect("artifact state poisoned")
            .contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().expect("artifact state poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn store(&self, bytes: &[u8]) -> Result<String, AppError> {
        let reference = format!("{}.bin", Uuid::new_v4());
        self.blobs
            .lock()
            .expect("artifact state poisoned")
            .insert(reference.clone(), bytes.to_vec());
        Ok(reference)
    }

    async fn remove(&self, reference: &str) -> Result<(), AppError> {
        let removed = self
            .blobs
            .lock()
            .expect("artifact state poisoned")
            .remove(reference);
        match removed {
            Some(_) => Ok(()),
            None => Err(AppError::ExternalService(format!(
                "unknown artifact reference: {reference}"
            ))),
        }
    }
}
