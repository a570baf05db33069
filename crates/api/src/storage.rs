//! Storage for uploaded pre-project files.
//!
//! References handed back by [`FileStorage::save`] are relative paths of the
//! form `<category>/<uuid>-<name>`; they are what the `file` column stores.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use capstone_core::error::CoreError;

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Persist `data` and return its reference.
    async fn save(&self, category: &str, original_name: &str, data: &[u8])
        -> Result<String, CoreError>;

    /// Remove a stored file. Removing a file that is already gone succeeds.
    async fn delete(&self, reference: &str) -> Result<(), CoreError>;
}

/// Stores files on the local filesystem under a root directory.
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of a reference, or `None` if it would escape the root.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let relative = Path::new(reference);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(
        &self,
        category: &str,
        original_name: &str,
        data: &[u8],
    ) -> Result<String, CoreError> {
        let reference = format!(
            "{category}/{}-{}",
            uuid::Uuid::new_v4(),
            sanitize_file_name(original_name)
        );
        let path = self
            .resolve(&reference)
            .ok_or_else(|| CoreError::Internal(format!("invalid storage category '{category}'")))?;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| CoreError::Upstream(format!("create {}: {e}", dir.display())))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| CoreError::Upstream(format!("write {}: {e}", path.display())))?;

        tracing::debug!(reference = %reference, bytes = data.len(), "Stored uploaded file");
        Ok(reference)
    }

    async fn delete(&self, reference: &str) -> Result<(), CoreError> {
        let path = self
            .resolve(reference)
            .ok_or_else(|| CoreError::Validation(format!("invalid file reference '{reference}'")))?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Upstream(format!("remove {}: {e}", path.display()))),
        }
    }
}

/// Reduce a client-supplied file name to a safe single path segment.
///
/// Directory parts are dropped and anything outside `[A-Za-z0-9._-]` becomes
/// `_`. An empty result falls back to `upload`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}
