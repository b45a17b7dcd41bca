//! Where downloaded files are persisted.
//!
//! Two backends exist, mirroring the two ways a public downloads area can be
//! reached: registering content with a store ([`ContentStoreBackend`]) or
//! writing straight into a shared directory ([`DirectPathBackend`]). Which one
//! is used is decided once, in [`select_backend`].

pub mod content_store;
pub mod direct_path;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AppError, FileType};

pub use content_store::ContentStoreBackend;
pub use direct_path::DirectPathBackend;

/// A freshly created, writable destination
#[derive(Debug)]
pub struct Destination {
    pub file: tokio::fs::File,
    pub path: PathBuf,
    pub locator: String,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verify the downloads area can be written to.
    async fn check_access(&self) -> Result<(), AppError>;

    /// Create the destination for `file_name`. `file_type` must be a supported
    /// tag, otherwise nothing is created.
    async fn create_destination(
        &self,
        file_name: &str,
        file_type: &str,
    ) -> Result<Destination, AppError>;

    /// Map a locator back to a readable local path.
    fn resolve(&self, locator: &str) -> Option<PathBuf>;

    /// Delete the persisted file behind `locator`.
    async fn release(&self, locator: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageCapability {
    /// Files are registered with a content store under `Download/`
    ContentStore,
    /// Files are written directly into the downloads directory
    DirectPath,
}

impl FromStr for StorageCapability {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(StorageCapability::ContentStore),
            "direct" => Ok(StorageCapability::DirectPath),
            other => Err(AppError::Config(format!("unknown storage mode: {other}"))),
        }
    }
}

pub fn select_backend(
    capability: StorageCapability,
    storage_root: &Path,
    download_dir: &Path,
) -> Arc<dyn StorageBackend> {
    let backend: Arc<dyn StorageBackend> = match capability {
        StorageCapability::ContentStore => Arc::new(ContentStoreBackend::new(storage_root)),
        StorageCapability::DirectPath => Arc::new(DirectPathBackend::new(download_dir)),
    };
    tracing::info!(backend = backend.name(), "storage backend selected");
    backend
}

/// Validate the type tag and clean up the display name before touching disk.
pub(crate) fn prepare(file_name: &str, file_type: &str) -> Result<(String, FileType), AppError> {
    let file_type: FileType = file_type.parse()?;
    let name = crate::utils::sanitize_filename(file_name);
    if name.is_empty() || name == "." || name == ".." {
        return Err(AppError::DestinationCreateFailed(format!(
            "invalid file name: {file_name:?}"
        )));
    }
    Ok((name, file_type))
}

/// Create `dir` and make sure a file can be written in it.
pub(crate) async fn check_writable(dir: &Path) -> Result<(), AppError> {
    let denied = |e: std::io::Error| AppError::PermissionDenied(format!("{}: {e}", dir.display()));

    tokio::fs::create_dir_all(dir).await.map_err(denied)?;
    let marker = dir.join(format!(
        ".write-check-{}-{}",
        std::process::id(),
        crate::utils::get_timestamp_millis()
    ));
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .await
        .map_err(denied)?;
    tokio::fs::remove_file(&marker).await.map_err(denied)?;
    Ok(())
}

/// Remove a file, treating an already missing file as success.
pub(crate) async fn remove_if_exists(path: &Path) -> Result<(), AppError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Io(format!("{}: {e}", path.display()))),
    }
}
