use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use super::{check_writable, prepare, remove_if_exists, Destination, StorageBackend};
use crate::domain::AppError;

/// Writes straight into a shared downloads directory and hands out `file://`
/// locators.
pub struct DirectPathBackend {
    dir: PathBuf,
}

impl DirectPathBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn absolute_dir(&self) -> Result<PathBuf, AppError> {
        let failed =
            |e: std::io::Error| AppError::DestinationCreateFailed(format!("{}: {e}", self.dir.display()));

        tokio::fs::create_dir_all(&self.dir).await.map_err(failed)?;
        tokio::fs::canonicalize(&self.dir).await.map_err(failed)
    }
}

fn locator_for(path: &Path) -> Result<String, AppError> {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|_| AppError::DestinationCreateFailed(format!("{} is not absolute", path.display())))
}

#[async_trait]
impl StorageBackend for DirectPathBackend {
    fn name(&self) -> &'static str {
        "direct-path"
    }

    async fn check_access(&self) -> Result<(), AppError> {
        check_writable(&self.dir).await
    }

    async fn create_destination(
        &self,
        file_name: &str,
        file_type: &str,
    ) -> Result<Destination, AppError> {
        let (name, _) = prepare(file_name, file_type)?;
        let path = self.absolute_dir().await?.join(name);
        let locator = locator_for(&path)?;

        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| AppError::DestinationCreateFailed(format!("{}: {e}", path.display())))?;

        tracing::debug!(%locator, path = %path.display(), "direct destination created");
        Ok(Destination {
            file,
            path,
            locator,
        })
    }

    fn resolve(&self, locator: &str) -> Option<PathBuf> {
        let url = Url::parse(locator).ok()?;
        if url.scheme() != "file" {
            return None;
        }
        url.to_file_path().ok()
    }

    async fn release(&self, locator: &str) -> Result<(), AppError> {
        match self.resolve(locator) {
            Some(path) => remove_if_exists(&path).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_file_in_download_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Downloads");
        let backend = DirectPathBackend::new(&dir);

        let dest = backend.create_destination("test.txt", "txt").await.unwrap();
        let expected = tokio::fs::canonicalize(&dir).await.unwrap().join("test.txt");

        assert_eq!(dest.path, expected);
        assert!(dest.locator.starts_with("file://"));
        assert_eq!(backend.resolve(&dest.locator), Some(expected));
    }

    #[tokio::test]
    async fn test_release_deletes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DirectPathBackend::new(tmp.path());
        let dest = backend.create_destination("x.csv", "csv").await.unwrap();
        drop(dest.file);

        backend.release(&dest.locator).await.unwrap();
        assert!(!dest.path.exists());
        backend.release(&dest.locator).await.unwrap();
    }

    #[test]
    fn test_resolve_ignores_other_schemes() {
        let backend = DirectPathBackend::new("/tmp");
        assert!(backend.resolve("content://downloads/1").is_none());
        assert!(backend.resolve("not a locator").is_none());
    }

    #[tokio::test]
    async fn test_check_access() {
        let tmp = tempfile::tempdir().unwrap();
        let ok = DirectPathBackend::new(tmp.path().join("nested").join("dl"));
        ok.check_access().await.unwrap();

        std::fs::write(tmp.path().join("blocked"), b"").unwrap();
        let blocked = DirectPathBackend::new(tmp.path().join("blocked"));
        assert!(matches!(
            blocked.check_access().await,
            Err(AppError::PermissionDenied(_))
        ));
    }
}
