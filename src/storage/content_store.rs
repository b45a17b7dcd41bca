use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::{check_writable, prepare, remove_if_exists, Destination, StorageBackend};
use crate::domain::AppError;

const SCHEME: &str = "content";
const AUTHORITY: &str = "downloads";
const RELATIVE_PATH: &str = "Download";
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// `name` for the first attempt, then `stem (n).ext`.
fn numbered_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({attempt}).{ext}"),
        _ => format!("{name} ({attempt})"),
    }
}

/// Fields recorded when a download is registered with the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    pub display_name: String,
    pub mime_type: String,
    pub relative_path: String,
}

/// Registers downloads and hands out `content://downloads/<id>` locators.
pub struct ContentStoreBackend {
    root: PathBuf,
    entries: Mutex<HashMap<u64, ContentEntry>>,
    next_id: AtomicU64,
}

impl ContentStoreBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, ContentEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn path_of(&self, entry: &ContentEntry) -> PathBuf {
        self.root
            .join(&entry.relative_path)
            .join(&entry.display_name)
    }

    fn parse_locator(locator: &str) -> Option<u64> {
        let url = Url::parse(locator).ok()?;
        if url.scheme() != SCHEME || url.host_str() != Some(AUTHORITY) {
            return None;
        }
        url.path().trim_start_matches('/').parse().ok()
    }

    pub fn entry(&self, locator: &str) -> Option<ContentEntry> {
        let id = Self::parse_locator(locator)?;
        self.entries().get(&id).cloned()
    }

    fn insert(&self, entry: ContentEntry) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().insert(id, entry);
        id
    }

    fn download_dir(&self) -> PathBuf {
        self.root.join(RELATIVE_PATH)
    }
}

#[async_trait]
impl StorageBackend for ContentStoreBackend {
    fn name(&self) -> &'static str {
        "content-store"
    }

    async fn check_access(&self) -> Result<(), AppError> {
        check_writable(&self.download_dir()).await
    }

    async fn create_destination(
        &self,
        file_name: &str,
        file_type: &str,
    ) -> Result<Destination, AppError> {
        let (display_name, file_type) = prepare(file_name, file_type)?;
        let dir = self.download_dir();
        let failed = |path: &Path, e: std::io::Error| {
            AppError::DestinationCreateFailed(format!("{}: {e}", path.display()))
        };

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| failed(&dir, e))?;

        let mut attempt = 0;
        let (entry, path, file) = loop {
            let entry = ContentEntry {
                display_name: numbered_name(&display_name, attempt),
                mime_type: file_type.mime_type().to_string(),
                relative_path: RELATIVE_PATH.to_string(),
            };
            let path = self.path_of(&entry);
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match created {
                Ok(file) => break (entry, path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(failed(&path, e)),
            }
        };

        let id = self.insert(entry.clone());
        let locator = format!("{SCHEME}://{AUTHORITY}/{id}");
        tracing::debug!(
            %locator,
            path = %path.display(),
            registration = %serde_json::to_string(&entry).unwrap_or_default(),
            "content registered"
        );
        Ok(Destination {
            file,
            path,
            locator,
        })
    }

    fn resolve(&self, locator: &str) -> Option<PathBuf> {
        self.entry(locator).map(|entry| self.path_of(&entry))
    }

    async fn release(&self, locator: &str) -> Result<(), AppError> {
        let Some(id) = Self::parse_locator(locator) else {
            return Ok(());
        };
        let removed = self.entries().remove(&id);
        if let Some(entry) = removed {
            remove_if_exists(&self.path_of(&entry)).await?;
        }
        Ok(())
    }
}
