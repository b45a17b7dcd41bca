use std::path::PathBuf;

use crate::{
    api::ApiConfig,
    domain::{AppError, FileType},
    storage::StorageCapability,
};

pub const DEFAULT_LOG_FILTER: &str = "info,FILE_DATA_ROW=debug";

/// Everything the app needs to know before the first download
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub file_id: String,
    pub file_name: String,
    pub file_type: FileType,
    pub storage: StorageCapability,
    /// Root the content store registers `Download/` entries under
    pub storage_root: PathBuf,
    /// Target of the direct-path backend
    pub download_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_root = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let download_dir = dirs::download_dir().unwrap_or_else(|| storage_root.join("Download"));

        Self {
            api: ApiConfig::default(),
            file_id: "20".to_string(),
            file_name: "test.csv".to_string(),
            file_type: FileType::Csv,
            storage: StorageCapability::ContentStore,
            storage_root,
            download_dir,
            max_concurrent_jobs: 1,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` knows about.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("FETCH_ENDPOINT") {
            config.api.endpoint = endpoint;
        }
        if let Some(name) = lookup("FETCH_FILE_NAME") {
            config.file_name = name;
        }
        if let Some(tag) = lookup("FETCH_FILE_TYPE") {
            config.file_type = tag.parse()?;
        }
        if let Some(mode) = lookup("FETCH_STORAGE") {
            config.storage = mode.parse()?;
        }
        if let Some(root) = lookup("FETCH_STORAGE_ROOT") {
            config.storage_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup("FETCH_DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup("FETCH_BUFFER_SIZE") {
            config.api.buffer_size = parse_positive("FETCH_BUFFER_SIZE", &size)?;
        }
        if let Some(jobs) = lookup("FETCH_MAX_JOBS") {
            config.max_concurrent_jobs = parse_positive("FETCH_MAX_JOBS", &jobs)?;
        }
        if let Some(filter) = lookup("FETCH_LOG") {
            config.log_filter = filter;
        }

        Ok(config)
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize, AppError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AppError::Config(format!(
            "{key} must be a positive integer, got {raw:?}"
        ))),
    }
}
