use serde::{Deserialize, Serialize};

/// Payload handed to a download job
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
}

/// Payload a successful download job reports back
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    pub file_uri: String,
}

/// Configuration for the HTTP downloader
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub endpoint: String,
    pub buffer_size: usize,
}

pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}
