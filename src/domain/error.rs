use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Failed to create destination: {0}")]
    DestinationCreateFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<crate::api::ApiError> for AppError {
    fn from(err: crate::api::ApiError) -> Self {
        match err {
            crate::api::ApiError::Io(e) => AppError::Io(e.to_string()),
            other => AppError::Transport(other.to_string()),
        }
    }
}
