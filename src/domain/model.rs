use std::fmt;
use std::str::FromStr;

use crate::api::JobOutput;

use super::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Txt,
}

impl FileType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Csv => "spreadsheet/csv",
            FileType::Txt => "text/txt",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Txt => "txt",
        }
    }
}

impl FromStr for FileType {
    type Err = AppError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "csv" => Ok(FileType::Csv),
            "txt" => Ok(FileType::Txt),
            other => Err(AppError::UnsupportedFileType(other.to_string())),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A file the user asked for, as the caller sees it.
///
/// Values are never patched in place: each lifecycle transition consumes the
/// task and returns the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub id: String,
    pub name: String,
    pub file_type: FileType,
    pub source_url: String,
    pub destination_locator: Option<String>,
    pub is_downloading: bool,
}

impl FileTask {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        file_type: FileType,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            file_type,
            source_url: source_url.into(),
            destination_locator: None,
            is_downloading: false,
        }
    }

    pub fn running(self) -> Self {
        Self {
            is_downloading: true,
            destination_locator: None,
            ..self
        }
    }

    pub fn succeeded(self, locator: impl Into<String>) -> Self {
        Self {
            is_downloading: false,
            destination_locator: Some(locator.into()),
            ..self
        }
    }

    pub fn failed(self) -> Self {
        Self {
            is_downloading: false,
            destination_locator: None,
            ..self
        }
    }
}

/// Coarse lifecycle of a background job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Enqueued,
    Running,
    Succeeded(JobOutput),
    /// The reason is kept for logs only; callers report a generic message.
    Failed(String),
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Succeeded(_) | JobState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobState::Enqueued => "ENQUEUED",
            JobState::Running => "RUNNING",
            JobState::Succeeded(_) => "SUCCEEDED",
            JobState::Failed(_) => "FAILED",
        }
    }
}
