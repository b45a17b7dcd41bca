use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    domain::{AppError, FileTask, JobState},
    storage::StorageBackend,
};

pub const ROW_LOG_TARGET: &str = "FILE_DATA_ROW";
pub const FAILED_MESSAGE: &str = "Download failed!";
pub const UNKNOWN_MESSAGE: &str = "Something went wrong";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    Queued,
    Running,
    Succeeded { message: String, rows: Vec<String> },
    Failed { message: String },
}

/// Reacts to job state changes on the caller's side.
#[derive(Clone)]
pub struct ResultConsumer {
    storage: Arc<dyn StorageBackend>,
}

impl ResultConsumer {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub async fn on_state(&self, task: FileTask, state: &JobState) -> (FileTask, ConsumerEvent) {
        match state {
            JobState::Enqueued => (task, ConsumerEvent::Queued),
            JobState::Running => (task.running(), ConsumerEvent::Running),
            JobState::Failed(_) => (
                task.failed(),
                ConsumerEvent::Failed {
                    message: FAILED_MESSAGE.to_string(),
                },
            ),
            JobState::Succeeded(output) => {
                let uri = output.file_uri.as_str();
                match self.read_and_cleanup(uri).await {
                    Ok(rows) => (
                        task.succeeded(uri),
                        ConsumerEvent::Succeeded {
                            message: format!("File {uri} has success to download and read"),
                            rows,
                        },
                    ),
                    Err(e) => {
                        tracing::warn!(%uri, error = %e, "could not read downloaded file");
                        (
                            task.failed(),
                            ConsumerEvent::Failed {
                                message: UNKNOWN_MESSAGE.to_string(),
                            },
                        )
                    }
                }
            }
        }
    }

    /// Log every row of the file behind `locator`, then delete it.
    ///
    /// The file is deleted even when reading it fails. An empty locator, or
    /// one that resolves to nothing on disk, yields no rows and touches
    /// nothing.
    pub async fn read_and_cleanup(&self, locator: &str) -> Result<Vec<String>, AppError> {
        if locator.is_empty() {
            return Ok(Vec::new());
        }
        let Some(path) = self.storage.resolve(locator) else {
            return Ok(Vec::new());
        };
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let read = read_rows(&path).await;
        let released = self.storage.release(locator).await;
        let rows = read?;
        released?;
        tracing::debug!(%locator, rows = rows.len(), "downloaded file read and deleted");
        Ok(rows)
    }
}

/// Read lines until the first empty one or end of file.
///
/// Bytes that are not valid UTF-8 are replaced, never rejected.
async fn read_rows(path: &Path) -> Result<Vec<String>, AppError> {
    let io_err = |e: std::io::Error| AppError::Io(format!("{}: {e}", path.display()));

    let file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut rows = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await.map_err(io_err)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(strip_line_ending(&buf)).into_owned();
        if line.is_empty() {
            break;
        }
        tracing::debug!(target: ROW_LOG_TARGET, row = rows.len() + 1, "{line}");
        rows.push(line);
    }
    Ok(rows)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
