use std::sync::Arc;

use async_trait::async_trait;

use super::job_runner::Worker;
use crate::{
    api::{HttpDownloader, JobInput, JobOutput},
    domain::AppError,
    storage::StorageBackend,
    ui::{Notifier, NOTIFICATION_TITLE},
};

/// Downloads one file into the selected storage backend.
pub struct DownloadWorker {
    downloader: HttpDownloader,
    storage: Arc<dyn StorageBackend>,
    notifier: Arc<dyn Notifier>,
}

impl DownloadWorker {
    pub fn new(
        downloader: HttpDownloader,
        storage: Arc<dyn StorageBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            downloader,
            storage,
            notifier,
        }
    }

    async fn download(&self, input: &JobInput) -> Result<JobOutput, AppError> {
        let mut destination = self
            .storage
            .create_destination(&input.file_name, &input.file_type)
            .await?;

        let copied = self
            .downloader
            .download_to(&input.file_url, &mut destination.file)
            .await;

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(destination.file);
                if let Err(cleanup) = self.storage.release(&destination.locator).await {
                    tracing::warn!(locator = %destination.locator, error = %cleanup, "failed to discard partial download");
                }
                return Err(e.into());
            }
        };

        destination
            .file
            .sync_all()
            .await
            .map_err(|e| AppError::Io(format!("Failed to sync file: {e}")))?;

        tracing::info!(
            file = %input.file_name,
            bytes,
            path = %destination.path.display(),
            "file downloaded"
        );

        Ok(JobOutput {
            file_uri: destination.locator,
        })
    }
}

#[async_trait]
impl Worker for DownloadWorker {
    async fn do_work(&self, input: JobInput) -> Result<JobOutput, AppError> {
        self.notifier.show_progress(NOTIFICATION_TITLE);
        let result = self.download(&input).await;
        self.notifier.clear_progress();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiConfig;
    use crate::storage::{ContentStoreBackend, DirectPathBackend};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn show_progress(&self, title: &str) {
            self.calls.lock().unwrap().push(format!("show:{title}"));
        }

        fn clear_progress(&self) {
            self.calls.lock().unwrap().push("clear".to_string());
        }

        fn toast(&self, message: &str) {
            self.calls.lock().unwrap().push(format!("toast:{message}"));
        }
    }

    fn worker(
        endpoint: &str,
        storage: Arc<dyn StorageBackend>,
    ) -> (DownloadWorker, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let downloader = HttpDownloader::new(ApiConfig {
            endpoint: endpoint.to_string(),
            buffer_size: 16,
        });
        (
            DownloadWorker::new(downloader, storage, notifier.clone()),
            notifier,
        )
    }

    fn input(server: &mockito::Server, name: &str, file_type: &str) -> JobInput {
        JobInput {
            file_name: name.to_string(),
            file_url: format!("{}/{}", server.url(), name),
            file_type: file_type.to_string(),
        }
    }

    #[tokio::test]
    async fn test_downloads_into_storage() {
        let body = "id,name\n1,alpha\n2,beta\n".repeat(50);
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/report.csv")
            .with_status(200)
            .with_body(&body)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let storage = Arc::new(ContentStoreBackend::new(tmp.path()));
        let (worker, notifier) = worker(&server.url(), storage.clone());

        let output = worker
            .do_work(input(&server, "report.csv", "csv"))
            .await
            .unwrap();

        let path = storage.resolve(&output.file_uri).unwrap();
        let saved = std::fs::read(&path).unwrap();
        assert_eq!(saved.len(), body.len());
        assert_eq!(saved, body.as_bytes());
        assert_eq!(
            *notifier.calls.lock().unwrap(),
            vec![format!("show:{NOTIFICATION_TITLE}"), "clear".to_string()]
        );
    }

    #[tokio::test]
    async fn test_http_error_discards_destination() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/broken.txt")
            .with_status(500)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let storage = Arc::new(DirectPathBackend::new(tmp.path()));
        let (worker, notifier) = worker(&server.url(), storage);

        let err = worker
            .do_work(input(&server, "broken.txt", "txt"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Transport(_)));
        assert!(!tmp.path().join("broken.txt").exists());
        assert_eq!(notifier.calls.lock().unwrap().last().unwrap(), "clear");
    }

    #[tokio::test]
    async fn test_unsupported_type_never_hits_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/image.png")
            .expect(0)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let storage = Arc::new(DirectPathBackend::new(tmp.path()));
        let (worker, _) = worker(&server.url(), storage);

        let err = worker
            .do_work(input(&server, "image.png", "png"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UnsupportedFileType(_)));
        mock.assert_async().await;
    }
}
