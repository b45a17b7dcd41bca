use std::sync::Arc;

use futures::StreamExt;

use crate::{
    api::{HttpDownloader, JobInput},
    application::{ConsumerEvent, DownloadWorker, JobRunner, ResultConsumer},
    config::AppConfig,
    domain::{AppError, FileTask},
    storage::{select_backend, StorageBackend},
    ui::{Notifier, StatusView},
    utils::download_job_key,
};

pub struct DownloadApp {
    view: StatusView,
    config: AppConfig,
    downloader: HttpDownloader,
    storage: Arc<dyn StorageBackend>,
    runner: JobRunner,
    consumer: ResultConsumer,
    notifier: Arc<dyn Notifier>,
    permission_granted: bool,
}

impl DownloadApp {
    pub fn new(config: AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        let storage = select_backend(config.storage, &config.storage_root, &config.download_dir);
        Self::with_storage(config, storage, notifier)
    }

    pub fn with_storage(
        config: AppConfig,
        storage: Arc<dyn StorageBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let downloader = HttpDownloader::new(config.api.clone());
        let worker = DownloadWorker::new(downloader.clone(), storage.clone(), notifier.clone());
        let runner = JobRunner::new(Arc::new(worker), config.max_concurrent_jobs);
        let consumer = ResultConsumer::new(storage.clone());

        Self {
            view: StatusView::default(),
            config,
            downloader,
            storage,
            runner,
            consumer,
            notifier,
            permission_granted: false,
        }
    }

    pub fn view(&self) -> &StatusView {
        &self.view
    }

    /// Startup storage permission check; the outcome is toasted.
    pub async fn request_permission(&mut self) -> bool {
        self.permission_granted = match self.storage.check_access().await {
            Ok(()) => {
                self.notifier.toast("Permission granted");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "storage permission check failed");
                self.notifier.toast("Permission denied");
                false
            }
        };
        self.permission_granted
    }

    /// The task a trigger starts, built from configuration.
    pub fn requested_task(&self) -> Result<FileTask, AppError> {
        let url = self.downloader.file_url(&self.config.file_name)?;
        Ok(FileTask::new(
            self.config.file_id.clone(),
            self.config.file_name.clone(),
            self.config.file_type,
            url,
        ))
    }

    /// Enqueue the download for `task` and follow the job to its end.
    ///
    /// Returns the task as it stands after the terminal state was consumed.
    pub async fn start_downloading_file(&mut self, task: FileTask) -> Result<FileTask, AppError> {
        if !self.permission_granted {
            return Err(AppError::PermissionDenied(
                "storage access was not granted".to_string(),
            ));
        }
        self.storage.check_access().await?;

        let input = JobInput {
            file_name: task.name.clone(),
            file_url: task.source_url.clone(),
            file_type: task.file_type.tag().to_string(),
        };
        let handle = self.runner.enqueue_unique(download_job_key(), input);
        if handle.kept() {
            tracing::info!(
                key = handle.key(),
                state = handle.state().name(),
                "identical request already queued, following it instead"
            );
        }
        tracing::info!(task = %task.id, job = %handle.id(), key = handle.key(), "download started");

        let mut task = task;
        let mut changes = handle.changes();
        while let Some(state) = changes.next().await {
            tracing::debug!(task = %task.id, state = state.name(), "job state changed");
            let (next, event) = self.consumer.on_state(task, &state).await;
            task = next;

            self.view.update(&event);
            if let ConsumerEvent::Succeeded { rows, .. } = &event {
                tracing::info!(task = %task.id, rows = rows.len(), "file read and cleaned up");
            }
        }

        Ok(task)
    }
}
