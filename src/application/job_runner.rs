use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::{watch, Semaphore};

use crate::{
    api::{JobInput, JobOutput},
    domain::{AppError, JobState},
};

/// Body of a background job. One call is one attempt; there are no retries.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn do_work(&self, input: JobInput) -> Result<JobOutput, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Caller side of a job: identity plus a subscription to its state.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    key: String,
    kept: bool,
    state: watch::Receiver<JobState>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// True when this request was dropped in favour of an unfinished job
    /// already registered under the same key.
    pub fn kept(&self) -> bool {
        self.kept
    }

    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// The current state followed by every later change, ending after a
    /// terminal state. Rapid transitions may be coalesced.
    pub fn changes(self) -> BoxStream<'static, JobState> {
        futures::stream::unfold(Some((self.state, true)), |seed| async move {
            let (mut rx, first) = seed?;
            if !first {
                rx.changed().await.ok()?;
            }
            let state = rx.borrow_and_update().clone();
            let next = if state.is_finished() {
                None
            } else {
                Some((rx, false))
            };
            Some((state, next))
        })
        .boxed()
    }

    /// Wait for the terminal state.
    #[cfg(test)]
    pub async fn wait(mut self) -> JobState {
        match self.state.wait_for(JobState::is_finished).await {
            Ok(state) => (*state).clone(),
            Err(_) => JobState::Failed("job runner dropped the job".to_string()),
        }
    }
}

struct UniqueEntry {
    id: JobId,
    state: watch::Receiver<JobState>,
}

type UniqueJobs = Arc<Mutex<HashMap<String, UniqueEntry>>>;

fn lock(jobs: &UniqueJobs) -> MutexGuard<'_, HashMap<String, UniqueEntry>> {
    jobs.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs jobs on the tokio worker pool, at most `max_concurrent` at a time.
#[derive(Clone)]
pub struct JobRunner {
    worker: Arc<dyn Worker>,
    permits: Arc<Semaphore>,
    unique: UniqueJobs,
    next_id: Arc<AtomicU64>,
}

impl JobRunner {
    pub fn new(worker: Arc<dyn Worker>, max_concurrent: usize) -> Self {
        Self {
            worker,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            unique: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Enqueue `input` under `key`.
    ///
    /// If an unfinished job already holds `key` the new request is dropped
    /// and the existing job's handle is returned instead. Finished jobs free
    /// their key.
    pub fn enqueue_unique(&self, key: impl Into<String>, input: JobInput) -> JobHandle {
        let key = key.into();
        let mut unique = lock(&self.unique);

        if let Some(existing) = unique.get(&key) {
            if !existing.state.borrow().is_finished() {
                tracing::info!(%key, job = %existing.id, "job already enqueued, keeping existing");
                return JobHandle {
                    id: existing.id,
                    key,
                    kept: true,
                    state: existing.state.clone(),
                };
            }
        }

        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = watch::channel(JobState::Enqueued);
        unique.insert(
            key.clone(),
            UniqueEntry {
                id,
                state: rx.clone(),
            },
        );
        drop(unique);

        tracing::info!(%key, job = %id, file = %input.file_name, "job enqueued");
        tokio::spawn(run_job(
            id,
            key.clone(),
            input,
            tx,
            self.worker.clone(),
            self.permits.clone(),
            self.unique.clone(),
        ));

        JobHandle {
            id,
            key,
            kept: false,
            state: rx,
        }
    }
}

async fn run_job(
    id: JobId,
    key: String,
    input: JobInput,
    tx: watch::Sender<JobState>,
    worker: Arc<dyn Worker>,
    permits: Arc<Semaphore>,
    unique: UniqueJobs,
) {
    let final_state = match permits.acquire_owned().await {
        Ok(_permit) => {
            tx.send_replace(JobState::Running);
            tracing::debug!(job = %id, "job running");

            // A panicking worker fails the job instead of leaving it running.
            match tokio::spawn(async move { worker.do_work(input).await }).await {
                Ok(Ok(output)) => JobState::Succeeded(output),
                Ok(Err(e)) => JobState::Failed(e.to_string()),
                Err(e) => JobState::Failed(format!("worker aborted: {e}")),
            }
        }
        Err(_) => JobState::Failed("job runner closed".to_string()),
    };

    match &final_state {
        JobState::Succeeded(output) => {
            tracing::info!(job = %id, uri = %output.file_uri, "job succeeded")
        }
        JobState::Failed(reason) => tracing::warn!(job = %id, %reason, "job failed"),
        _ => {}
    }

    {
        let mut unique = lock(&unique);
        if unique.get(&key).map(|entry| entry.id) == Some(id) {
            unique.remove(&key);
        }
    }
    tx.send_replace(final_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Worker that blocks until the test opens the gate.
    struct GatedWorker {
        gate: Arc<Semaphore>,
        runs: AtomicUsize,
        fail: bool,
    }

    impl GatedWorker {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                gate: Arc::new(Semaphore::new(0)),
                runs: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Worker for GatedWorker {
        async fn do_work(&self, input: JobInput) -> Result<JobOutput, AppError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.gate
                .acquire()
                .await
                .map_err(|e| AppError::Io(e.to_string()))?
                .forget();
            if self.fail {
                return Err(AppError::Transport("connection reset".into()));
            }
            Ok(JobOutput {
                file_uri: format!("file:///tmp/{}", input.file_name),
            })
        }
    }

    struct PanickingWorker;

    #[async_trait]
    impl Worker for PanickingWorker {
        async fn do_work(&self, _input: JobInput) -> Result<JobOutput, AppError> {
            panic!("worker blew up");
        }
    }

    async fn until_state(handle: &JobHandle, reached: impl Fn(&JobState) -> bool) {
        let mut state = handle.state.clone();
        state.wait_for(|s| reached(s)).await.unwrap();
    }

    fn input(name: &str) -> JobInput {
        JobInput {
            file_name: name.into(),
            file_url: format!("http://host/{name}"),
            file_type: "csv".into(),
        }
    }

    #[tokio::test]
    async fn test_same_key_keeps_first_job() {
        let worker = GatedWorker::new(false);
        let runner = JobRunner::new(worker.clone(), 4);

        let first = runner.enqueue_unique("downloadFile_1", input("a.csv"));
        let second = runner.enqueue_unique("downloadFile_1", input("b.csv"));

        assert!(!first.kept());
        assert!(second.kept());
        assert_eq!(first.id(), second.id());

        worker.gate.add_permits(2);
        let a = first.wait().await;
        let b = second.wait().await;

        assert_eq!(
            a,
            JobState::Succeeded(JobOutput {
                file_uri: "file:///tmp/a.csv".into()
            })
        );
        assert_eq!(a, b);
        assert_eq!(worker.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finished_job_frees_its_key() {
        let worker = GatedWorker::new(false);
        worker.gate.add_permits(2);
        let runner = JobRunner::new(worker.clone(), 1);

        let first = runner.enqueue_unique("k", input("a.csv"));
        assert!(first.wait().await.is_finished());

        let again = runner.enqueue_unique("k", input("b.csv"));
        assert!(!again.kept());
        again.wait().await;
        assert_eq!(worker.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_both_run() {
        let worker = GatedWorker::new(false);
        worker.gate.add_permits(2);
        let runner = JobRunner::new(worker.clone(), 2);

        let a = runner.enqueue_unique("downloadFile_1", input("a.csv"));
        let b = runner.enqueue_unique("downloadFile_2", input("b.csv"));
        assert_ne!(a.id(), b.id());

        a.wait().await;
        b.wait().await;
        assert_eq!(worker.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_attempt_is_terminal() {
        let worker = GatedWorker::new(true);
        worker.gate.add_permits(1);
        let runner = JobRunner::new(worker.clone(), 1);

        let handle = runner.enqueue_unique("k", input("a.csv"));
        let state = handle.wait().await;

        assert!(matches!(state, JobState::Failed(reason) if reason.contains("connection reset")));
        assert_eq!(worker.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_worker_fails_job() {
        let runner = JobRunner::new(Arc::new(PanickingWorker), 1);
        let state = runner.enqueue_unique("k", input("a.csv")).wait().await;
        assert!(matches!(state, JobState::Failed(_)));
    }

    #[tokio::test]
    async fn test_jobs_wait_for_a_free_slot() {
        let worker = GatedWorker::new(false);
        let runner = JobRunner::new(worker.clone(), 1);

        let a = runner.enqueue_unique("a", input("a.csv"));
        let b = runner.enqueue_unique("b", input("b.csv"));
        until_state(&a, |s| *s == JobState::Running).await;

        // `a` holds the only slot until the gate opens
        assert_eq!(a.state(), JobState::Running);
        assert_eq!(b.state(), JobState::Enqueued);

        worker.gate.add_permits(2);
        a.wait().await;
        b.wait().await;
        assert_eq!(worker.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_changes_end_with_terminal_state() {
        let worker = GatedWorker::new(false);
        let runner = JobRunner::new(worker.clone(), 1);
        let handle = runner.enqueue_unique("k", input("a.csv"));
        let watcher = handle.clone();

        let observer = tokio::spawn(handle.changes().collect::<Vec<_>>());
        until_state(&watcher, |s| *s == JobState::Running).await;
        worker.gate.add_permits(1);

        let states = observer.await.unwrap();
        assert!(!states.is_empty());
        assert!(states.last().unwrap().is_finished());
        assert_eq!(states.iter().filter(|s| s.is_finished()).count(), 1);
    }
}
