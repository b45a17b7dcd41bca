pub mod download_worker;
pub mod job_runner;
pub mod result_consumer;

pub use download_worker::DownloadWorker;
pub use job_runner::JobRunner;
pub use result_consumer::{ConsumerEvent, ResultConsumer};
