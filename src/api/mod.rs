pub mod client;
pub mod models;

pub use client::{ApiError, HttpDownloader};
pub use models::{ApiConfig, JobInput, JobOutput};
