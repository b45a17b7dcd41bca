use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use url::Url;

use super::models::ApiConfig;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Server returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Write error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
pub struct HttpDownloader {
    config: ApiConfig,
    client: Client,
}

impl HttpDownloader {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Build `<endpoint>/<file name>`
    pub fn file_url(&self, file_name: &str) -> Result<String> {
        let raw = format!(
            "{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            file_name.trim_start_matches('/')
        );
        let url = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
        Ok(url.to_string())
    }

    /// Open the response body as a byte stream
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_url: &str,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<bytes::Bytes>>)> {
        let response = self.client.get(download_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: download_url.to_string(),
            });
        }

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::RequestError);

        Ok((total_size, stream))
    }

    /// Copy the body behind `download_url` into `sink` and return the byte count.
    ///
    /// Writes go through a buffer of `ApiConfig::buffer_size` bytes; the sink
    /// is flushed once the stream ends.
    pub async fn download_to<W>(&self, download_url: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let (total_size, stream) = self.download_file_stream(download_url).await?;
        futures::pin_mut!(stream);

        let mut writer = BufWriter::with_capacity(self.config.buffer_size.max(1), sink);
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        writer.flush().await?;

        tracing::debug!(
            url = %download_url,
            bytes = downloaded,
            expected = ?total_size,
            "download stream finished"
        );

        Ok(downloaded)
    }
}
