//! HTTP client with built-in retry logic and error handling.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use std::io::Write;

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable};

/// HTTP client with built-in retry logic for network operations.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Downloads `url` into the writer produced by `create_writer`.
    ///
    /// The writer is only created once the server has answered with a success
    /// status, so a 404 never leaves an empty file behind. Transient errors are
    /// retried and each attempt gets a fresh writer.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        self.with_retry("Download", || self.download_file_once(url, &create_writer))
            .await
    }

    /// Single download attempt without retry.
    async fn download_file_once<W, F>(&self, url: &str, create_writer: &F) -> Result<u64>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to start download request")?;

        let mut response = response.error_for_status().map_err(check_retryable)?;

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush downloaded file")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }

    /// Executes an async operation with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable_error(&e) {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < MAX_RETRIES {
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                            operation_name, attempt, MAX_RETRIES, e, RETRY_DELAY_MS
                        );
                        tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)
        }))
    }
}

/// Everything that isn't explicitly non-retryable is retried.
fn is_retryable_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<NonRetryableError>().is_none()
}
