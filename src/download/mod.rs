use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use std::path::Path;
use std::sync::Arc;

/// Fetches a remote archive into a local file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Downloader backed by [`HttpClient`], writing through the [`Runtime`].
pub struct HttpDownloader<R: Runtime> {
    runtime: Arc<R>,
    http_client: HttpClient,
}

impl<R: Runtime> HttpDownloader<R> {
    pub fn new(runtime: Arc<R>, http_client: HttpClient) -> Self {
        Self {
            runtime,
            http_client,
        }
    }
}

#[async_trait]
impl<R: Runtime> Downloader for HttpDownloader<R> {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        download_file(self.runtime.as_ref(), url, dest, &self.http_client).await
    }
}

/// Downloads a file from a URL to `dest` with retry support.
#[tracing::instrument(skip(runtime, dest, http_client))]
pub async fn download_file<R: Runtime>(
    runtime: &R,
    url: &str,
    dest: &Path,
    http_client: &HttpClient,
) -> Result<u64> {
    info!("Downloading file from {}...", url);

    let bytes = http_client
        .download_file(url, || {
            runtime
                .create_file(dest)
                .with_context(|| format!("Failed to create download file at {:?}", dest))
        })
        .await?;

    info!("Download complete.");
    Ok(bytes)
}
