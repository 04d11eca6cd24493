use std::path::Path;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{AssetFetcher, FetchEntry, FetchProgress, FetchRequest, ProgressFn};
use crate::core::error::{LauncherError, LauncherResult};

/// Concurrent, SHA-1 validated downloader. Files already on disk with a
/// matching checksum are skipped.
pub struct HttpFetcher {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: 8,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Bring one entry up to date. Returns the number of bytes on disk.
    async fn ensure_one(&self, entry: &FetchEntry) -> LauncherResult<u64> {
        if let Ok(meta) = tokio::fs::metadata(&entry.dest).await {
            let valid = match &entry.sha1 {
                Some(expected) => file_sha1(&entry.dest).await? == *expected,
                None => true,
            };
            if valid {
                return Ok(meta.len());
            }
            debug!("Checksum mismatch, refetching {:?}", entry.dest);
        }

        let Some(url) = &entry.url else {
            return Err(LauncherError::Preparation(format!(
                "missing file {:?} and no download location",
                entry.dest
            )));
        };
        self.download_file(url, &entry.dest, entry.sha1.as_deref()).await
    }

    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> LauncherResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;

        if let Some(expected) = sha1_expected {
            let actual = hex::encode(Sha1::digest(&bytes));
            if actual != expected {
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        // Handle is dropped before the file is opened again by the game.
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
            file.write_all(&bytes)
                .await
                .map_err(|e| LauncherError::io(dest, e))?;
            file.flush().await.map_err(|e| LauncherError::io(dest, e))?;
        }

        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(bytes.len() as u64)
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn ensure(&self, request: &FetchRequest, progress: ProgressFn<'_>) -> LauncherResult<()> {
        let total = request.entries.len();
        let bytes_total = request.total_bytes();
        info!(
            "Ensuring {} launch files, concurrency={}",
            total, self.concurrency
        );

        let jobs: Vec<_> = request
            .entries
            .iter()
            .map(|entry| self.ensure_one(entry))
            .collect();
        let mut results = stream::iter(jobs).buffer_unordered(self.concurrency);

        let mut completed = 0;
        let mut bytes_done = 0;
        let mut first_error = None;
        while let Some(result) = results.next().await {
            match result {
                Ok(len) => {
                    completed += 1;
                    bytes_done += len;
                    progress(FetchProgress {
                        completed,
                        total,
                        bytes_done,
                        bytes_total,
                    });
                }
                Err(e) => {
                    debug!("Launch file failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn file_sha1(path: &Path) -> LauncherResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    Ok(hex::encode(Sha1::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_local_files_skip_the_network() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("lib.jar");
        std::fs::write(&dest, b"hello").unwrap();

        let request = FetchRequest {
            entries: vec![FetchEntry {
                // Unroutable: the test fails if a request is attempted.
                url: Some("http://127.0.0.1:9/lib.jar".into()),
                dest,
                sha1: Some("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d".into()),
                size: Some(5),
            }],
        };
        HttpFetcher::new(Client::new())
            .ensure(&request, &|_| {})
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_file_without_url_fails() {
        let temp = tempfile::tempdir().unwrap();
        let request = FetchRequest {
            entries: vec![FetchEntry {
                url: None,
                dest: temp.path().join("client.jar"),
                sha1: None,
                size: None,
            }],
        };
        let err = HttpFetcher::new(Client::new())
            .ensure(&request, &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::Preparation(_)));
    }
}
