use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode, Url};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::HttpConfig;
use crate::error::FetchError;
use crate::share_link::to_direct_download_url;

/// Maximum number of redirect hops followed before the last response is used as-is.
pub const MAX_REDIRECTS: usize = 5;

/// Granularity of writes, progress events and cancellation checks.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Leading bytes shared by every ZIP-family archive (APK included).
const ARCHIVE_MAGIC: [u8; 2] = [0x50, 0x4B];

/// A ZIP local file header signature alone is four bytes.
const MIN_ARCHIVE_LEN: u64 = 4;

/// A single progress tick, emitted once per chunk when the body size is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub read_bytes: u64,
    pub total_bytes: u64,
    /// `100 * read / total`, clamped to `0..=100`.
    pub percent: u8,
}

impl DownloadProgress {
    pub fn new(read_bytes: u64, total_bytes: u64) -> Self {
        let percent = if total_bytes == 0 {
            0
        } else {
            (read_bytes.saturating_mul(100) / total_bytes).min(100) as u8
        };
        Self {
            read_bytes,
            total_bytes,
            percent,
        }
    }
}

/// Terminal result of [`ArtifactFetcher::download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The artifact was written to this path and looks like an archive.
    Completed(PathBuf),
    /// The download failed; the partial file (if any) has been removed.
    Failed(String),
    /// Cancellation was observed; the partial file has been removed.
    Cancelled,
}

/// Streams binary artifacts to local storage.
///
/// Redirects are followed by hand (at most [`MAX_REDIRECTS`] hops) so every
/// hop gets fresh connect/read timeouts and the cap is enforced exactly.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: Client,
}

impl ArtifactFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: config.build_client(Policy::none())?,
        })
    }

    /// Download `url` into `destination`.
    ///
    /// `on_progress` is called synchronously from the read loop, so ticks for
    /// one download arrive in strictly increasing byte order. `cancel` is
    /// checked before every chunk and while waiting on the network; once it
    /// reads `true` the partial file is deleted and [`FetchOutcome::Cancelled`]
    /// is returned.
    ///
    /// Never returns an error: every failure is folded into
    /// [`FetchOutcome::Failed`].
    pub async fn download<F>(
        &self,
        url: &str,
        destination: &Path,
        cancel: &watch::Receiver<bool>,
        mut on_progress: F,
    ) -> FetchOutcome
    where
        F: FnMut(DownloadProgress),
    {
        let url = to_direct_download_url(url);
        let mut cancel = cancel.clone();

        match self
            .try_download(&url, destination, &mut cancel, &mut on_progress)
            .await
        {
            Ok(outcome) => {
                match &outcome {
                    FetchOutcome::Completed(path) => {
                        info!(url = %url, path = %path.display(), "artifact downloaded")
                    }
                    FetchOutcome::Failed(reason) => {
                        warn!(url = %url, reason = %reason, "artifact download failed")
                    }
                    FetchOutcome::Cancelled => info!(url = %url, "artifact download cancelled"),
                }
                outcome
            }
            Err(err) => {
                remove_partial(destination).await;
                warn!(url = %url, error = %err, "artifact download failed");
                FetchOutcome::Failed(err.to_string())
            }
        }
    }

    async fn try_download<F>(
        &self,
        url: &str,
        destination: &Path,
        cancel: &mut watch::Receiver<bool>,
        on_progress: &mut F,
    ) -> Result<FetchOutcome, FetchError>
    where
        F: FnMut(DownloadProgress),
    {
        let response = tokio::select! {
            biased;
            _ = cancelled(cancel) => {
                // A previous run may have left an artifact at this path.
                remove_partial(destination).await;
                return Ok(FetchOutcome::Cancelled);
            }
            response = self.resolve(url) => response?,
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(FetchOutcome::Failed(format!("HTTP {}", status.as_u16())));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let total_bytes = response.content_length().filter(|len| *len > 0);
        let mut file = File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut read_bytes: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel) => None,
                next = stream.next() => Some(next),
            };
            let bytes = match next {
                // Cancelled while waiting on the network.
                None => return Ok(abort(file, destination).await),
                Some(None) => break,
                Some(Some(bytes)) => bytes?,
            };

            for chunk in bytes.chunks(CHUNK_SIZE) {
                if *cancel.borrow() {
                    return Ok(abort(file, destination).await);
                }
                file.write_all(chunk).await?;
                read_bytes += chunk.len() as u64;
                if let Some(total) = total_bytes {
                    on_progress(DownloadProgress::new(read_bytes, total));
                }
            }
        }

        file.flush().await?;
        drop(file);

        if *cancel.borrow() {
            remove_partial(destination).await;
            return Ok(FetchOutcome::Cancelled);
        }

        debug!(url = %url, read_bytes, "validating artifact");
        if !looks_like_archive(destination).await? {
            remove_partial(destination).await;
            return Ok(FetchOutcome::Failed("invalid file".to_owned()));
        }

        if *cancel.borrow() {
            remove_partial(destination).await;
            return Ok(FetchOutcome::Cancelled);
        }

        Ok(FetchOutcome::Completed(destination.to_path_buf()))
    }

    /// Issue the GET and walk up to [`MAX_REDIRECTS`] redirect hops.
    ///
    /// A redirect without a `Location` header, or one past the cap, is handed
    /// back unchanged; the caller then reports it as a plain HTTP failure.
    async fn resolve(&self, url: &str) -> Result<Response, FetchError> {
        let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_owned(),
            message: e.to_string(),
        })?;
        let mut response = self.client.get(current.clone()).send().await?;

        let mut hops = 0;
        while hops < MAX_REDIRECTS && is_redirect(response.status()) {
            let next = match response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
            {
                Some(location) => current.join(location).map_err(|e| FetchError::InvalidUrl {
                    url: location.to_owned(),
                    message: e.to_string(),
                })?,
                None => break,
            };

            hops += 1;
            debug!(hop = hops, from = %current, to = %next, "following redirect");
            current = next;
            response = self.client.get(current.clone()).send().await?;
        }

        Ok(response)
    }
}

fn is_redirect(status: StatusCode) -> bool {
    (301..=308).contains(&status.as_u16())
}

/// Resolves once `rx` reads `true`. Pends forever if the sender is gone, so a
/// dropped handle is never mistaken for a cancellation request.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn abort(file: File, destination: &Path) -> FetchOutcome {
    drop(file);
    remove_partial(destination).await;
    FetchOutcome::Cancelled
}

/// Whether the file at `path` starts like a ZIP archive (and therefore like an APK).
pub async fn looks_like_archive(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path).await?;
    if file.metadata().await?.len() < MIN_ARCHIVE_LEN {
        return Ok(false);
    }
    let mut magic = [0u8; 2];
    file.read_exact(&mut magic).await?;
    Ok(magic == ARCHIVE_MAGIC)
}

/// Best-effort removal of a partial or stale artifact. A missing file is not
/// an error.
pub async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove partial artifact");
        }
    }
}
