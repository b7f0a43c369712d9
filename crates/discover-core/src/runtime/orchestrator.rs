use std::path::PathBuf;
use std::sync::Arc;

use discover_fetch::{ArtifactFetcher, FetchOutcome, remove_partial};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::DiscoverError;
use crate::runtime::jobs::{CancelTarget, JobTable};
use crate::runtime::store::StateStore;
use crate::runtime::types::{DownloadEvent, DownloadId, DownloadStatus};

/// Commands sent to the orchestrator's internal event loop.
#[derive(Debug)]
pub enum OrchestratorCommand {
    /// Accept a new download.
    Submit {
        request: DownloadRequest,
        /// Channel used to return the allocated `DownloadId` to the caller.
        reply_tx: oneshot::Sender<DownloadId>,
    },
    /// Request cancellation of matching active downloads.
    Cancel { target: CancelTarget },
}

/// What to download, and for which package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub package_name: String,
    pub url: String,
}

impl DownloadRequest {
    pub fn new(package_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            url: url.into(),
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Directory artifacts are written into.
    pub cache_dir: PathBuf,
    /// Maximum number of commands waiting for the dispatch loop.
    pub queue_capacity: usize,
    /// Events buffered per subscriber before the slowest one starts lagging.
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("discover-launcher").join("apk"),
            queue_capacity: 64,
            event_capacity: 256,
        }
    }
}

impl OrchestratorConfig {
    pub fn set_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn set_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn set_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Deterministic destination for `package`'s artifact.
    pub fn artifact_path(&self, package: &str) -> PathBuf {
        self.cache_dir.join(artifact_file_name(package))
    }
}

/// `com.x.y` becomes `com_x_y_update.apk`. Characters outside
/// `[A-Za-z0-9_-]` are replaced too so a package name can never escape the
/// cache directory.
pub fn artifact_file_name(package: &str) -> String {
    let stem: String = package
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}_update.apk")
}

/// Why [`DownloadEvents::recv`] returned without an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EventsError {
    #[error("download orchestrator stopped")]
    Closed,
    /// The subscriber fell behind and this many events were dropped. Receiving can
    /// continue; terminal states that were missed are still in the store
    /// (see [`AppCatalogState::terminal_event`](crate::runtime::store::AppCatalogState::terminal_event)).
    #[error("download event subscriber lagged by {0} events")]
    Lagged(u64),
}

/// Receives orchestrator events, optionally for a single package.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct DownloadEvents {
    rx: broadcast::Receiver<DownloadEvent>,
    package: Option<String>,
}

impl DownloadEvents {
    /// Next matching event.
    ///
    /// Returns [`EventsError::Lagged`] once after events were dropped for this
    /// subscriber, and [`EventsError::Closed`] when the orchestrator is gone.
    pub async fn recv(&mut self) -> Result<DownloadEvent, EventsError> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self
                        .package
                        .as_ref()
                        .is_none_or(|pkg| *pkg == event.package_name)
                    {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "download event subscriber lagged");
                    return Err(EventsError::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(EventsError::Closed),
            }
        }
    }
}

/// Writes each event to the state store, then broadcasts it.
///
/// Subscribers that react to an event therefore always find the store
/// already updated.
#[derive(Debug, Clone)]
struct Publisher {
    store: StateStore,
    events: broadcast::Sender<DownloadEvent>,
}

impl Publisher {
    fn publish(&self, event: DownloadEvent) {
        debug!(
            download_id = event.download_id,
            package = %event.package_name,
            status = %event.status,
            progress = ?event.progress,
            "download event"
        );
        self.store.apply_event(&event);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// The download orchestrator.
///
/// Accepts download requests, runs each one as its own task driving the
/// [`ArtifactFetcher`], and publishes every status transition to the
/// [`StateStore`] and to subscribers.
///
/// # Usage
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::start(fetcher, OrchestratorConfig::default(), store);
/// let mut events = orchestrator.subscribe_package("com.x.y");
/// let id = orchestrator.request(DownloadRequest::new("com.x.y", url))?;
/// while let Ok(event) = events.recv().await { /* ... */ }
/// ```
#[derive(Clone, Debug)]
pub struct Orchestrator {
    jobs: JobTable,
    publisher: Publisher,
    config: Arc<OrchestratorConfig>,
}

impl Orchestrator {
    /// Start the orchestrator.
    ///
    /// Spawns the internal command-dispatch loop and returns a handle. Must be
    /// called from within a Tokio runtime.
    pub fn start(fetcher: ArtifactFetcher, config: OrchestratorConfig, store: StateStore) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel::<OrchestratorCommand>(config.queue_capacity);
        let (events, _events_rx) = broadcast::channel(config.event_capacity);
        let orchestrator = Self {
            jobs: JobTable::new(submit_tx),
            publisher: Publisher { store, events },
            config: Arc::new(config),
        };

        let loop_jobs = orchestrator.jobs.clone();
        let loop_publisher = orchestrator.publisher.clone();
        let loop_config = Arc::clone(&orchestrator.config);
        tokio::spawn(async move {
            Self::run_loop(submit_rx, loop_jobs, fetcher, loop_publisher, loop_config).await;
        });

        orchestrator
    }

    /// Internal event loop: receives commands and spawns job tasks.
    async fn run_loop(
        mut rx: mpsc::Receiver<OrchestratorCommand>,
        jobs: JobTable,
        fetcher: ArtifactFetcher,
        publisher: Publisher,
        config: Arc<OrchestratorConfig>,
    ) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                OrchestratorCommand::Submit { request, reply_tx } => {
                    let download_id = jobs.create_job(&request.package_name).await;
                    publisher.publish(DownloadEvent::new(
                        download_id,
                        &request.package_name,
                        DownloadStatus::Queued,
                    ));
                    let _ = reply_tx.send(download_id);
                    info!(download_id, package = %request.package_name, "download accepted");

                    let job_jobs = jobs.clone();
                    let job_fetcher = fetcher.clone();
                    let job_publisher = publisher.clone();
                    let destination = config.artifact_path(&request.package_name);
                    tokio::spawn(async move {
                        Self::execute_job(
                            download_id,
                            request,
                            destination,
                            job_fetcher,
                            job_jobs,
                            job_publisher,
                        )
                        .await;
                    });
                }

                OrchestratorCommand::Cancel { target } => {
                    let cancelled = jobs.cancel(&target).await;
                    if cancelled.is_empty() {
                        debug!(?target, "cancel: no matching download");
                    } else {
                        info!(?target, ?cancelled, "cancellation requested");
                    }
                }
            }
        }
        debug!("orchestrator loop stopped");
    }

    /// Drive one download to a terminal state.
    async fn execute_job(
        download_id: DownloadId,
        request: DownloadRequest,
        destination: PathBuf,
        fetcher: ArtifactFetcher,
        jobs: JobTable,
        publisher: Publisher,
    ) {
        let Some(cancel_tx) = jobs.get_cancel_tx(download_id).await else {
            return;
        };
        let cancel_rx = cancel_tx.subscribe();
        let package = request.package_name.as_str();

        let terminal = if *cancel_rx.borrow() {
            info!(download_id, package, "download cancelled before start");
            remove_partial(&destination).await;
            DownloadEvent::new(download_id, package, DownloadStatus::Cancelled)
        } else if request.url.trim().is_empty() {
            warn!(download_id, package, "no download URL");
            DownloadEvent::new(download_id, package, DownloadStatus::Failed)
                .with_detail("missing download URL")
        } else {
            // One event per percent step keeps a download to at most 101
            // progress events however large the artifact is.
            let mut last_percent = None;
            let outcome = fetcher
                .download(&request.url, &destination, &cancel_rx, |progress| {
                    if last_percent == Some(progress.percent) {
                        return;
                    }
                    last_percent = Some(progress.percent);
                    publisher.publish(
                        DownloadEvent::new(download_id, package, DownloadStatus::Progress)
                            .with_progress(progress.percent),
                    );
                })
                .await;

            match outcome {
                FetchOutcome::Completed(path) => {
                    DownloadEvent::new(download_id, package, DownloadStatus::Completed)
                        .with_progress(100)
                        .with_detail(path.to_string_lossy())
                }
                FetchOutcome::Failed(reason) => {
                    DownloadEvent::new(download_id, package, DownloadStatus::Failed)
                        .with_detail(reason)
                }
                FetchOutcome::Cancelled => {
                    DownloadEvent::new(download_id, package, DownloadStatus::Cancelled)
                }
            }
        };

        jobs.finish(download_id).await;
        info!(download_id, package, status = %terminal.status, "download finished");
        publisher.publish(terminal);
    }

    fn send(&self, cmd: OrchestratorCommand) -> Result<(), DiscoverError> {
        self.jobs.submit_tx().try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DiscoverError::QueueFull {
                capacity: self.jobs.submit_tx().max_capacity(),
            },
            mpsc::error::TrySendError::Closed(_) => DiscoverError::OrchestratorShutdown,
        })
    }

    // ── Public API ───────────────────────────────────────────────────────────

    /// Submit a download.
    ///
    /// Returns the [`DownloadId`] once the request has been accepted and its
    /// `Queued` event published; the transfer itself runs in the background.
    /// Concurrent requests for the same package are not merged.
    pub async fn request(&self, request: DownloadRequest) -> Result<DownloadId, DiscoverError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(OrchestratorCommand::Submit { request, reply_tx })?;
        reply_rx.await.map_err(|_| DiscoverError::OrchestratorShutdown)
    }

    /// Cancel every active download for `package`. Best-effort.
    pub fn cancel(&self, package: &str) {
        self.cancel_target(CancelTarget::Package(package.to_owned()));
    }

    /// Cancel a single download. Best-effort.
    pub fn cancel_job(&self, download_id: DownloadId) {
        self.cancel_target(CancelTarget::Job(download_id));
    }

    /// Cancel everything in flight. Best-effort.
    pub fn cancel_all(&self) {
        self.cancel_target(CancelTarget::All);
    }

    fn cancel_target(&self, target: CancelTarget) {
        if let Err(e) = self.send(OrchestratorCommand::Cancel { target }) {
            warn!(error = %e, "cancel request dropped");
        }
    }

    /// All events, in publication order per download.
    pub fn subscribe(&self) -> DownloadEvents {
        DownloadEvents {
            rx: self.publisher.events.subscribe(),
            package: None,
        }
    }

    /// Events for `package` only.
    pub fn subscribe_package(&self, package: &str) -> DownloadEvents {
        DownloadEvents {
            rx: self.publisher.events.subscribe(),
            package: Some(package.to_owned()),
        }
    }

    /// `(id, package)` for every download that has not finished.
    pub async fn active_jobs(&self) -> Vec<(DownloadId, String)> {
        self.jobs.active().await
    }

    pub fn artifact_path(&self, package: &str) -> PathBuf {
        self.config.artifact_path(package)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.publisher.store
    }
}
