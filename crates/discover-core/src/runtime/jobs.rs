use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc, watch};

use crate::runtime::orchestrator::OrchestratorCommand;
use crate::runtime::types::DownloadId;

/// In-memory record for a download that has not reached a terminal state.
#[derive(Debug)]
pub struct JobRecord {
    pub download_id: DownloadId,
    pub package_name: String,
    /// Setting this to `true` asks the fetcher to stop at its next check.
    pub cancel_tx: Arc<watch::Sender<bool>>,
}

/// Which active jobs a cancellation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    Job(DownloadId),
    Package(String),
    All,
}

impl CancelTarget {
    fn matches(&self, record: &JobRecord) -> bool {
        match self {
            CancelTarget::Job(id) => record.download_id == *id,
            CancelTarget::Package(package) => record.package_name == *package,
            CancelTarget::All => true,
        }
    }
}

/// Table of active jobs shared by the dispatch loop and every job task.
#[derive(Debug, Clone)]
pub struct JobTable {
    inner: Arc<RwLock<HashMap<DownloadId, JobRecord>>>,
    next_id: Arc<AtomicU64>,
    submit_tx: mpsc::Sender<OrchestratorCommand>,
}

impl JobTable {
    pub fn new(submit_tx: mpsc::Sender<OrchestratorCommand>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            submit_tx,
        }
    }

    /// Allocate a `DownloadId` and register an uncancelled job for `package_name`.
    pub async fn create_job(&self, package_name: &str) -> DownloadId {
        let download_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, _cancel_rx) = watch::channel(false);

        let record = JobRecord {
            download_id,
            package_name: package_name.to_owned(),
            cancel_tx: Arc::new(cancel_tx),
        };
        self.inner.write().await.insert(download_id, record);
        download_id
    }

    pub async fn get_cancel_tx(&self, download_id: DownloadId) -> Option<Arc<watch::Sender<bool>>> {
        self.inner
            .read()
            .await
            .get(&download_id)
            .map(|r| Arc::clone(&r.cancel_tx))
    }

    /// Signal every job matching `target`. Returns the ids that were signalled.
    pub async fn cancel(&self, target: &CancelTarget) -> Vec<DownloadId> {
        let guard = self.inner.read().await;
        let mut cancelled: Vec<DownloadId> = guard
            .values()
            .filter(|record| target.matches(record))
            .map(|record| {
                record.cancel_tx.send_replace(true);
                record.download_id
            })
            .collect();
        cancelled.sort_unstable();
        cancelled
    }

    /// Drop a job once it has reached a terminal state.
    pub async fn finish(&self, download_id: DownloadId) {
        self.inner.write().await.remove(&download_id);
    }

    /// `(id, package)` for every job still running, ordered by id.
    pub async fn active(&self) -> Vec<(DownloadId, String)> {
        let mut jobs: Vec<_> = self
            .inner
            .read()
            .await
            .values()
            .map(|r| (r.download_id, r.package_name.clone()))
            .collect();
        jobs.sort_unstable();
        jobs
    }

    pub fn submit_tx(&self) -> &mpsc::Sender<OrchestratorCommand> {
        &self.submit_tx
    }
}
