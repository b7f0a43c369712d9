use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::model::AppRecord;
use crate::runtime::types::{DownloadEvent, DownloadId, DownloadState, TerminalPayload};

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppCatalogState {
    pub records: Vec<AppRecord>,
    pub loading: bool,
    /// Most recent error only.
    pub error: Option<String>,
    /// Keyed by package name.
    pub downloads: BTreeMap<String, DownloadState>,
    pub permission_missing: bool,
}

impl AppCatalogState {
    pub fn record(&self, package: &str) -> Option<&AppRecord> {
        self.records.iter().find(|r| r.package_name == package)
    }

    pub fn download(&self, package: &str) -> Option<&DownloadState> {
        self.downloads.get(package)
    }

    /// Rebuild the terminal event of `download_id` from the stored state.
    ///
    /// `None` while the download is running, after its state was acknowledged,
    /// or once a newer download for the same package replaced it. Used to
    /// recover after an event subscriber lagged.
    pub fn terminal_event(&self, download_id: DownloadId) -> Option<DownloadEvent> {
        let (package, state) = self
            .downloads
            .iter()
            .find(|(_, state)| state.download_id == Some(download_id))?;
        if !state.status.is_terminal() {
            return None;
        }

        let mut event = DownloadEvent::new(download_id, package, state.status);
        if let Some(progress) = state.progress {
            event = event.with_progress(progress);
        }
        Some(match &state.payload {
            Some(TerminalPayload::Artifact(path)) => event.with_detail(path.to_string_lossy()),
            Some(TerminalPayload::Message(message)) => event.with_detail(message.as_str()),
            None => event,
        })
    }
}

/// Holder of the current [`AppCatalogState`] snapshot.
///
/// Every mutation replaces one slice of the state and publishes the result as
/// a single new snapshot. Readers clone the `Arc` and never block writers.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<Arc<AppCatalogState>>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(AppCatalogState::default()));
        Self { tx: Arc::new(tx) }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<AppCatalogState> {
        Arc::clone(&self.tx.borrow())
    }

    /// A receiver that is notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppCatalogState>> {
        self.tx.subscribe()
    }

    fn update(&self, mutate: impl FnOnce(&mut AppCatalogState)) {
        self.tx.send_modify(|snapshot| mutate(Arc::make_mut(snapshot)));
    }

    pub fn set_loading(&self, loading: bool) {
        self.update(|s| s.loading = loading);
    }

    /// Replace the record list.
    pub fn set_catalog(&self, records: Vec<AppRecord>) {
        self.update(|s| s.records = records);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.update(|s| s.error = error);
    }

    pub fn clear_error(&self) {
        self.set_error(None);
    }

    pub fn upsert_download_state(&self, package: &str, state: DownloadState) {
        self.update(|s| {
            s.downloads.insert(package.to_owned(), state);
        });
    }

    pub fn remove_download_state(&self, package: &str) {
        self.update(|s| {
            s.downloads.remove(package);
        });
    }

    pub fn set_permission_missing(&self, missing: bool) {
        self.update(|s| s.permission_missing = missing);
    }

    /// Record an orchestrator event as the package's download state.
    pub fn apply_event(&self, event: &DownloadEvent) {
        self.upsert_download_state(&event.package_name, DownloadState::from_event(event));
    }
}
