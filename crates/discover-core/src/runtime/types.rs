use std::path::PathBuf;

use serde::Serialize;
use strum::{Display, EnumString};

/// Unique identifier for one accepted download request.
pub type DownloadId = u64;

/// `max` carried by every progress event.
pub const PROGRESS_MAX: u8 = 100;

/// Lifecycle of a single download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Accepted by the orchestrator, no bytes received yet.
    Queued,
    Progress,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    /// Returns `true` for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }
}

/// A status transition published by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadEvent {
    pub download_id: DownloadId,
    pub status: DownloadStatus,
    pub package_name: String,
    /// `None` while the total size is unknown.
    pub progress: Option<u8>,
    pub max: u8,
    /// Artifact path for `Completed`, failure reason for `Failed`, absent otherwise.
    pub message_or_path: Option<String>,
}

impl DownloadEvent {
    pub(crate) fn new(download_id: DownloadId, package_name: &str, status: DownloadStatus) -> Self {
        Self {
            download_id,
            status,
            package_name: package_name.to_owned(),
            progress: None,
            max: PROGRESS_MAX,
            message_or_path: None,
        }
    }

    pub(crate) fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(PROGRESS_MAX));
        self
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.message_or_path = Some(detail.into());
        self
    }
}

/// Data attached to a terminal download state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalPayload {
    Artifact(PathBuf),
    Message(String),
}

/// Per-package download state held in the catalog snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadState {
    /// `None` until the orchestrator has accepted the request.
    pub download_id: Option<DownloadId>,
    pub status: DownloadStatus,
    /// `0..=100`, or `None` when indeterminate.
    pub progress: Option<u8>,
    pub payload: Option<TerminalPayload>,
}

impl DownloadState {
    pub fn queued(download_id: Option<DownloadId>) -> Self {
        Self {
            download_id,
            status: DownloadStatus::Queued,
            progress: None,
            payload: None,
        }
    }

    /// Fold an orchestrator event into a state.
    pub fn from_event(event: &DownloadEvent) -> Self {
        let payload = match (event.status, &event.message_or_path) {
            (DownloadStatus::Completed, Some(path)) => {
                Some(TerminalPayload::Artifact(PathBuf::from(path)))
            }
            (DownloadStatus::Failed | DownloadStatus::Cancelled, Some(message)) => {
                Some(TerminalPayload::Message(message.clone()))
            }
            _ => None,
        };
        let progress = match event.status {
            DownloadStatus::Completed => Some(PROGRESS_MAX),
            _ => event.progress,
        };
        Self {
            download_id: Some(event.download_id),
            status: event.status,
            progress,
            payload,
        }
    }

    /// Path of the downloaded artifact, when completed.
    pub fn artifact(&self) -> Option<&PathBuf> {
        match (&self.status, &self.payload) {
            (DownloadStatus::Completed, Some(TerminalPayload::Artifact(path))) => Some(path),
            _ => None,
        }
    }
}
