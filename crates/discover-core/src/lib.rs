//! Catalog reconciliation, download orchestration and launcher state.
//!
//! The pieces, leaves first:
//! - [`catalog`]: fetches the remote catalog and maps it into [`AppRecord`]s.
//! - [`reconcile`]: decides between install, update and open.
//! - [`runtime`]: the download orchestrator and the [`StateStore`] it reports into.
//! - [`session`]: the [`Launcher`] that drives all of the above.

pub mod catalog;
pub mod collab;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod runtime;
pub mod session;

#[cfg(test)]
mod testing;

pub use catalog::{CatalogClient, CatalogPolicy};
pub use collab::{Installer, PackageQuery, StaticPackages};
pub use error::DiscoverError;
pub use model::{AppAction, AppRecord, format_size};
pub use runtime::orchestrator::{
    DownloadEvents, DownloadRequest, EventsError, Orchestrator, OrchestratorConfig,
    artifact_file_name,
};
pub use runtime::store::{AppCatalogState, StateStore};
pub use runtime::types::{DownloadEvent, DownloadId, DownloadState, DownloadStatus, TerminalPayload};
pub use session::Launcher;
