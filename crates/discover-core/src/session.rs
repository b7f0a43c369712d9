use std::path::{Path, PathBuf};
use std::sync::Arc;

use discover_fetch::looks_like_archive;
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::collab::Installer;
use crate::error::DiscoverError;
use crate::model::AppRecord;
use crate::reconcile;
use crate::runtime::orchestrator::{DownloadRequest, EventsError, Orchestrator};
use crate::runtime::store::{AppCatalogState, StateStore};
use crate::runtime::types::{DownloadId, DownloadState, DownloadStatus, TerminalPayload};

/// Ties the catalog, the orchestrator and the installer to one [`StateStore`].
///
/// All store writes outside of download events go through here.
pub struct Launcher {
    catalog: CatalogClient,
    orchestrator: Orchestrator,
    installer: Arc<dyn Installer>,
}

impl Launcher {
    pub fn new(
        catalog: CatalogClient,
        orchestrator: Orchestrator,
        installer: Arc<dyn Installer>,
    ) -> Self {
        Self {
            catalog,
            orchestrator,
            installer,
        }
    }

    pub fn store(&self) -> &StateStore {
        self.orchestrator.store()
    }

    pub fn snapshot(&self) -> Arc<AppCatalogState> {
        self.store().snapshot()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Reload the catalog. Initial load and refresh are the same operation.
    ///
    /// On failure the previous records stay in place and the error message is
    /// stored for display.
    pub async fn refresh(&self) -> Result<usize, DiscoverError> {
        let store = self.store();
        store.set_loading(true);
        store.clear_error();

        let result = self.catalog.fetch_catalog().await;
        let outcome = match result {
            Ok(records) => {
                let count = records.len();
                store.set_catalog(records);
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "catalog refresh failed");
                store.set_error(Some(err.user_message()));
                Err(err)
            }
        };
        store.set_loading(false);
        outcome
    }

    pub fn clear_error(&self) {
        self.store().clear_error();
    }

    /// Record whether install permission is known to be missing.
    pub fn set_permission_missing(&self, missing: bool) {
        self.store().set_permission_missing(missing);
    }

    async fn ensure_install_permission(&self) -> Result<(), DiscoverError> {
        if self.installer.can_install().await {
            if self.snapshot().permission_missing {
                self.store().set_permission_missing(false);
            }
            Ok(())
        } else {
            self.store().set_permission_missing(true);
            Err(DiscoverError::PermissionDenied)
        }
    }

    /// Queue a download for `record`.
    pub async fn start_download(&self, record: &AppRecord) -> Result<DownloadId, DiscoverError> {
        self.ensure_install_permission().await?;
        self.enqueue(record).await
    }

    async fn enqueue(&self, record: &AppRecord) -> Result<DownloadId, DiscoverError> {
        let package = record.package_name.as_str();
        self.store()
            .upsert_download_state(package, DownloadState::queued(None));

        let request = DownloadRequest::new(package, record.download_url.as_str());
        match self.orchestrator.request(request).await {
            Ok(id) => Ok(id),
            Err(err) => {
                warn!(package, error = %err, "download request rejected");
                self.store().upsert_download_state(
                    package,
                    DownloadState {
                        download_id: None,
                        status: DownloadStatus::Failed,
                        progress: None,
                        payload: Some(TerminalPayload::Message(err.to_string())),
                    },
                );
                Err(err)
            }
        }
    }

    /// Queue a download for every record that has an update.
    pub async fn update_all(&self) -> Result<Vec<DownloadId>, DiscoverError> {
        self.ensure_install_permission().await?;

        let pending = reconcile::updatable(&self.snapshot().records);
        info!(count = pending.len(), "updating all");
        let mut ids = Vec::with_capacity(pending.len());
        for record in &pending {
            ids.push(self.enqueue(record).await?);
        }
        Ok(ids)
    }

    /// Download `record` and wait for the outcome.
    pub async fn download(&self, record: &AppRecord) -> Result<PathBuf, DiscoverError> {
        let mut events = self.orchestrator.subscribe_package(&record.package_name);
        let id = self.start_download(record).await?;

        loop {
            let event = match events.recv().await {
                Ok(event) if event.download_id == id && event.status.is_terminal() => event,
                Ok(_) => continue,
                Err(EventsError::Lagged(_)) => match self.snapshot().terminal_event(id) {
                    Some(event) => event,
                    None => continue,
                },
                Err(EventsError::Closed) => return Err(DiscoverError::OrchestratorShutdown),
            };
            return match event.status {
                DownloadStatus::Completed => event
                    .message_or_path
                    .map(PathBuf::from)
                    .ok_or_else(|| DiscoverError::Download {
                        reason: "completed without an artifact path".into(),
                    }),
                DownloadStatus::Cancelled => Err(DiscoverError::Cancelled),
                _ => Err(DiscoverError::Download {
                    reason: event.message_or_path.unwrap_or_default(),
                }),
            };
        }
    }

    /// Hand `package`'s completed download to the installer.
    ///
    /// The download state is acknowledged once a hand-off has been attempted.
    /// When permission is missing the state is kept so the install can be
    /// retried.
    pub async fn install(&self, package: &str) -> Result<bool, DiscoverError> {
        let artifact = self
            .snapshot()
            .download(package)
            .and_then(DownloadState::artifact)
            .cloned()
            .ok_or_else(|| DiscoverError::NotDownloaded {
                package: package.to_owned(),
            })?;
        self.ensure_install_permission().await?;

        let handed_off = self.installer.install(&artifact).await;
        info!(package, artifact = %artifact.display(), handed_off, "install hand-off");
        self.acknowledge(package);
        Ok(handed_off)
    }

    /// Hand a local file to the installer after checking it looks like an APK.
    pub async fn install_file(&self, path: &Path) -> Result<bool, DiscoverError> {
        let valid = looks_like_archive(path)
            .await
            .map_err(|e| DiscoverError::Download {
                reason: e.to_string(),
            })?;
        if !valid {
            return Err(DiscoverError::Download {
                reason: "invalid file".into(),
            });
        }
        self.ensure_install_permission().await?;
        Ok(self.installer.install(path).await)
    }

    /// Drop the download state for `package`.
    pub fn acknowledge(&self, package: &str) {
        self.store().remove_download_state(package);
    }

    pub fn cancel(&self, package: &str) {
        self.orchestrator.cancel(package);
    }

    pub fn cancel_all(&self) {
        self.orchestrator.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use discover_fetch::HttpConfig;

    use super::*;
    use crate::collab::StaticPackages;
    use crate::testing::{RecordingInstaller, artifact_host, orchestrator, serve};

    struct Harness {
        launcher: Launcher,
        installer: Arc<RecordingInstaller>,
        _dir: tempfile::TempDir,
    }

    fn catalog_json(host: SocketAddr) -> String {
        format!(
            r#"{{"type":"success","message":"ok","data":[
                {{"packageName":"com.a","currentVersionCode":1,"latestVersionCode":2,"apkDownloadUrl":"http://{host}/ok.apk"}},
                {{"packageName":"com.b","currentVersionCode":4,"latestVersionCode":7,"apkDownloadUrl":"http://{host}/html"}},
                {{"packageName":"com.c","latestVersionCode":3,"apkDownloadUrl":"http://{host}/ok.apk"}}
            ]}}"#
        )
    }

    async fn harness(permitted: bool) -> Harness {
        let host = serve(artifact_host()).await;
        let body = catalog_json(host);
        let api = serve(
            Router::new()
                .route(
                    "/apk-list",
                    get(move || {
                        let body = body.clone();
                        async move { body }
                    }),
                )
                .route("/down/apk-list", get(|| async { StatusCode::BAD_GATEWAY })),
        )
        .await;

        let packages = StaticPackages::new().with("com.a", 1).with("com.b", 4);
        let catalog = CatalogClient::new(
            &HttpConfig::new().no_proxy(),
            format!("http://{api}"),
            Arc::new(packages),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let installer = Arc::new(RecordingInstaller::new(permitted));
        let launcher = Launcher::new(catalog, orchestrator(dir.path()), installer.clone());
        Harness {
            launcher,
            installer,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn refresh_populates_records_and_clears_loading() {
        let h = harness(true).await;
        assert_eq!(h.launcher.refresh().await.unwrap(), 3);

        let state = h.launcher.snapshot();
        assert!(!state.loading);
        assert_eq!(state.error, None);
        assert_eq!(state.records.len(), 3);
    }

    #[tokio::test]
    async fn refresh_failure_keeps_records_and_stores_message() {
        let h = harness(true).await;
        h.launcher.refresh().await.unwrap();

        let api = h.launcher.catalog.endpoint().replace("/apk-list", "/down");
        let broken = Launcher::new(
            CatalogClient::new(
                &HttpConfig::new().no_proxy(),
                api,
                Arc::new(StaticPackages::new()),
            )
            .unwrap(),
            h.launcher.orchestrator.clone(),
            h.installer.clone(),
        );
        let err = broken.refresh().await.unwrap_err();
        assert!(matches!(err, DiscoverError::Server { code: 502, .. }));

        let state = broken.snapshot();
        assert!(!state.loading);
        assert_eq!(state.records.len(), 3);
        assert_eq!(state.error.as_deref(), Some("Server error: HTTP 502: Bad Gateway"));

        broken.clear_error();
        assert_eq!(broken.snapshot().error, None);
    }

    #[tokio::test]
    async fn download_then_install_hands_off_and_acknowledges() {
        let h = harness(true).await;
        h.launcher.refresh().await.unwrap();
        let record = h.launcher.snapshot().record("com.a").cloned().unwrap();

        let path = h.launcher.download(&record).await.unwrap();
        assert_eq!(
            h.launcher.snapshot().download("com.a").unwrap().status,
            DownloadStatus::Completed
        );

        assert!(h.launcher.install("com.a").await.unwrap());
        assert_eq!(h.installer.handed_off(), vec![path]);
        assert!(h.launcher.snapshot().download("com.a").is_none());
    }

    #[tokio::test]
    async fn failed_download_surfaces_reason() {
        let h = harness(true).await;
        h.launcher.refresh().await.unwrap();
        let record = h.launcher.snapshot().record("com.b").cloned().unwrap();

        let err = h.launcher.download(&record).await.unwrap_err();
        assert_eq!(
            err,
            DiscoverError::Download {
                reason: "invalid file".into()
            }
        );
        let state = h.launcher.snapshot().download("com.b").cloned().unwrap();
        assert_eq!(state.payload, Some(TerminalPayload::Message("invalid file".into())));

        h.launcher.acknowledge("com.b");
        assert!(h.launcher.snapshot().downloads.is_empty());
    }

    #[tokio::test]
    async fn missing_permission_blocks_downloads() {
        let h = harness(false).await;
        h.launcher.refresh().await.unwrap();
        let record = h.launcher.snapshot().record("com.a").cloned().unwrap();

        assert_eq!(
            h.launcher.start_download(&record).await.unwrap_err(),
            DiscoverError::PermissionDenied
        );
        assert_eq!(
            h.launcher.update_all().await.unwrap_err(),
            DiscoverError::PermissionDenied
        );
        let state = h.launcher.snapshot();
        assert!(state.permission_missing);
        assert!(state.downloads.is_empty());
    }

    #[tokio::test]
    async fn granted_permission_clears_the_missing_flag() {
        let h = harness(false).await;
        h.launcher.refresh().await.unwrap();
        let record = h.launcher.snapshot().record("com.a").cloned().unwrap();
        h.launcher.start_download(&record).await.unwrap_err();
        assert!(h.launcher.snapshot().permission_missing);

        h.installer.set_permitted(true);
        h.launcher.download(&record).await.unwrap();
        assert!(!h.launcher.snapshot().permission_missing);
    }

    #[tokio::test]
    async fn install_without_permission_keeps_the_download() {
        let h = harness(true).await;
        h.launcher.refresh().await.unwrap();
        let record = h.launcher.snapshot().record("com.a").cloned().unwrap();
        h.launcher.download(&record).await.unwrap();

        h.installer.set_permitted(false);
        assert_eq!(
            h.launcher.install("com.a").await.unwrap_err(),
            DiscoverError::PermissionDenied
        );
        assert!(h.launcher.snapshot().permission_missing);
        assert!(h.launcher.snapshot().download("com.a").is_some());
        assert!(h.installer.handed_off().is_empty());
    }

    #[tokio::test]
    async fn install_requires_a_completed_download() {
        let h = harness(true).await;
        assert_eq!(
            h.launcher.install("com.a").await.unwrap_err(),
            DiscoverError::NotDownloaded {
                package: "com.a".into()
            }
        );
    }

    #[tokio::test]
    async fn update_all_targets_only_updatable_records() {
        let h = harness(true).await;
        h.launcher.refresh().await.unwrap();
        let mut events = h.launcher.orchestrator().subscribe();

        let ids = h.launcher.update_all().await.unwrap();
        assert_eq!(ids.len(), 2);

        let mut finished = Vec::new();
        while finished.len() < ids.len() {
            let event = events.recv().await.unwrap();
            if event.status.is_terminal() {
                finished.push(event.package_name);
            }
        }
        finished.sort();
        assert_eq!(finished, ["com.a", "com.b"]);
        assert!(h.launcher.snapshot().download("com.c").is_none());
    }

    #[tokio::test]
    async fn local_file_install_checks_magic() {
        let h = harness(true).await;
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.apk");
        let bad = dir.path().join("bad.apk");
        std::fs::write(&good, b"PK\x03\x04rest").unwrap();
        std::fs::write(&bad, b"<html>").unwrap();

        assert!(h.launcher.install_file(&good).await.unwrap());
        assert!(matches!(
            h.launcher.install_file(&bad).await,
            Err(DiscoverError::Download { .. })
        ));
        assert_eq!(h.installer.handed_off(), vec![good]);
    }
}
