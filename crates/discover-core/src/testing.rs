//! Fixtures shared by the unit tests: a throwaway HTTP host and an installer
//! that records what it was handed.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use discover_fetch::{ArtifactFetcher, HttpConfig};

use crate::collab::Installer;
use crate::runtime::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::runtime::store::StateStore;

pub const APK_BYTES: &[u8] = b"PK\x03\x04test-apk-body";

pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Declares a megabyte, sends the archive header and then stalls.
async fn stalled() -> Response {
    let head = futures::stream::iter(vec![Ok::<_, std::io::Error>(bytes_of(b"PK\x03\x04"))]);
    let body = Body::from_stream(futures::StreamExt::chain(head, futures::stream::pending()));
    ([(header::CONTENT_LENGTH, "1048576")], body).into_response()
}

fn bytes_of(data: &'static [u8]) -> axum::body::Bytes {
    axum::body::Bytes::from_static(data)
}

/// Size of the `/large.apk` body.
pub const LARGE_APK_LEN: usize = 4 * 1024 * 1024;

/// `/ok.apk`, `/large.apk`, `/html`, `/missing` and `/stalled`.
pub fn artifact_host() -> Router {
    Router::new()
        .route("/ok.apk", get(|| async { APK_BYTES }))
        .route(
            "/large.apk",
            get(|| async {
                let mut body = APK_BYTES.to_vec();
                body.resize(LARGE_APK_LEN, 0);
                body
            }),
        )
        .route("/html", get(|| async { "<html>quota exceeded</html>" }))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route("/stalled", get(stalled))
}

pub fn orchestrator(cache_dir: &Path) -> Orchestrator {
    orchestrator_with(OrchestratorConfig::default().set_cache_dir(cache_dir))
}

pub fn orchestrator_with(config: OrchestratorConfig) -> Orchestrator {
    let fetcher = ArtifactFetcher::new(&HttpConfig::new().no_proxy()).unwrap();
    Orchestrator::start(fetcher, config, StateStore::new())
}

/// Installer double with a togglable permission.
#[derive(Debug)]
pub struct RecordingInstaller {
    permitted: AtomicBool,
    handed_off: Mutex<Vec<PathBuf>>,
}

impl RecordingInstaller {
    pub fn new(permitted: bool) -> Self {
        Self {
            permitted: AtomicBool::new(permitted),
            handed_off: Mutex::new(Vec::new()),
        }
    }

    pub fn set_permitted(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
    }

    pub fn handed_off(&self) -> Vec<PathBuf> {
        self.handed_off.lock().unwrap().clone()
    }
}

#[async_trait]
impl Installer for RecordingInstaller {
    async fn can_install(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    async fn install(&self, artifact: &Path) -> bool {
        self.handed_off.lock().unwrap().push(artifact.to_path_buf());
        true
    }
}
