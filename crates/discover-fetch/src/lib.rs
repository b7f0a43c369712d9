//! HTTP plumbing for the launcher: shared client settings, share-link
//! rewriting and the streaming artifact downloader.
//!
//! ```rust,ignore
//! let fetcher = ArtifactFetcher::new(&HttpConfig::new())?;
//! let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
//! match fetcher.download(url, &dest, &cancel_rx, |p| println!("{}%", p.percent)).await {
//!     FetchOutcome::Completed(path) => install(path),
//!     FetchOutcome::Failed(reason) => eprintln!("{reason}"),
//!     FetchOutcome::Cancelled => {}
//! }
//! ```

pub mod client;
pub mod downloader;
pub mod error;
pub mod share_link;

pub use client::HttpConfig;
pub use downloader::{
    ArtifactFetcher, DownloadProgress, FetchOutcome, looks_like_archive, remove_partial,
};
pub use error::FetchError;
pub use share_link::to_direct_download_url;

