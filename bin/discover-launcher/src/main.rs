//! discover-launcher – entry point.
//!
//! Startup order:
//! 1. Parse the command line and configuration from environment variables.
//! 2. Initialise structured tracing (stderr, plus a rolling file when configured).
//! 3. Build the catalog client, orchestrator and installer.
//! 4. Run the requested command; Ctrl-C cancels any download in flight.

mod cli;
mod config;
mod installer;
mod inventory;

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use discover_core::{
    AppRecord, CatalogClient, CatalogPolicy, DiscoverError, DownloadEvent, DownloadId,
    DownloadStatus, EventsError, Launcher, Orchestrator, OrchestratorConfig, PackageQuery,
    StateStore, format_size,
};
use discover_fetch::{ArtifactFetcher, to_direct_download_url};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::installer::CommandInstaller;
use crate::inventory::InventoryFile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cli = Cli::parse();
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let _log_guard = init_tracing(&cfg)?;
    info!(version = env!("CARGO_PKG_VERSION"), "discover-launcher starting");

    if let Commands::Normalize { url } = &cli.command {
        println!("{}", to_direct_download_url(url));
        return Ok(());
    }

    // ── 3. Components ──────────────────────────────────────────────────────────
    let policy = match &cli.command {
        Commands::List { all: true } => CatalogPolicy::new(),
        _ => cfg.policy(cfg.updates_only),
    };
    let launcher = build_launcher(&cfg, policy)?;

    let orchestrator = launcher.orchestrator().clone();
    tokio::spawn(async move {
        interrupt_signal().await;
        orchestrator.cancel_all();
    });

    // ── 4. Command ─────────────────────────────────────────────────────────────
    match cli.command {
        Commands::List { .. } => list(&launcher).await,
        Commands::Download {
            package,
            no_install,
        } => download(&launcher, &cfg, &package, !no_install).await,
        Commands::UpdateAll => update_all(&launcher, &cfg).await,
        Commands::Install { path } => {
            let handed_off = launcher
                .install_file(&path)
                .await
                .map_err(|e| explain(e, &cfg))?;
            report_hand_off(&path.display().to_string(), handed_off);
            Ok(())
        }
        Commands::Normalize { .. } => Ok(()),
    }
}

/// Build the log filter and subscriber, warning loudly if the configured
/// filter is not a valid tracing filter expression.
///
/// The returned guard must be held until exit so buffered file logs are flushed.
fn init_tracing(cfg: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: DISCOVER_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                EnvFilter::new("info")
            }
        },
    };

    let stderr_layer = if cfg.log_json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match &cfg.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "discover-launcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn build_launcher(cfg: &Config, policy: CatalogPolicy) -> anyhow::Result<Launcher> {
    let http = cfg.http();
    let packages: Arc<dyn PackageQuery> = Arc::new(InventoryFile::new(&cfg.inventory_path));

    let catalog = CatalogClient::new(&http, cfg.base_url.as_str(), packages)
        .context("building catalog client")?
        .set_path(cfg.catalog_path.as_str())
        .set_policy(policy);
    let fetcher = ArtifactFetcher::new(&http).context("building artifact fetcher")?;
    let orchestrator = Orchestrator::start(
        fetcher,
        OrchestratorConfig::default()
            .set_cache_dir(&cfg.cache_dir)
            .set_queue_capacity(cfg.queue_capacity),
        StateStore::new(),
    );
    let installer = Arc::new(CommandInstaller::new(&cfg.install_command)?);

    info!(
        endpoint = %catalog.endpoint(),
        cache_dir = %cfg.cache_dir.display(),
        inventory = %cfg.inventory_path.display(),
        installer = installer.program(),
        "launcher ready"
    );
    Ok(Launcher::new(catalog, orchestrator, installer))
}

/// Resolves on the first Ctrl-C.
async fn interrupt_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("interrupt received; cancelling downloads"),
        Err(e) => {
            warn!(error = %e, "failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Turn a launcher error into something a person at a terminal can act on.
fn explain(err: DiscoverError, cfg: &Config) -> anyhow::Error {
    match err {
        DiscoverError::PermissionDenied => anyhow::anyhow!(
            "cannot install packages: `{}` was not found on PATH (set DISCOVER_INSTALL_CMD)",
            cfg.install_command.first().map(String::as_str).unwrap_or_default()
        ),
        other => anyhow::anyhow!(other.user_message()),
    }
}

async fn refresh(launcher: &Launcher) -> anyhow::Result<Arc<discover_core::AppCatalogState>> {
    launcher
        .refresh()
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    Ok(launcher.snapshot())
}

async fn list(launcher: &Launcher) -> anyhow::Result<()> {
    let state = refresh(launcher).await?;
    if state.records.is_empty() {
        println!("no apps available");
        return Ok(());
    }

    println!(
        "{:<8} {:<36} {:<10} {:<10} {:>9}",
        "ACTION", "PACKAGE", "INSTALLED", "LATEST", "SIZE"
    );
    for record in &state.records {
        println!("{}", row(record));
    }
    Ok(())
}

fn row(record: &AppRecord) -> String {
    let installed = record
        .installed_version_code
        .map(|v| format!("v{v}"))
        .unwrap_or_else(|| "-".to_owned());
    let size = if record.size_bytes > 0 {
        format_size(record.size_bytes)
    } else {
        String::new()
    };
    format!(
        "{:<8} {:<36} {:<10} {:<10} {:>9}",
        record.action().to_string(),
        record.package_name,
        installed,
        record.latest_label(),
        size
    )
}

async fn download(
    launcher: &Launcher,
    cfg: &Config,
    package: &str,
    install: bool,
) -> anyhow::Result<()> {
    let state = refresh(launcher).await?;
    let record = state
        .record(package)
        .cloned()
        .with_context(|| format!("{package} is not in the catalog"))?;

    let mut events = launcher.orchestrator().subscribe_package(package);
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_progress(&event),
                Err(EventsError::Lagged(_)) => continue,
                Err(EventsError::Closed) => break,
            }
        }
    });
    let result = launcher.download(&record).await;
    printer.abort();
    eprintln!();

    match result {
        Ok(path) => {
            println!("{package}: downloaded to {}", path.display());
            if install {
                hand_off(launcher, cfg, package).await?;
            }
            Ok(())
        }
        Err(DiscoverError::Cancelled) => {
            launcher.acknowledge(package);
            println!("{package}: cancelled");
            Ok(())
        }
        Err(e) => {
            launcher.acknowledge(package);
            Err(explain(e, cfg)).with_context(|| format!("downloading {package}"))
        }
    }
}

async fn update_all(launcher: &Launcher, cfg: &Config) -> anyhow::Result<()> {
    refresh(launcher).await?;

    let mut events = launcher.orchestrator().subscribe();
    let ids = launcher.update_all().await.map_err(|e| explain(e, cfg))?;
    if ids.is_empty() {
        println!("everything is up to date");
        return Ok(());
    }

    let total = ids.len();
    let mut pending: HashSet<DownloadId> = ids.into_iter().collect();
    let mut failed = 0usize;
    while !pending.is_empty() {
        let arrived = match events.recv().await {
            Ok(event) => vec![event],
            // Terminal states that were missed are still in the snapshot.
            Err(EventsError::Lagged(_)) => {
                let snapshot = launcher.snapshot();
                pending
                    .iter()
                    .filter_map(|id| snapshot.terminal_event(*id))
                    .collect()
            }
            Err(e @ EventsError::Closed) => return Err(e.into()),
        };

        for event in arrived {
            if !pending.contains(&event.download_id) {
                continue;
            }
            let package = event.package_name.as_str();
            match event.status {
                DownloadStatus::Queued => {}
                DownloadStatus::Progress => print_progress(&event),
                DownloadStatus::Completed => {
                    pending.remove(&event.download_id);
                    eprintln!();
                    if let Err(e) = hand_off(launcher, cfg, package).await {
                        failed += 1;
                        println!("{package}: {e:#}");
                    }
                }
                DownloadStatus::Failed => {
                    pending.remove(&event.download_id);
                    failed += 1;
                    eprintln!();
                    println!(
                        "{package}: download failed: {}",
                        event.message_or_path.as_deref().unwrap_or("unknown error")
                    );
                    launcher.acknowledge(package);
                }
                DownloadStatus::Cancelled => {
                    pending.remove(&event.download_id);
                    eprintln!();
                    println!("{package}: cancelled");
                    launcher.acknowledge(package);
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} updates failed");
    }
    Ok(())
}

async fn hand_off(launcher: &Launcher, cfg: &Config, package: &str) -> anyhow::Result<()> {
    let handed_off = launcher
        .install(package)
        .await
        .map_err(|e| explain(e, cfg))?;
    report_hand_off(package, handed_off);
    Ok(())
}

fn report_hand_off(what: &str, handed_off: bool) {
    if handed_off {
        println!("{what}: installer started");
    } else {
        println!("{what}: installer did not accept the package");
    }
}

fn print_progress(event: &DownloadEvent) {
    let mut stderr = std::io::stderr().lock();
    let _ = match (event.status, event.progress) {
        (DownloadStatus::Progress, Some(p)) => {
            write!(stderr, "\r{}: {:>3}%", event.package_name, p)
        }
        (DownloadStatus::Progress, None) => write!(stderr, "\r{}: downloading", event.package_name),
        _ => return,
    };
    let _ = stderr.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(installed: Option<i64>) -> AppRecord {
        AppRecord {
            package_name: "com.aresourcepool.justtip".into(),
            display_name: "JustTip".into(),
            current_version_code: 3,
            latest_version_code: 5,
            version_name: String::new(),
            download_url: "https://h/f.apk".into(),
            size_bytes: 2048,
            changelog: String::new(),
            icon_url: None,
            store_url: None,
            developer_name: String::new(),
            rating: 0.0,
            user_count: String::new(),
            installed_version_code: installed,
        }
    }

    #[test]
    fn rows_show_action_versions_and_size() {
        let line = row(&record(Some(3)));
        assert!(line.starts_with("update "));
        assert!(line.contains("com.aresourcepool.justtip"));
        assert!(line.contains("v3"));
        assert!(line.contains("v5"));
        assert!(line.ends_with("2.0 KB"));

        let line = row(&record(None));
        assert!(line.starts_with("install "));
        assert!(line.contains(" - "));
    }

    #[test]
    fn permission_errors_name_the_install_command() {
        let mut cfg = Config::from_env();
        cfg.install_command = vec!["adb".into(), "install".into()];
        let msg = explain(DiscoverError::PermissionDenied, &cfg).to_string();
        assert!(msg.contains("`adb`"));

        let msg = explain(DiscoverError::Network("dns".into()), &cfg).to_string();
        assert!(msg.starts_with("Network error:"));
    }
}
