//! Launcher configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use discover_core::CatalogPolicy;
use discover_core::catalog::DEFAULT_CATALOG_PATH;
use discover_fetch::HttpConfig;
use discover_fetch::client::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};

/// Packages the launcher manages unless `DISCOVER_ALLOW_LIST` says otherwise.
pub const DEFAULT_ALLOW_LIST: &[&str] = &[
    "com.aresourcepool.justtip",
    "com.aresourcepool.vendingmachin",
    "com.aresourcepool.dicovertoolvend",
];

/// Runtime configuration for discover-launcher.
///
/// Every field has a default so the launcher runs without any environment
/// variables set, against a backend on localhost.
#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog backend base URL (default: `"http://localhost:8080/"`).
    pub base_url: String,

    /// Path appended to `base_url` (default: `"apk-list"`).
    pub catalog_path: String,

    /// Where downloaded artifacts are written.
    pub cache_dir: PathBuf,

    /// TOML file listing installed packages and their version codes.
    pub inventory_path: PathBuf,

    /// Install command; the artifact path is appended as the last argument.
    pub install_command: Vec<String>,

    /// `None` disables allow-list filtering (`DISCOVER_ALLOW_LIST=*`).
    pub allow_list: Option<Vec<String>>,

    /// Only list installed packages with a pending update.
    pub updates_only: bool,

    /// Validate TLS certificates and hostnames.
    pub strict_tls: bool,

    pub connect_timeout: Duration,
    pub read_timeout: Duration,

    /// Orchestrator command-queue capacity.
    pub queue_capacity: usize,

    /// `tracing` filter string, e.g. `"info"` or `"discover_core=debug"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// When set, logs are also written to a daily-rolling file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let data_dir = dirs_next::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("discover-launcher");
        let cache_dir = dirs_next::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("discover-launcher")
            .join("apk");

        Self {
            base_url: env_or("DISCOVER_BASE_URL", "http://localhost:8080/"),
            catalog_path: env_or("DISCOVER_CATALOG_PATH", DEFAULT_CATALOG_PATH),
            cache_dir: std::env::var_os("DISCOVER_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(cache_dir),
            inventory_path: std::env::var_os("DISCOVER_INVENTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("installed.toml")),
            install_command: split_command(&env_or("DISCOVER_INSTALL_CMD", "adb install -r")),
            allow_list: std::env::var("DISCOVER_ALLOW_LIST")
                .map(|v| parse_allow_list(&v))
                .unwrap_or_else(|_| Some(DEFAULT_ALLOW_LIST.iter().map(|s| s.to_string()).collect())),
            updates_only: flag("DISCOVER_UPDATES_ONLY"),
            strict_tls: flag("DISCOVER_STRICT_TLS"),
            connect_timeout: Duration::from_secs(parse_env(
                "DISCOVER_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT.as_secs(),
            )),
            read_timeout: Duration::from_secs(parse_env(
                "DISCOVER_READ_TIMEOUT_SECS",
                DEFAULT_READ_TIMEOUT.as_secs(),
            )),
            queue_capacity: parse_env("DISCOVER_QUEUE_CAPACITY", 64),
            log_level: env_or("DISCOVER_LOG", "info"),
            log_json: flag("DISCOVER_LOG_JSON"),
            log_dir: std::env::var_os("DISCOVER_LOG_DIR").map(PathBuf::from),
        }
    }

    pub fn http(&self) -> HttpConfig {
        let http = HttpConfig::new()
            .set_connect_timeout(self.connect_timeout)
            .set_read_timeout(self.read_timeout);
        if self.strict_tls { http.strict_tls() } else { http }
    }

    /// Catalog filters. `updates_only` can also be forced per invocation.
    pub fn policy(&self, updates_only: bool) -> CatalogPolicy {
        let policy = CatalogPolicy::new().set_updates_only(updates_only);
        match &self.allow_list {
            Some(packages) => policy.set_allow_list(packages.iter().cloned()),
            None => policy,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn flag(key: &str) -> bool {
    std::env::var(key).map(|v| is_truthy(&v)).unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Comma-separated package names; `*` turns filtering off.
fn parse_allow_list(value: &str) -> Option<Vec<String>> {
    if value.trim() == "*" {
        return None;
    }
    Some(
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
    )
}

fn split_command(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_owned).collect()
}
