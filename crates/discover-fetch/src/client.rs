use std::env;
use std::time::Duration;

use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::warn;

use crate::error::FetchError;

/// Connect timeout applied to every request (and every redirect hop).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Per-read timeout applied while a response body is being streamed.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared HTTP transport settings.
///
/// Built once at process start and handed to both the catalog client and the
/// artifact fetcher, so tests can swap in a strict-TLS variant without any
/// process-wide state.
///
/// # Example
/// ```rust
/// use discover_fetch::HttpConfig;
/// use std::time::Duration;
///
/// let config = HttpConfig::new()
///     .set_connect_timeout(Duration::from_secs(5))
///     .strict_tls();
/// assert!(!config.accept_invalid_certs);
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Skip certificate chain and hostname validation. On by default: the
    /// catalog backend and artifact hosts are allowed to use self-signed
    /// certificates.
    pub accept_invalid_certs: bool,
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpConfig {
    /// Create a configuration with the default timeouts and relaxed TLS.
    ///
    /// Proxy is automatically read from `HTTPS_PROXY` / `HTTP_PROXY`.
    pub fn new() -> Self {
        let proxy = env::var("HTTPS_PROXY")
            .ok()
            .or_else(|| env::var("HTTP_PROXY").ok());

        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            accept_invalid_certs: true,
            proxy,
            user_agent: concat!("discover-fetch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn set_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn set_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the HTTP/HTTPS proxy URL.
    pub fn set_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Disable any proxy, including one picked up from the environment.
    pub fn no_proxy(mut self) -> Self {
        self.proxy = None;
        self
    }

    /// Re-enable certificate and hostname validation.
    pub fn strict_tls(mut self) -> Self {
        self.accept_invalid_certs = false;
        self
    }

    /// Build a [`Client`] carrying these settings and the given redirect policy.
    pub fn build_client(&self, redirect: Policy) -> Result<Client, FetchError> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .redirect(redirect);

        if self.accept_invalid_certs {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        match &self.proxy {
            Some(proxy_url) => match reqwest::Proxy::all(proxy_url) {
                Ok(p) => {
                    builder = builder.proxy(p);
                }
                Err(e) => {
                    warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy URL");
                }
            },
            None => {
                builder = builder.no_proxy();
            }
        }

        builder.build().map_err(|e| FetchError::ClientConfig {
            message: e.to_string(),
        })
    }
}
