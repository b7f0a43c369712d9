use std::collections::HashSet;
use std::sync::Arc;

use discover_fetch::HttpConfig;
use discover_fetch::downloader::MAX_REDIRECTS;
use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::{debug, info, warn};

use crate::catalog::dto::decode_entries;
use crate::collab::PackageQuery;
use crate::error::DiscoverError;
use crate::model::AppRecord;

/// Path appended to the base URL when none is configured.
pub const DEFAULT_CATALOG_PATH: &str = "apk-list";

/// Post-mapping filters. Both are independent and off by default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogPolicy {
    /// When set, only these package names survive.
    pub allow_list: Option<HashSet<String>>,
    /// Keep only installed packages that have a newer version available.
    pub updates_only: bool,
}

impl CatalogPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_allow_list<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list = Some(packages.into_iter().map(Into::into).collect());
        self
    }

    pub fn set_updates_only(mut self, updates_only: bool) -> Self {
        self.updates_only = updates_only;
        self
    }

    pub fn admits(&self, record: &AppRecord) -> bool {
        let allowed = self
            .allow_list
            .as_ref()
            .is_none_or(|allow| allow.contains(&record.package_name));
        allowed && (!self.updates_only || record.has_update())
    }
}

/// Fetches the remote catalog and reconciles it against installed packages.
///
/// Stateless between calls: every [`fetch_catalog`](Self::fetch_catalog)
/// issues exactly one GET and rebuilds the record list from scratch.
#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
    path: String,
    policy: CatalogPolicy,
    packages: Arc<dyn PackageQuery>,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("endpoint", &self.endpoint())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    pub fn new(
        config: &HttpConfig,
        base_url: impl Into<String>,
        packages: Arc<dyn PackageQuery>,
    ) -> Result<Self, DiscoverError> {
        Ok(Self {
            http: config.build_client(Policy::limited(MAX_REDIRECTS))?,
            base_url: base_url.into(),
            path: DEFAULT_CATALOG_PATH.to_owned(),
            policy: CatalogPolicy::default(),
            packages,
        })
    }

    /// Override the endpoint path, e.g. `apks` for older backends.
    pub fn set_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn set_policy(mut self, policy: CatalogPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &CatalogPolicy {
        &self.policy
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    /// Fetch, decode, map and filter the catalog.
    pub async fn fetch_catalog(&self) -> Result<Vec<AppRecord>, DiscoverError> {
        let endpoint = self.endpoint();
        debug!(endpoint = %endpoint, "fetching catalog");

        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %endpoint, status = status.as_u16(), "catalog request rejected");
            return Err(DiscoverError::Server {
                code: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().to_owned(),
            });
        }

        let body = response.bytes().await.map_err(classify_transport)?;
        let entries = decode_entries(&body).map_err(|e| DiscoverError::Parse(e.to_string()))?;
        let received = entries.len();

        let records: Vec<AppRecord> = entries
            .into_iter()
            .filter_map(|entry| entry.into_record(self.packages.as_ref()))
            .filter(|record| self.policy.admits(record))
            .collect();

        info!(
            endpoint = %endpoint,
            received,
            kept = records.len(),
            "catalog fetched"
        );
        Ok(records)
    }
}

fn classify_transport(err: reqwest::Error) -> DiscoverError {
    if err.is_connect() {
        DiscoverError::Network(err.to_string())
    } else {
        DiscoverError::Unknown(err.to_string())
    }
}
