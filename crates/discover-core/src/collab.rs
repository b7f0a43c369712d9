//! Boundaries to the host platform: the local package database and the OS
//! installer.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

/// Read access to installed package versions.
pub trait PackageQuery: Send + Sync {
    /// Installed version code of `package`, or `None` when it is not installed.
    fn installed_version(&self, package: &str) -> Option<i64>;
}

/// Hands a downloaded artifact to the platform installer.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Whether this process is currently allowed to install packages.
    async fn can_install(&self) -> bool;

    /// Start the install flow for `artifact`. Returns whether the hand-off was
    /// initiated; the outcome of the install itself is not observed.
    async fn install(&self, artifact: &Path) -> bool;
}

/// An in-memory package database.
#[derive(Debug, Clone, Default)]
pub struct StaticPackages {
    versions: HashMap<String, i64>,
}

impl StaticPackages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, package: impl Into<String>, version_code: i64) -> Self {
        self.versions.insert(package.into(), version_code);
        self
    }
}

impl PackageQuery for StaticPackages {
    fn installed_version(&self, package: &str) -> Option<i64> {
        self.versions.get(package).copied()
    }
}
