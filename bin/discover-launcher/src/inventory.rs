//! Installed-package inventory backed by a TOML file.
//!
//! ```toml
//! [packages]
//! "com.aresourcepool.justtip" = 3
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use discover_core::PackageQuery;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Default, Deserialize)]
struct Inventory {
    #[serde(default)]
    packages: HashMap<String, i64>,
}

/// Reads the inventory file on every query so edits are picked up without a
/// restart. A missing file means nothing is installed.
#[derive(Debug, Clone)]
pub struct InventoryFile {
    path: PathBuf,
}

impl InventoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> anyhow::Result<Inventory> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "inventory file not found");
                return Ok(Inventory::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        toml::from_str(&text).with_context(|| format!("parsing {}", self.path.display()))
    }
}

impl PackageQuery for InventoryFile {
    fn installed_version(&self, package: &str) -> Option<i64> {
        match self.load() {
            Ok(inventory) => inventory.packages.get(package).copied(),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "ignoring unreadable inventory");
                None
            }
        }
    }
}
