use serde::Serialize;
use strum::{Display, EnumString};

use crate::reconcile;

/// What the launcher offers for a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppAction {
    Install,
    Update,
    Open,
}

/// A catalog entry reconciled against the local package database.
///
/// Built once per catalog fetch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppRecord {
    pub package_name: String,
    pub display_name: String,
    pub current_version_code: i64,
    /// Always at least `current_version_code`.
    pub latest_version_code: i64,
    pub version_name: String,
    pub download_url: String,
    pub size_bytes: i64,
    pub changelog: String,
    pub icon_url: Option<String>,
    pub store_url: Option<String>,
    pub developer_name: String,
    pub rating: f32,
    pub user_count: String,
    /// `None` when the package is not installed.
    pub installed_version_code: Option<i64>,
}

impl AppRecord {
    pub fn action(&self) -> AppAction {
        reconcile::classify(self.installed_version_code, self.latest_version_code)
    }

    pub fn is_installed(&self) -> bool {
        self.installed_version_code.is_some()
    }

    pub fn has_update(&self) -> bool {
        self.action() == AppAction::Update
    }

    /// Label for the latest version, e.g. `1.4.0` or `v12` when the catalog
    /// carries no version name.
    pub fn latest_label(&self) -> String {
        if self.version_name.is_empty() {
            format!("v{}", self.latest_version_code)
        } else {
            self.version_name.clone()
        }
    }
}

/// Human-readable artifact size: bytes, then KB and MB with one decimal.
pub fn format_size(bytes: i64) -> String {
    const KIB: f64 = 1024.0;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / KIB)
    } else {
        format!("{:.1} MB", bytes as f64 / (KIB * KIB))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn record(installed: Option<i64>, latest: i64) -> AppRecord {
        AppRecord {
            package_name: "com.x.y".into(),
            display_name: "X".into(),
            current_version_code: 3,
            latest_version_code: latest,
            version_name: String::new(),
            download_url: "https://h/f.apk".into(),
            size_bytes: 0,
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
    fn derived_flags_follow_action() {
        let update = record(Some(3), 5);
        assert_eq!(update.action(), AppAction::Update);
        assert!(update.is_installed());
        assert!(update.has_update());

        let fresh = record(None, 5);
        assert_eq!(fresh.action(), AppAction::Install);
        assert!(!fresh.has_update());

        let current = record(Some(5), 5);
        assert_eq!(current.action(), AppAction::Open);
        assert!(!current.has_update());
    }

    #[test]
    fn latest_label_falls_back_to_code() {
        let mut r = record(None, 12);
        assert_eq!(r.latest_label(), "v12");
        r.version_name = "1.4.0".into();
        assert_eq!(r.latest_label(), "1.4.0");
    }

    #[test]
    fn action_round_trips_through_strings() {
        assert_eq!(AppAction::Update.to_string(), "update");
        assert_eq!(AppAction::from_str("open").unwrap(), AppAction::Open);
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(47_432_000), "45.2 MB");
    }
}
