//! Version reconciliation: catalog versions against installed versions.

use crate::model::{AppAction, AppRecord};

/// Classify a package from its installed and latest version codes.
///
/// A package that is not installed is always [`AppAction::Install`], whatever
/// the version numbers say.
pub fn classify(installed: Option<i64>, latest: i64) -> AppAction {
    match installed {
        None => AppAction::Install,
        Some(installed) if latest > installed => AppAction::Update,
        Some(_) => AppAction::Open,
    }
}

/// Records the bulk "update all" trigger should act on.
pub fn updatable(records: &[AppRecord]) -> Vec<AppRecord> {
    records.iter().filter(|r| r.has_update()).cloned().collect()
}
