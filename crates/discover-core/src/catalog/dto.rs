use serde::Deserialize;

use crate::collab::PackageQuery;
use crate::model::AppRecord;

/// One catalog entry as sent by the backend. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub app_id: Option<String>,
    pub package_name: Option<String>,
    pub app_name: Option<String>,
    pub current_version_code: Option<i64>,
    pub latest_version_code: Option<i64>,
    pub version_name: Option<String>,
    pub apk_download_url: Option<String>,
    pub apk_size: Option<i64>,
    pub changelog: Option<String>,
    pub icon_url: Option<String>,
    pub play_store_url: Option<String>,
    pub developer_name: Option<String>,
    pub rating: Option<f32>,
    pub user_count: Option<String>,
}

/// `{ "type": ..., "message": ..., "data": [...] }`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogEnvelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
    pub data: Option<Vec<CatalogEntry>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogBody {
    Envelope(CatalogEnvelope),
    Bare(Vec<CatalogEntry>),
}

/// Decode a catalog body, accepting either the envelope or a bare array.
///
/// A missing or `null` `data` field is an empty catalog.
pub fn decode_entries(body: &[u8]) -> Result<Vec<CatalogEntry>, serde_json::Error> {
    Ok(match serde_json::from_slice(body)? {
        CatalogBody::Envelope(envelope) => envelope.data.unwrap_or_default(),
        CatalogBody::Bare(entries) => entries,
    })
}

impl CatalogEntry {
    /// The first non-blank of `packageName` and `appId`.
    pub fn package_name_or_app_id(&self) -> Option<&str> {
        [self.package_name.as_deref(), self.app_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
    }

    /// Map to a domain record, looking up the installed version as we go.
    ///
    /// Returns `None` when the entry carries no usable package name.
    pub fn into_record(self, packages: &dyn PackageQuery) -> Option<AppRecord> {
        let package_name = self.package_name_or_app_id()?.to_owned();
        let current = self.current_version_code.unwrap_or(0);
        let latest = self.latest_version_code.unwrap_or(0).max(current);
        let installed_version_code = packages.installed_version(&package_name);

        Some(AppRecord {
            display_name: self
                .app_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| package_name.clone()),
            current_version_code: current,
            latest_version_code: latest,
            version_name: self.version_name.unwrap_or_default(),
            download_url: self.apk_download_url.unwrap_or_default(),
            size_bytes: self.apk_size.unwrap_or(0),
            changelog: self.changelog.unwrap_or_default(),
            icon_url: self.icon_url,
            store_url: self.play_store_url,
            developer_name: self.developer_name.unwrap_or_default(),
            rating: self.rating.unwrap_or(0.0),
            user_count: self.user_count.unwrap_or_default(),
            installed_version_code,
            package_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::StaticPackages;
    use crate::model::AppAction;

    #[test]
    fn envelope_and_bare_array_decode_alike() {
        let envelope = br#"{"type":"success","message":"ok","data":[{"packageName":"com.x.y"}]}"#;
        let bare = br#"[{"packageName":"com.x.y"}]"#;
        assert_eq!(
            decode_entries(envelope).unwrap(),
            decode_entries(bare).unwrap()
        );
    }

    #[test]
    fn null_or_missing_data_is_empty() {
        assert!(decode_entries(br#"{"type":"success","data":null}"#).unwrap().is_empty());
        assert!(decode_entries(br#"{"message":"nothing"}"#).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(decode_entries(b"<html></html>").is_err());
        assert!(decode_entries(b"42").is_err());
    }

    #[test]
    fn update_scenario_maps_to_update() {
        let entry: CatalogEntry = serde_json::from_str(
            r#"{"packageName":"com.x.y","currentVersionCode":3,"latestVersionCode":5,"apkDownloadUrl":"https://h/f.apk"}"#,
        )
        .unwrap();
        let packages = StaticPackages::new().with("com.x.y", 3);

        let record = entry.into_record(&packages).unwrap();
        assert_eq!(record.action(), AppAction::Update);
        assert!(record.has_update());
        assert_eq!(record.display_name, "com.x.y");
        assert_eq!(record.download_url, "https://h/f.apk");
    }

    #[test]
    fn not_installed_maps_to_install() {
        let entry = CatalogEntry {
            package_name: Some("com.x.y".into()),
            current_version_code: Some(3),
            latest_version_code: Some(5),
            ..Default::default()
        };

        let record = entry.into_record(&StaticPackages::new()).unwrap();
        assert_eq!(record.action(), AppAction::Install);
        assert_eq!(record.installed_version_code, None);
    }

    #[test]
    fn latest_is_never_below_current() {
        let lagging = CatalogEntry {
            package_name: Some("p".into()),
            current_version_code: Some(9),
            latest_version_code: Some(4),
            ..Default::default()
        };
        assert_eq!(
            lagging.into_record(&StaticPackages::new()).unwrap().latest_version_code,
            9
        );

        let bare = CatalogEntry {
            package_name: Some("p".into()),
            ..Default::default()
        };
        let record = bare.into_record(&StaticPackages::new()).unwrap();
        assert_eq!(record.latest_version_code, 0);
        assert_eq!(record.current_version_code, 0);
    }

    #[test]
    fn package_name_falls_back_to_app_id() {
        let entry = CatalogEntry {
            package_name: Some("  ".into()),
            app_id: Some("com.a.b".into()),
            ..Default::default()
        };
        assert_eq!(entry.package_name_or_app_id(), Some("com.a.b"));

        let nameless = CatalogEntry {
            app_name: Some("Orphan".into()),
            ..Default::default()
        };
        assert!(nameless.into_record(&StaticPackages::new()).is_none());
    }
}
