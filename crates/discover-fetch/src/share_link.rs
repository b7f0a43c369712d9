//! Rewrites cloud-storage share links into their direct-download form.
//!
//! Only Google Drive links are recognized:
//! - `https://drive.google.com/file/d/<ID>/view?usp=sharing`
//! - `https://drive.google.com/open?id=<ID>`
//!
//! Both become `https://drive.google.com/uc?export=download&id=<ID>`. Any
//! other input is returned trimmed but otherwise unchanged.

use reqwest::Url;

const DRIVE_HOST: &str = "drive.google.com";

/// Return the direct-download URL for a share link, or `url` itself.
pub fn to_direct_download_url(url: &str) -> String {
    let trimmed = url.trim();
    match drive_file_id(trimmed) {
        Some(id) => format!("https://{DRIVE_HOST}/uc?export=download&id={id}"),
        None => trimmed.to_owned(),
    }
}

fn drive_file_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if parsed.host_str()? != DRIVE_HOST {
        return None;
    }

    let mut segments = parsed.path_segments()?;
    let id = match segments.next()? {
        "file" => {
            if segments.next()? != "d" {
                return None;
            }
            segments.next()?.to_owned()
        }
        "open" => parsed
            .query_pairs()
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())?,
        _ => return None,
    };

    is_drive_id(&id).then_some(id)
}

fn is_drive_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
