use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MirrorError;

/// One image record from the raw-image feed.
///
/// Only the fields needed to place the asset on disk are typed; everything
/// else is carried in `extra` so that a cached catalog round-trips the full
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub image_files: ImageFiles,
    pub camera: Camera,
    pub sample_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFiles {
    pub full_res: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub instrument: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogEntry {
    pub fn new(full_res: &str, instrument: &str, sample_type: &str) -> Self {
        Self {
            image_files: ImageFiles {
                full_res: full_res.to_string(),
                extra: Map::new(),
            },
            camera: Camera {
                instrument: instrument.to_string(),
                extra: Map::new(),
            },
            sample_type: sample_type.to_string(),
            extra: Map::new(),
        }
    }

    pub fn source_url(&self) -> &str {
        &self.image_files.full_res
    }

    pub fn instrument(&self) -> &str {
        &self.camera.instrument
    }
}

/// Entries in ascending page order, as the feed returned them.
pub type Catalog = Vec<CatalogEntry>;

/// Where an entry's asset lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub path: Utf8PathBuf,
}

impl DownloadTarget {
    /// Resolves `<root>/<instrument>/<sample_type>/<filename>` for an entry.
    pub fn for_entry(entry: &CatalogEntry, root: &Utf8Path) -> Result<Self, MirrorError> {
        let url = entry.source_url();
        let instrument = path_component(entry.instrument(), "camera.instrument")?;
        let sample_type = path_component(&entry.sample_type, "sample_type")?;
        let filename = url_filename(url)?;

        Ok(Self {
            url: url.to_string(),
            path: root.join(instrument).join(sample_type).join(filename),
        })
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or_default()
    }
}

impl fmt::Display for DownloadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.url, self.path)
    }
}

/// Last path segment of an asset URL, ignoring any query string.
pub fn url_filename(url: &str) -> Result<String, MirrorError> {
    let parsed = Url::parse(url)
        .map_err(|err| MirrorError::InvalidEntry(format!("bad asset url {url}: {err}")))?;
    let name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let name = path_component(name, "asset url filename")
        .map_err(|_| MirrorError::InvalidEntry(format!("asset url has no filename: {url}")))?;
    Ok(name.to_string())
}

fn path_component<'a>(value: &'a str, field: &str) -> Result<&'a str, MirrorError> {
    let is_valid = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\'])
        && !value.contains('\0');
    if !is_valid {
        return Err(MirrorError::InvalidEntry(format!(
            "{field} is not a usable path component: {value:?}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn filename_strips_query() {
        let name = url_filename("https://example.org/a/b/IMG_01.png?x=1").unwrap();
        assert_eq!(name, "IMG_01.png");
    }

    #[test]
    fn filename_missing() {
        let err = url_filename("https://example.org/").unwrap_err();
        assert_matches!(err, MirrorError::InvalidEntry(_));
    }

    #[test]
    fn target_rejects_traversal() {
        let entry = CatalogEntry::new("https://example.org/x.png", "..", "Full");
        let err = DownloadTarget::for_entry(&entry, Utf8Path::new("images")).unwrap_err();
        assert_matches!(err, MirrorError::InvalidEntry(_));
    }
}
