use std::fs;
use std::io::Write;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use tempfile::Builder;
use tracing::{debug, warn};

use crate::domain::Catalog;
use crate::error::MirrorError;

const SNAPSHOT_PREFIX: &str = "db_";
const SNAPSHOT_SUFFIX: &str = ".json";
const TIMESTAMP_WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const TIMESTAMP_READ_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A catalog loaded from disk together with when it was taken.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub path: Utf8PathBuf,
    pub created_at: DateTime<Utc>,
    pub catalog: Catalog,
}

/// Timestamped catalog files in one directory, named
/// `db_<timestamp>.json` so that a lexical sort is a chronological sort.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: Utf8PathBuf,
    max_age: TimeDelta,
}

impl SnapshotStore {
    pub fn new(root: Utf8PathBuf, max_age: Duration) -> Self {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        Self { root, max_age }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn max_age(&self) -> TimeDelta {
        self.max_age
    }

    pub fn snapshot_path(&self, created_at: DateTime<Utc>) -> Utf8PathBuf {
        self.root.join(snapshot_file_name(created_at))
    }

    pub fn load_current(&self) -> Option<Snapshot> {
        self.load_current_at(Utc::now())
    }

    /// Newest snapshot no older than the freshness window. Files with a
    /// foreign name or unreadable content are skipped.
    pub fn load_current_at(&self, now: DateTime<Utc>) -> Option<Snapshot> {
        let candidates = match self.list() {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, "unable to scan snapshot directory");
                return None;
            }
        };

        for (path, created_at) in candidates {
            let age = now.signed_duration_since(created_at);
            if age > self.max_age {
                debug!(%path, %created_at, "snapshot too old");
                continue;
            }
            match read_catalog(&path) {
                Ok(catalog) => {
                    debug!(%path, entries = catalog.len(), "using snapshot");
                    return Some(Snapshot {
                        path,
                        created_at,
                        catalog,
                    });
                }
                Err(err) => warn!(%path, error = %err, "skipping snapshot"),
            }
        }
        None
    }

    pub fn save(&self, catalog: &Catalog) -> Result<Utf8PathBuf, MirrorError> {
        self.save_at(catalog, Utc::now())
    }

    /// Writes a new snapshot stamped `created_at`. An existing file with the
    /// same name is never replaced.
    pub fn save_at(
        &self,
        catalog: &Catalog,
        created_at: DateTime<Utc>,
    ) -> Result<Utf8PathBuf, MirrorError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        let path = self.snapshot_path(created_at);
        let content =
            serde_json::to_vec(catalog).map_err(|err| MirrorError::Filesystem(err.to_string()))?;

        let mut temp = Builder::new()
            .prefix(".db-snapshot")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        temp.persist_noclobber(path.as_std_path())
            .map_err(|err| MirrorError::Filesystem(format!("write snapshot {path}: {}", err.error)))?;
        debug!(%path, entries = catalog.len(), "snapshot written");
        Ok(path)
    }

    /// Every snapshot with a parseable name, newest first.
    pub fn list(&self) -> Result<Vec<(Utf8PathBuf, DateTime<Utc>)>, MirrorError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            match parse_snapshot_name(&name) {
                Ok(created_at) => snapshots.push((self.root.join(&name), created_at)),
                Err(err) => {
                    if name.starts_with(SNAPSHOT_PREFIX) {
                        debug!(error = %err, "ignoring file");
                    }
                }
            }
        }
        snapshots.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        Ok(snapshots)
    }
}

pub fn snapshot_file_name(created_at: DateTime<Utc>) -> String {
    format!(
        "{SNAPSHOT_PREFIX}{}{SNAPSHOT_SUFFIX}",
        created_at.format(TIMESTAMP_WRITE_FORMAT)
    )
}

/// Extracts the timestamp from `db_<timestamp>.json`. The timestamp is read
/// as UTC.
pub fn parse_snapshot_name(name: &str) -> Result<DateTime<Utc>, MirrorError> {
    let stamp = name
        .strip_prefix(SNAPSHOT_PREFIX)
        .and_then(|rest| rest.strip_suffix(SNAPSHOT_SUFFIX))
        .ok_or_else(|| MirrorError::SnapshotParse(name.to_string()))?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_READ_FORMAT)
        .map_err(|err| MirrorError::SnapshotParse(format!("{name}: {err}")))?;
    Ok(naive.and_utc())
}

fn read_catalog(path: &Utf8Path) -> Result<Catalog, MirrorError> {
    let content =
        fs::read(path.as_std_path()).map_err(|err| MirrorError::Filesystem(err.to_string()))?;
    serde_json::from_slice(&content).map_err(|err| MirrorError::SnapshotParse(format!("{path}: {err}")))
}
