use std::io::Write;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::{FailurePolicy, ResolvedConfig};
use crate::domain::{CatalogEntry, DownloadTarget};
use crate::error::MirrorError;
use crate::feed::AssetClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded { path: Utf8PathBuf, bytes: u64 },
    Skipped { path: Utf8PathBuf },
    Planned { path: Utf8PathBuf },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadReport {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub planned: usize,
    pub bytes: u64,
    pub failures: Vec<DownloadFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadFailure {
    pub index: usize,
    pub url: String,
    pub error: String,
}

impl DownloadReport {
    fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded { bytes, .. } => {
                self.downloaded += 1;
                self.bytes += bytes;
            }
            DownloadOutcome::Skipped { .. } => self.skipped += 1,
            DownloadOutcome::Planned { .. } => self.planned += 1,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Downloads every entry's full-resolution image into
/// `<images_dir>/<instrument>/<sample_type>/<filename>`.
pub struct AssetDownloader<A: AssetClient> {
    client: A,
    images_dir: Utf8PathBuf,
    max_parallel: usize,
    policy: FailurePolicy,
}

impl<A: AssetClient> AssetDownloader<A> {
    pub fn new(client: A, config: &ResolvedConfig) -> Self {
        Self {
            client,
            images_dir: config.images_dir.clone(),
            max_parallel: config.download_concurrency.max(1),
            policy: config.failure_policy,
        }
    }

    pub fn client(&self) -> &A {
        &self.client
    }

    pub fn images_dir(&self) -> &Utf8Path {
        &self.images_dir
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs one task per entry, at most `max_parallel` at a time. Entries
    /// whose target file already exists are skipped without a request.
    ///
    /// Under [`FailurePolicy::FailFast`] the first error cancels the batch
    /// and is returned. Under [`FailurePolicy::Isolate`] every entry is
    /// attempted and failures are listed in the report.
    pub async fn download_all(
        &self,
        catalog: &[CatalogEntry],
        dry_run: bool,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, MirrorError> {
        let semaphore = Semaphore::new(self.max_parallel);
        let total = catalog.len();
        let mut report = DownloadReport {
            total,
            ..DownloadReport::default()
        };
        let tasks = catalog
            .iter()
            .enumerate()
            .map(|(index, entry)| self.download_one(index, total, entry, dry_run, &semaphore, sink));

        match self.policy {
            FailurePolicy::FailFast => {
                for outcome in try_join_all(tasks).await? {
                    report.record(&outcome);
                }
            }
            FailurePolicy::Isolate => {
                for (index, result) in join_all(tasks).await.into_iter().enumerate() {
                    match result {
                        Ok(outcome) => report.record(&outcome),
                        Err(err) => {
                            warn!(index, error = %err, "download failed");
                            report.failures.push(DownloadFailure {
                                index,
                                url: catalog[index].source_url().to_string(),
                                error: err.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(report)
    }

    async fn download_one(
        &self,
        index: usize,
        total: usize,
        entry: &CatalogEntry,
        dry_run: bool,
        semaphore: &Semaphore,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, MirrorError> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        let target = DownloadTarget::for_entry(entry, &self.images_dir)?;

        let exists = tokio::fs::try_exists(target.path.as_std_path())
            .await
            .map_err(|err| MirrorError::Filesystem(format!("stat {}: {err}", target.path)))?;
        if exists {
            sink.event(ProgressEvent {
                message: format!("nothing to do for {index:6} /{total:6}"),
                elapsed: None,
            });
            return Ok(DownloadOutcome::Skipped { path: target.path });
        }
        if dry_run {
            sink.event(ProgressEvent {
                message: format!("would fetch {index:6} /{total:6} {}", target.url),
                elapsed: None,
            });
            return Ok(DownloadOutcome::Planned { path: target.path });
        }

        sink.event(ProgressEvent {
            message: format!("starting image {index:6} /{total:6}"),
            elapsed: None,
        });
        let start = Instant::now();
        let bytes = self.client.fetch_asset(&target.url).await?;
        let size = bytes.len() as u64;
        let path = target.path.clone();
        tokio::task::spawn_blocking(move || write_asset(&path, &bytes))
            .await
            .map_err(|err| MirrorError::Filesystem(err.to_string()))??;
        debug!(file = target.file_name(), path = %target.path, bytes = size, "asset written");
        sink.event(ProgressEvent {
            message: format!("finished image {index:6} /{total:6} => {size:10}"),
            elapsed: Some(start.elapsed()),
        });
        Ok(DownloadOutcome::Downloaded {
            path: target.path,
            bytes: size,
        })
    }
}

/// Writes through a temp file in the destination directory, then renames it
/// over `path`. A concurrent writer of the same path wins if it renames last.
pub fn write_asset(path: &Utf8Path, content: &[u8]) -> Result<(), MirrorError> {
    let parent = path
        .parent()
        .ok_or_else(|| MirrorError::Filesystem(format!("invalid destination path: {path}")))?;
    std::fs::create_dir_all(parent.as_std_path())
        .map_err(|err| MirrorError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".raw-mirror")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| MirrorError::Filesystem(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| MirrorError::Filesystem(format!("write {path}: {}", err.error)))?;
    Ok(())
}
