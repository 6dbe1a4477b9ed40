use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::catalog::CatalogFetcher;
use crate::config::ResolvedConfig;
use crate::download::{AssetDownloader, DownloadReport};
use crate::error::MirrorError;
use crate::feed::{AssetClient, FeedClient};
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub refresh: bool,
    pub dry_run: bool,
    pub skip_download: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSource {
    Snapshot,
    Feed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub catalog_source: CatalogSource,
    pub snapshot_path: String,
    pub entries: usize,
    pub downloads: Option<DownloadReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub snapshot_dir: String,
    pub snapshot_count: usize,
    pub current: Option<SnapshotStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    pub path: String,
    pub created_at: String,
    pub age_secs: i64,
    pub entries: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Load-or-fetch the catalog, then mirror every image it lists.
pub struct App<F: FeedClient, A: AssetClient> {
    store: SnapshotStore,
    fetcher: CatalogFetcher<F>,
    downloader: AssetDownloader<A>,
}

impl<F: FeedClient, A: AssetClient> App<F, A> {
    pub fn new(config: &ResolvedConfig, feed: F, assets: A) -> Self {
        Self {
            store: SnapshotStore::new(config.snapshot_dir.clone(), config.max_snapshot_age),
            fetcher: CatalogFetcher::new(feed, config),
            downloader: AssetDownloader::new(assets, config),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn fetcher(&self) -> &CatalogFetcher<F> {
        &self.fetcher
    }

    pub fn downloader(&self) -> &AssetDownloader<A> {
        &self.downloader
    }

    pub async fn run(
        &self,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, MirrorError> {
        sink.event(ProgressEvent {
            message: "phase=Catalog; looking for a fresh snapshot".to_string(),
            elapsed: None,
        });
        let current = if options.refresh {
            None
        } else {
            self.store.load_current()
        };

        let (catalog, source, snapshot_path) = match current {
            Some(snapshot) => {
                sink.event(ProgressEvent {
                    message: format!(
                        "phase=Catalog; using snapshot {} ({} entries)",
                        snapshot.path,
                        snapshot.catalog.len()
                    ),
                    elapsed: None,
                });
                (snapshot.catalog, CatalogSource::Snapshot, snapshot.path)
            }
            None => {
                sink.event(ProgressEvent {
                    message: "phase=Catalog; fetching catalog from feed".to_string(),
                    elapsed: None,
                });
                let catalog = self.fetcher.fetch_all(sink).await?;
                let path = self.store.save(&catalog)?;
                info!(%path, entries = catalog.len(), "catalog snapshot saved");
                sink.event(ProgressEvent {
                    message: format!("phase=Catalog; wrote snapshot {path}"),
                    elapsed: None,
                });
                (catalog, CatalogSource::Feed, path)
            }
        };

        let downloads = if options.skip_download {
            None
        } else {
            sink.event(ProgressEvent {
                message: format!("phase=Download; {} images", catalog.len()),
                elapsed: None,
            });
            let start = Instant::now();
            let report = self
                .downloader
                .download_all(&catalog, options.dry_run, sink)
                .await?;
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Download; downloaded={} skipped={} planned={} failed={} bytes={}",
                    report.downloaded,
                    report.skipped,
                    report.planned,
                    report.failures.len(),
                    report.bytes
                ),
                elapsed: Some(start.elapsed()),
            });
            Some(report)
        };

        Ok(RunResult {
            catalog_source: source,
            snapshot_path: snapshot_path.to_string(),
            entries: catalog.len(),
            downloads,
        })
    }

    pub fn status(&self, sink: &dyn ProgressSink) -> Result<StatusResult, MirrorError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; scanning {}", self.store.root()),
            elapsed: None,
        });
        let snapshot_count = self.store.list()?.len();
        let now = Utc::now();
        let current = self.store.load_current_at(now).map(|snapshot| SnapshotStatus {
            path: snapshot.path.to_string(),
            created_at: snapshot.created_at.to_rfc3339(),
            age_secs: now.signed_duration_since(snapshot.created_at).num_seconds(),
            entries: snapshot.catalog.len(),
        });
        Ok(StatusResult {
            snapshot_dir: self.store.root().to_string(),
            snapshot_count,
            current,
        })
    }
}

impl RunResult {
    /// Isolated download failures, surfaced once every entry has been tried.
    pub fn failure(&self) -> Option<MirrorError> {
        let report = self.downloads.as_ref()?;
        (!report.is_complete()).then(|| MirrorError::DownloadsFailed {
            failed: report.failures.len(),
            total: report.total,
        })
    }
}
