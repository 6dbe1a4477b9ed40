#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde_json::json;

use raw_image_mirror::app::{ProgressEvent, ProgressSink};
use raw_image_mirror::config::ResolvedConfig;
use raw_image_mirror::domain::CatalogEntry;
use raw_image_mirror::error::MirrorError;
use raw_image_mirror::feed::{AssetClient, FeedClient, FeedPage, PageRequest};

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

/// Tracks how many calls are running at once.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub fn entry(index: usize) -> CatalogEntry {
    let instrument = if index % 2 == 0 { "NAVCAM_LEFT" } else { "FRONT_HAZCAM_RIGHT_A" };
    let mut entry = CatalogEntry::new(
        &format!("https://mars.test/raw/{index:04}/IMG_{index:04}.png"),
        instrument,
        "Full",
    );
    entry.extra.insert("imageid".to_string(), json!(format!("IMG_{index:04}")));
    entry.extra.insert("sol".to_string(), json!(index / 10));
    entry
        .camera
        .extra
        .insert("filter_name".to_string(), json!("UNK"));
    entry
}

pub fn entries(count: usize) -> Vec<CatalogEntry> {
    (0..count).map(entry).collect()
}

pub fn test_config(root: &std::path::Path) -> ResolvedConfig {
    let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap();
    ResolvedConfig {
        page_size: 4,
        catalog_concurrency: 3,
        download_concurrency: 3,
        snapshot_dir: root.join("snapshots"),
        images_dir: root.join("images"),
        ..ResolvedConfig::default()
    }
}

/// Serves `entries` in pages of `page_size`. Later pages answer sooner
/// when `reverse_delays` is set.
pub struct FakeFeed {
    pub entries: Vec<CatalogEntry>,
    pub page_size: usize,
    pub reverse_delays: bool,
    pub fail_page: Option<usize>,
    pub missing_images_page: Option<usize>,
    pub requests: Mutex<Vec<PageRequest>>,
    pub in_flight: InFlight,
}

impl FakeFeed {
    pub fn new(entries: Vec<CatalogEntry>, page_size: usize) -> Self {
        Self {
            entries,
            page_size,
            reverse_delays: false,
            fail_page: None,
            missing_images_page: None,
            requests: Mutex::new(Vec::new()),
            in_flight: InFlight::default(),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn pages(&self) -> usize {
        self.entries.len().div_ceil(self.page_size)
    }
}

#[async_trait]
impl FeedClient for FakeFeed {
    async fn fetch_page(&self, request: PageRequest) -> Result<FeedPage, MirrorError> {
        self.requests.lock().unwrap().push(request);
        let Some(index) = request.page else {
            return Ok(FeedPage {
                images: None,
                total_results: Some(self.entries.len() as u64),
            });
        };

        self.in_flight.enter();
        let delay = if self.reverse_delays {
            (self.pages() - index) as u64 * 3
        } else {
            5
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.exit();

        if self.fail_page == Some(index) {
            return Err(MirrorError::FeedStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        let start = (index * request.num).min(self.entries.len());
        let end = (start + request.num).min(self.entries.len());
        Ok(FeedPage {
            images: (self.missing_images_page != Some(index))
                .then(|| self.entries[start..end].to_vec()),
            total_results: None,
        })
    }
}

#[derive(Default)]
pub struct FakeAssets {
    pub fetched: Mutex<Vec<String>>,
    pub fail_urls: HashSet<String>,
    pub in_flight: InFlight,
}

impl FakeAssets {
    pub fn failing(urls: &[&str]) -> Self {
        Self {
            fail_urls: urls.iter().map(|url| url.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        let mut fetched = self.fetched.lock().unwrap().clone();
        fetched.sort();
        fetched
    }
}

#[async_trait]
impl AssetClient for FakeAssets {
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        self.in_flight.enter();
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.exit();
        self.fetched.lock().unwrap().push(url.to_string());
        if self.fail_urls.contains(url) {
            return Err(MirrorError::AssetStatus {
                url: url.to_string(),
                status: 404,
            });
        }
        Ok(format!("bytes of {url}").into_bytes())
    }
}
