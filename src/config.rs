use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

pub const DEFAULT_CONFIG_FILE: &str = "raw-mirror.json";
pub const DEFAULT_FEED_URL: &str = "https://mars.nasa.gov/rss/api/";
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_PARALLEL: usize = 16;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_SNAPSHOT_AGE_SECS: u64 = 24 * 60 * 60;

/// On-disk shape of `raw-mirror.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub feed_url: Option<String>,
    #[serde(default)]
    pub query: Option<FeedQueryEntry>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub catalog_concurrency: Option<usize>,
    #[serde(default)]
    pub download_concurrency: Option<usize>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_snapshot_age_secs: Option<u64>,
    #[serde(default)]
    pub snapshot_dir: Option<String>,
    #[serde(default)]
    pub images_dir: Option<String>,
    #[serde(default)]
    pub failure_policy: Option<FailurePolicy>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FeedQueryEntry {
    #[serde(default)]
    pub feed: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub feedtype: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub ver: Option<String>,
}

/// What a failed download does to the rest of the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Record the failure and keep downloading the other entries.
    #[default]
    Isolate,
    /// Abort the batch on the first failure.
    FailFast,
}

/// Fixed filter parameters sent with every feed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub feed: String,
    pub category: String,
    pub feedtype: String,
    pub order: String,
    pub ver: String,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            feed: "raw_images".to_string(),
            category: "mars2020,ingenuity".to_string(),
            feedtype: "json".to_string(),
            order: "sol desc".to_string(),
            ver: "1.2".to_string(),
        }
    }
}

impl FeedQuery {
    pub fn pairs(&self) -> [(&'static str, &str); 5] {
        [
            ("feed", self.feed.as_str()),
            ("category", self.category.as_str()),
            ("feedtype", self.feedtype.as_str()),
            ("order", self.order.as_str()),
            ("ver", self.ver.as_str()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub feed_url: String,
    pub query: FeedQuery,
    pub page_size: usize,
    pub catalog_concurrency: usize,
    pub download_concurrency: usize,
    pub request_timeout: Duration,
    pub max_snapshot_age: Duration,
    pub snapshot_dir: Utf8PathBuf,
    pub images_dir: Utf8PathBuf,
    pub failure_policy: FailurePolicy,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            query: FeedQuery::default(),
            page_size: DEFAULT_PAGE_SIZE,
            catalog_concurrency: DEFAULT_MAX_PARALLEL,
            download_concurrency: DEFAULT_MAX_PARALLEL,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_snapshot_age: Duration::from_secs(DEFAULT_MAX_SNAPSHOT_AGE_SECS),
            snapshot_dir: Utf8PathBuf::from("."),
            images_dir: Utf8PathBuf::from("images"),
            failure_policy: FailurePolicy::Isolate,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `raw-mirror.json` from the working directory when no
    /// path is given. A missing default file resolves to the built-in
    /// defaults; a missing explicit file is an error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, MirrorError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MirrorError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| MirrorError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, MirrorError> {
        let defaults = ResolvedConfig::default();
        let query = config.query.unwrap_or_default();
        let default_query = defaults.query;

        let resolved = ResolvedConfig {
            feed_url: config.feed_url.unwrap_or(defaults.feed_url),
            query: FeedQuery {
                feed: query.feed.unwrap_or(default_query.feed),
                category: query.category.unwrap_or(default_query.category),
                feedtype: query.feedtype.unwrap_or(default_query.feedtype),
                order: query.order.unwrap_or(default_query.order),
                ver: query.ver.unwrap_or(default_query.ver),
            },
            page_size: config.page_size.unwrap_or(defaults.page_size),
            catalog_concurrency: config
                .catalog_concurrency
                .unwrap_or(defaults.catalog_concurrency),
            download_concurrency: config
                .download_concurrency
                .unwrap_or(defaults.download_concurrency),
            request_timeout: config
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_snapshot_age: config
                .max_snapshot_age_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_snapshot_age),
            snapshot_dir: config
                .snapshot_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.snapshot_dir),
            images_dir: config
                .images_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.images_dir),
            failure_policy: config.failure_policy.unwrap_or(defaults.failure_policy),
        };

        resolved.validate()?;
        Ok(resolved)
    }
}

impl ResolvedConfig {
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.page_size == 0 {
            return Err(MirrorError::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }
        if self.catalog_concurrency == 0 || self.download_concurrency == 0 {
            return Err(MirrorError::InvalidConfig(
                "concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(MirrorError::InvalidConfig(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
