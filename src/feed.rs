use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::config::{FeedQuery, ResolvedConfig};
use crate::domain::CatalogEntry;
use crate::error::MirrorError;

/// A single feed request. `page` is absent for the count request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub num: usize,
    pub page: Option<usize>,
}

impl PageRequest {
    pub fn count() -> Self {
        Self { num: 0, page: None }
    }

    pub fn page(index: usize, page_size: usize) -> Self {
        Self {
            num: page_size,
            page: Some(index),
        }
    }
}

/// Decoded feed response. `images` is absent on error bodies, which is
/// only acceptable for the count request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub images: Option<Vec<CatalogEntry>>,
    #[serde(default)]
    pub total_results: Option<u64>,
}

#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch_page(&self, request: PageRequest) -> Result<FeedPage, MirrorError>;
}

#[async_trait]
pub trait AssetClient: Send + Sync {
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, MirrorError>;
}

#[derive(Clone)]
pub struct HttpFeedClient {
    client: Client,
    feed_url: String,
    query: FeedQuery,
}

impl HttpFeedClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("raw-mirror/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MirrorError::FeedHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|err| MirrorError::FeedHttp(err.to_string()))?;
        Ok(Self {
            client,
            feed_url: config.feed_url.clone(),
            query: config.query.clone(),
        })
    }

    pub fn query_pairs(&self, request: PageRequest) -> Vec<(&'static str, String)> {
        let mut pairs = self
            .query
            .pairs()
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect::<Vec<_>>();
        pairs.push(("num", request.num.to_string()));
        if let Some(page) = request.page {
            pairs.push(("page", page.to_string()));
        }
        pairs
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_page(&self, request: PageRequest) -> Result<FeedPage, MirrorError> {
        let response = self
            .client
            .get(&self.feed_url)
            .query(&self.query_pairs(request))
            .send()
            .await
            .map_err(|err| MirrorError::FeedHttp(err.to_string()))?;
        debug!(url = %response.url(), "feed response");

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "feed request failed".to_string());
            return Err(MirrorError::FeedStatus { status, message });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| MirrorError::FeedHttp(err.to_string()))?;
        serde_json::from_slice(&body).map_err(|err| MirrorError::FeedDecode(err.to_string()))
    }
}

#[async_trait]
impl AssetClient for HttpFeedClient {
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| MirrorError::AssetHttp {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(MirrorError::AssetStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(|err| MirrorError::AssetHttp {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
