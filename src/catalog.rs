use std::time::Instant;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::ResolvedConfig;
use crate::domain::{Catalog, CatalogEntry};
use crate::error::MirrorError;
use crate::feed::{FeedClient, PageRequest};

/// Retrieves the whole feed catalog, one request per page.
pub struct CatalogFetcher<F: FeedClient> {
    client: F,
    page_size: usize,
    max_parallel: usize,
}

impl<F: FeedClient> CatalogFetcher<F> {
    pub fn new(client: F, config: &ResolvedConfig) -> Self {
        Self {
            client,
            page_size: config.page_size.max(1),
            max_parallel: config.catalog_concurrency.max(1),
        }
    }

    pub fn client(&self) -> &F {
        &self.client
    }

    /// Asks the feed for its size, then fetches every page with at most
    /// `max_parallel` requests in flight. Pages are joined in index order.
    /// The first failing page cancels the others.
    pub async fn fetch_all(&self, sink: &dyn ProgressSink) -> Result<Catalog, MirrorError> {
        let sizing = self.client.fetch_page(PageRequest::count()).await?;
        let total = sizing.total_results.ok_or_else(|| {
            MirrorError::FeedDecode("count response is missing total_results".to_string())
        })?;
        let total = usize::try_from(total)
            .map_err(|_| MirrorError::FeedDecode(format!("total_results out of range: {total}")))?;
        let pages = total.div_ceil(self.page_size);
        sink.event(ProgressEvent {
            message: format!("catalog has {total} entries across {pages} pages"),
            elapsed: None,
        });

        let semaphore = Semaphore::new(self.max_parallel);
        let start = Instant::now();
        let results =
            try_join_all((0..pages).map(|index| self.fetch_one(index, &semaphore, sink))).await?;

        let catalog = results.into_iter().flatten().collect::<Catalog>();
        sink.event(ProgressEvent {
            message: format!("catalog fetched: {} entries", catalog.len()),
            elapsed: Some(start.elapsed()),
        });
        Ok(catalog)
    }

    async fn fetch_one(
        &self,
        index: usize,
        semaphore: &Semaphore,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<CatalogEntry>, MirrorError> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|err| MirrorError::FeedHttp(err.to_string()))?;
        let offset = index * self.page_size;
        sink.event(ProgressEvent {
            message: format!("starting page #{offset}"),
            elapsed: None,
        });
        let start = Instant::now();
        let images = self
            .client
            .fetch_page(PageRequest::page(index, self.page_size))
            .await?
            .images
            .ok_or_else(|| {
                MirrorError::FeedDecode(format!("page {index} response is missing images"))
            })?;
        debug!(page = index, entries = images.len(), "catalog page");
        sink.event(ProgressEvent {
            message: format!("finished page #{offset} {}", images.len()),
            elapsed: Some(start.elapsed()),
        });
        Ok(images)
    }
}
