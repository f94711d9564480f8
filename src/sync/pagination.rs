//! Full-collection retrieval over a limit/offset record store.
//!
//! Two strategies:
//! - Conservative: one exploratory page, then a bounded parallel burst sized
//!   from an estimate, then sequential pages until a short page.
//! - Aggressive: parallel waves from offset 0 with no exploratory call, for
//!   large collections. Falls back to conservative on any error.
//!
//! A collection is complete at the first page shorter than the page size.

use std::time::Duration;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;
use crate::source::{page_records, RecordSource};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    #[default]
    Conservative,
    Aggressive,
}

/// Tuning knobs for page bursts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationConfig {
    /// Cap on the conservative parallel burst.
    pub max_parallel_pages: usize,
    /// Estimated collection size as a multiple of the first page.
    pub estimate_multiplier: usize,
    pub aggressive_initial_wave: usize,
    pub aggressive_wave: usize,
    /// Per page request; independent of retry backoff.
    pub request_timeout_ms: u64,
    /// Hard stop for stores that never return a short page.
    pub max_pages: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_parallel_pages: 5,
            estimate_multiplier: 3,
            aggressive_initial_wave: 8,
            aggressive_wave: 4,
            request_timeout_ms: 7_000,
            max_pages: 10_000,
        }
    }
}

pub struct PageFetcher<'a> {
    source: &'a dyn RecordSource,
    config: &'a PaginationConfig,
}

impl<'a> PageFetcher<'a> {
    pub fn new(source: &'a dyn RecordSource, config: &'a PaginationConfig) -> Self {
        Self { source, config }
    }

    /// Fetch every record of `endpoint` using `strategy`.
    pub async fn fetch_all(
        &self,
        endpoint: &str,
        query: &str,
        page_size: usize,
        strategy: FetchStrategy,
    ) -> Result<Vec<Value>, SyncError> {
        match strategy {
            FetchStrategy::Conservative => self.fetch_conservative(endpoint, query, page_size).await,
            FetchStrategy::Aggressive => self.fetch_aggressive(endpoint, query, page_size).await,
        }
    }

    pub async fn fetch_conservative(
        &self,
        endpoint: &str,
        query: &str,
        page_size: usize,
    ) -> Result<Vec<Value>, SyncError> {
        let page_size = page_size.max(1);

        let mut records = self.fetch_page(endpoint, query, page_size, 0).await?;
        if records.len() < page_size {
            return Ok(records);
        }

        let estimated_total = records.len().saturating_mul(self.config.estimate_multiplier);
        let burst = estimated_total
            .div_ceil(page_size)
            .saturating_sub(1)
            .min(self.config.max_parallel_pages);

        let mut next_offset = page_size;
        let mut pages_read = 1;
        if burst > 0 {
            let pages = self
                .fetch_wave(endpoint, query, page_size, next_offset, burst)
                .await?;
            if append_until_short(&mut records, pages, page_size) {
                return Ok(records);
            }
            next_offset += burst * page_size;
            pages_read += burst;
        }

        loop {
            if pages_read >= self.config.max_pages {
                log::warn!(
                    "{}: stopped after {} full pages without reaching the end",
                    endpoint,
                    pages_read
                );
                return Ok(records);
            }
            let page = self.fetch_page(endpoint, query, page_size, next_offset).await?;
            let short = page.len() < page_size;
            records.extend(page);
            if short {
                return Ok(records);
            }
            next_offset += page_size;
            pages_read += 1;
        }
    }

    pub async fn fetch_aggressive(
        &self,
        endpoint: &str,
        query: &str,
        page_size: usize,
    ) -> Result<Vec<Value>, SyncError> {
        match self.fetch_waves(endpoint, query, page_size.max(1)).await {
            Ok(records) => Ok(records),
            Err(e) => {
                log::warn!(
                    "{}: aggressive fetch failed ({}), falling back to conservative",
                    endpoint,
                    e
                );
                self.fetch_conservative(endpoint, query, page_size).await
            }
        }
    }

    async fn fetch_waves(
        &self,
        endpoint: &str,
        query: &str,
        page_size: usize,
    ) -> Result<Vec<Value>, SyncError> {
        let mut records = Vec::new();
        let mut next_offset = 0;
        let mut pages_read = 0;
        let mut wave = self.config.aggressive_initial_wave.max(1);

        loop {
            let pages = self
                .fetch_wave(endpoint, query, page_size, next_offset, wave)
                .await?;
            if append_until_short(&mut records, pages, page_size) {
                return Ok(records);
            }
            next_offset += wave * page_size;
            pages_read += wave;
            if pages_read >= self.config.max_pages {
                log::warn!(
                    "{}: stopped after {} full pages without reaching the end",
                    endpoint,
                    pages_read
                );
                return Ok(records);
            }
            wave = self.config.aggressive_wave.max(1);
        }
    }

    /// `count` consecutive pages requested concurrently, returned in offset
    /// order. The first failure aborts the wave.
    async fn fetch_wave(
        &self,
        endpoint: &str,
        query: &str,
        page_size: usize,
        first_offset: usize,
        count: usize,
    ) -> Result<Vec<Vec<Value>>, SyncError> {
        let requests = (0..count).map(|i| {
            self.fetch_page(endpoint, query, page_size, first_offset + i * page_size)
        });
        try_join_all(requests).await
    }

    async fn fetch_page(
        &self,
        endpoint: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>, SyncError> {
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        match tokio::time::timeout(timeout, self.source.fetch_page(endpoint, query, limit, offset))
            .await
        {
            Ok(payload) => Ok(page_records(payload?)),
            Err(_) => Err(SyncError::Timeout(self.config.request_timeout_ms)),
        }
    }
}

/// Append pages in order up to and including the first short one.
/// Returns true once the end of the collection has been seen.
fn append_until_short(records: &mut Vec<Value>, pages: Vec<Vec<Value>>, page_size: usize) -> bool {
    for page in pages {
        let short = page.len() < page_size;
        records.extend(page);
        if short {
            return true;
        }
    }
    false
}
