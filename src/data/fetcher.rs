//! Cache-or-network retrieval of a single batch.

use serde_json::Value;
use tracing::{info, warn};

use crate::data::cenace::{Request, TlsMode, Transport, snippet};
use crate::domain::{Batch, DemandPoint, Endpoint};
use crate::error::FetchError;
use crate::io::cache::{CacheKey, DiskCache};
use crate::io::normalize::{ParseSummary, normalize_response};

/// Where a batch's points came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSource {
    Cache,
    Network,
    /// Nothing usable was obtained; see `BatchReport::error`.
    Failed,
}

impl BatchSource {
    pub fn label(self) -> &'static str {
        match self {
            BatchSource::Cache => "cache",
            BatchSource::Network => "network",
            BatchSource::Failed => "failed",
        }
    }
}

/// Outcome of fetching one batch. A failed batch has no points and an error.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch: Batch,
    pub source: BatchSource,
    pub points: Vec<DemandPoint>,
    /// Present for network results.
    pub parse: Option<ParseSummary>,
    pub error: Option<FetchError>,
    /// Set when the result could not be persisted (the points are still returned).
    pub cache_write_error: Option<String>,
    /// The request target, when the network was used.
    pub target: Option<String>,
}

impl BatchReport {
    fn cached(batch: Batch, points: Vec<DemandPoint>) -> Self {
        Self {
            batch,
            source: BatchSource::Cache,
            points,
            parse: None,
            error: None,
            cache_write_error: None,
            target: None,
        }
    }

    fn failed(batch: Batch, target: String, error: FetchError) -> Self {
        Self {
            batch,
            source: BatchSource::Failed,
            points: Vec::new(),
            parse: None,
            error: Some(error),
            cache_write_error: None,
            target: Some(target),
        }
    }
}

/// Fetches batches through a cache, falling back to the remote service.
pub struct Fetcher<T> {
    transport: T,
    cache: DiskCache,
    endpoint: Endpoint,
    refetch_empty: bool,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, cache: DiskCache, endpoint: Endpoint) -> Self {
        Self {
            transport,
            cache,
            endpoint,
            refetch_empty: false,
        }
    }

    /// When set, a cached empty result counts as a miss and empty network
    /// results are not written.
    pub fn refetch_empty(mut self, refetch_empty: bool) -> Self {
        self.refetch_empty = refetch_empty;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Fetch one batch. Never fails: problems are reported inside the result.
    ///
    /// Cache hits are returned verbatim. Network results are filtered to
    /// `[range_start, range_end)` before they are cached, empty ones included.
    pub fn fetch(&self, batch: &Batch) -> BatchReport {
        let key = CacheKey::from(batch);
        match self.cache.get(&key) {
            Some(points) if points.is_empty() && self.refetch_empty => {
                info!(batch = %batch, "cached result is empty; refetching");
            }
            Some(points) => {
                info!(batch = %batch, points = points.len(), "cache hit");
                return BatchReport::cached(*batch, points);
            }
            None => {}
        }

        let request = Request::for_batch(&self.endpoint, batch);
        let target = request.url().to_string();
        info!(batch = %batch, method = request.method(), url = %target, "requesting batch");

        let (points, summary) = match self.fetch_remote(&request, batch) {
            Ok(found) => found,
            Err(err) => {
                warn!(batch = %batch, kind = err.kind(), "{err}");
                return BatchReport::failed(*batch, target, err);
            }
        };

        if !summary.skipped.is_empty() {
            warn!(
                batch = %batch,
                skipped = summary.skipped.len(),
                seen = summary.records_seen,
                "dropped malformed records"
            );
        }

        let cache_write_error = if points.is_empty() && self.refetch_empty {
            None
        } else {
            self.cache.put(&key, &points).err().map(|e| {
                warn!("{e}");
                e.to_string()
            })
        };

        BatchReport {
            batch: *batch,
            source: BatchSource::Network,
            points,
            parse: Some(summary),
            error: None,
            cache_write_error,
            target: Some(target),
        }
    }

    fn fetch_remote(&self, request: &Request, batch: &Batch) -> Result<(Vec<DemandPoint>, ParseSummary), FetchError> {
        let response = match self.transport.send(request, TlsMode::Strict) {
            Ok(resp) => resp,
            Err(FetchError::Transport { message, .. }) => {
                warn!(url = %request.url(), "{message}; retrying once without certificate verification");
                self.transport.send(request, TlsMode::Relaxed)?
            }
            Err(other) => return Err(other),
        };

        if !response.is_success() {
            return Err(FetchError::UpstreamStatus {
                status: response.status,
                url: request.url().to_string(),
                snippet: response.snippet(),
            });
        }

        let payload: Value = serde_json::from_str(&response.body).map_err(|e| FetchError::UnparsableResponse {
            keys: Vec::new(),
            detail: format!("body is not JSON ({e}): {}", snippet(&response.body)),
        })?;

        let normalized = normalize_response(&payload)?;
        let points = normalized
            .points
            .into_iter()
            .filter(|p| batch.contains(p.timestamp))
            .collect();

        Ok((points, normalized.summary))
    }
}
