//! Dashboard service: cached, parsed view of a result source
//!
//! Rows are parsed once when the cache is filled. A failed fetch is logged and
//! served as an empty set; it is not cached, so the next request retries.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::TtlCache;
use crate::source::ResultSource;
use crate::types::AnalyzedResult;

/// Default lifetime of the cached result set
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

const RESULTS_KEY: &str = "results";

pub struct DashboardService {
    source: Arc<dyn ResultSource>,
    cache: TtlCache<&'static str, Arc<Vec<AnalyzedResult>>>,
}

impl DashboardService {
    pub fn new(source: Arc<dyn ResultSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// The full parsed result set, refreshed lazily after the TTL runs out
    pub async fn results(&self) -> Arc<Vec<AnalyzedResult>> {
        if let Some(cached) = self.cache.get(&RESULTS_KEY) {
            debug!(rows = cached.len(), "Serving cached strategy results");
            return cached;
        }

        info!(source = self.source.name(), "Refreshing strategy result cache");
        match self.source.fetch_all().await {
            Ok(rows) => {
                let analyzed: Vec<AnalyzedResult> =
                    rows.into_iter().map(AnalyzedResult::new).collect();
                info!(
                    rows = analyzed.len(),
                    ttl_secs = self.cache.ttl().as_secs(),
                    "Strategy results cached"
                );
                let shared = Arc::new(analyzed);
                self.cache.insert(RESULTS_KEY, shared.clone());
                shared
            }
            Err(e) => {
                error!(source = self.source.name(), error = %e, "Failed to fetch strategy results");
                Arc::new(Vec::new())
            }
        }
    }

    /// Look up one result, first in the cached set, then in the source
    pub async fn find(&self, id: i64) -> Option<AnalyzedResult> {
        let results = self.results().await;
        if let Some(hit) = results.iter().find(|r| r.result.id == id) {
            return Some(hit.clone());
        }

        match self.source.fetch_by_id(id).await {
            Ok(found) => found.map(AnalyzedResult::new),
            Err(e) => {
                warn!(id, error = %e, "Strategy lookup failed");
                None
            }
        }
    }

    /// Drop the cached result set; the next read refetches
    pub fn invalidate(&self) {
        self.cache.clear();
        info!("Strategy result cache invalidated");
    }
}
