//! Result sources: where the dashboard reads backtest rows from

use anyhow::Result;
use async_trait::async_trait;
use persistence::repository::StrategyResultRepository;
use persistence::SqlitePool;
use tracing::debug;

use crate::types::StrategyResult;

/// Rows per request when paging through a table
pub const DEFAULT_PAGE_SIZE: i64 = 1000;

/// A store of upstream backtest rows. Implementations page through the store
/// themselves; callers get the whole set.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    async fn fetch_all(&self) -> Result<Vec<StrategyResult>>;

    async fn fetch_by_id(&self, id: i64) -> Result<Option<StrategyResult>>;
}

/// Local SQLite table
pub struct SqliteSource {
    pool: SqlitePool,
    page_size: i64,
}

impl SqliteSource {
    pub fn new(pool: SqlitePool, page_size: i64) -> Self {
        Self {
            pool,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl ResultSource for SqliteSource {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn fetch_all(&self) -> Result<Vec<StrategyResult>> {
        let repo = StrategyResultRepository::new(&self.pool);
        let rows = repo.fetch_all(self.page_size).await?;
        debug!(rows = rows.len(), page_size = self.page_size, "Read strategy results from SQLite");
        Ok(rows)
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<StrategyResult>> {
        let repo = StrategyResultRepository::new(&self.pool);
        Ok(repo.get_by_id(id).await?)
    }
}
