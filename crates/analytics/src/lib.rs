//! Strategy dashboard analytics
//!
//! Turns raw backtest rows into dashboard views:
//! - Lenient metric parsing (`"12.5%"`, `"$1,234"`, `"−3"`)
//! - Filtering, sorting and pagination of result sets
//! - Per-timeframe stats and the ticker × timeframe best-strategy matrix
//! - Result sources (local SQLite, hosted table store) behind a TTL cache

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod dashboard;
pub mod filter;
pub mod parse;
pub mod sort;
pub mod source;
pub mod types;

// Re-exports for convenience
pub use aggregate::{
    best_by_metric, compute_coin_timeframe_matrix, compute_timeframe_stats, distinct_tickers,
    distinct_timeframes, performance_summary, recent_results, sort_timeframes_by_duration,
    timeframe_hours, top_performers,
};
pub use api::{TableSelection, TableStoreClient, TableStoreConfig};
pub use cache::TtlCache;
pub use dashboard::{DashboardService, DEFAULT_CACHE_TTL};
pub use filter::{apply_filters, FilterCriteria};
pub use parse::{parse_count, parse_dollar, parse_metric, parse_percentage};
pub use sort::{paginate, sort_results, SortKey, SortOrder, MAX_PAGE_SIZE};
pub use source::{ResultSource, SqliteSource, DEFAULT_PAGE_SIZE};
pub use types::*;
