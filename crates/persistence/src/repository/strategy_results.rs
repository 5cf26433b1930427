//! Strategy results repository: backtest rows written upstream, read by the dashboard

use crate::{DbError, DbResult};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// Columns selected for every read, in `StrategyResult` field order
const COLUMNS: &str = "id, created_at, vm_id, ticker, exchange, date_start, date_end, chart_tf, \
     lookback, primary_speed, secondary_speed, trend_type, smoothing_type, resolutions, \
     pnl, max_dd, trades, win_rate, profit_factor, buy_hold, \
     net_profit_all, sharpe_ratio, sortino_ratio, \
     total_long_trades, total_short_trades, winning_trades_all, losing_trades_all, \
     avg_win_trade_all, avg_loss_trade_all";

/// One backtest run as stored upstream. Metric fields hold display strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct StrategyResult {
    pub id: i64,
    #[serde(deserialize_with = "text_or_empty")]
    pub created_at: String,
    #[serde(deserialize_with = "text_or_number")]
    pub vm_id: Option<String>,
    #[serde(deserialize_with = "text_or_empty")]
    pub ticker: String,
    #[serde(deserialize_with = "text_or_number")]
    pub exchange: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub date_start: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub date_end: Option<String>,
    #[serde(deserialize_with = "text_or_empty")]
    pub chart_tf: String,
    #[serde(deserialize_with = "lenient_integer")]
    pub lookback: Option<i64>,
    #[serde(deserialize_with = "text_or_number")]
    pub primary_speed: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub secondary_speed: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub trend_type: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub smoothing_type: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub resolutions: Option<String>,

    // Key metrics
    #[serde(deserialize_with = "text_or_number")]
    pub pnl: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub max_dd: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub trades: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub win_rate: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub profit_factor: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub buy_hold: Option<String>,

    // Performance metrics
    #[serde(deserialize_with = "text_or_number")]
    pub net_profit_all: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub sharpe_ratio: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub sortino_ratio: Option<String>,

    // Trade analysis
    #[serde(deserialize_with = "text_or_number")]
    pub total_long_trades: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub total_short_trades: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub winning_trades_all: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub losing_trades_all: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub avg_win_trade_all: Option<String>,
    #[serde(deserialize_with = "text_or_number")]
    pub avg_loss_trade_all: Option<String>,
}

/// Required text columns: `null` reads as empty, scalars keep their JSON text
fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_or_number(deserializer)?.unwrap_or_default())
}

/// Integer columns some writers store as text (`"20"`) or as a float (`20.0`).
/// Anything else reads as `None` instead of rejecting the row.
fn lenient_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    })
}

/// Some upstream writers emit text columns as JSON numbers or booleans; keep their JSON text.
fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Repository for backtest result rows
pub struct StrategyResultRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StrategyResultRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    fn insert_query(record: &StrategyResult) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        // id <= 0 means "not assigned yet"; let SQLite pick one
        let id = (record.id > 0).then_some(record.id);

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO strategy_results (
                id, created_at, vm_id, ticker, exchange, date_start, date_end, chart_tf,
                lookback, primary_speed, secondary_speed, trend_type, smoothing_type, resolutions,
                pnl, max_dd, trades, win_rate, profit_factor, buy_hold,
                net_profit_all, sharpe_ratio, sortino_ratio,
                total_long_trades, total_short_trades, winning_trades_all, losing_trades_all,
                avg_win_trade_all, avg_loss_trade_all
            ) VALUES (
                ?, COALESCE(NULLIF(?, ''), strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )
            "#,
        )
        .bind(id)
        .bind(&record.created_at)
        .bind(&record.vm_id)
        .bind(&record.ticker)
        .bind(&record.exchange)
        .bind(&record.date_start)
        .bind(&record.date_end)
        .bind(&record.chart_tf)
        .bind(record.lookback)
        .bind(&record.primary_speed)
        .bind(&record.secondary_speed)
        .bind(&record.trend_type)
        .bind(&record.smoothing_type)
        .bind(&record.resolutions)
        .bind(&record.pnl)
        .bind(&record.max_dd)
        .bind(&record.trades)
        .bind(&record.win_rate)
        .bind(&record.profit_factor)
        .bind(&record.buy_hold)
        .bind(&record.net_profit_all)
        .bind(&record.sharpe_ratio)
        .bind(&record.sortino_ratio)
        .bind(&record.total_long_trades)
        .bind(&record.total_short_trades)
        .bind(&record.winning_trades_all)
        .bind(&record.losing_trades_all)
        .bind(&record.avg_win_trade_all)
        .bind(&record.avg_loss_trade_all)
    }

    /// Save one result (replaces an existing row with the same id)
    pub async fn save(&self, record: &StrategyResult) -> DbResult<i64> {
        let result = Self::insert_query(record).execute(self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// Save a batch of results in a single transaction. Returns rows written.
    pub async fn save_many(&self, records: &[StrategyResult]) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0usize;
        for record in records {
            let result = Self::insert_query(record).execute(&mut *tx).await?;
            written += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(written)
    }

    /// One page of results, newest first
    pub async fn fetch_page(&self, limit: i64, offset: i64) -> DbResult<Vec<StrategyResult>> {
        if limit <= 0 || offset < 0 {
            return Err(DbError::Query(format!(
                "invalid page bounds: limit={limit} offset={offset}"
            )));
        }

        let sql = format!(
            "SELECT {COLUMNS} FROM strategy_results ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let records = sqlx::query_as::<_, StrategyResult>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool)
            .await?;

        Ok(records)
    }

    /// Every result, read page by page until a short page comes back
    pub async fn fetch_all(&self, page_size: i64) -> DbResult<Vec<StrategyResult>> {
        let mut all = Vec::new();
        let mut offset = 0i64;

        loop {
            let page = self.fetch_page(page_size, offset).await?;
            let fetched = page.len() as i64;
            all.extend(page);

            if fetched < page_size {
                break;
            }
            offset += page_size;
        }

        debug!(rows = all.len(), "Loaded all strategy results");
        Ok(all)
    }

    /// Get a single result by id
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<StrategyResult>> {
        let sql = format!("SELECT {COLUMNS} FROM strategy_results WHERE id = ?");
        let record = sqlx::query_as::<_, StrategyResult>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(record)
    }

    /// Total number of stored results
    pub async fn count(&self) -> DbResult<i64> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM strategy_results")
            .fetch_one(self.pool)
            .await?;

        Ok(total)
    }
}
