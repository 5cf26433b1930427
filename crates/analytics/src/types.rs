//! Types for the dashboard analytics

use crate::parse::{parse_count, parse_dollar, parse_metric, parse_percentage};
use serde::{Deserialize, Serialize};

pub use persistence::repository::StrategyResult;

/// A metric a result set can be ranked or sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Pnl,
    /// Ranked by magnitude, sign is ignored
    MaxDrawdown,
    WinRate,
    ProfitFactor,
    BuyHold,
    NetProfit,
    SharpeRatio,
    SortinoRatio,
    Trades,
}

/// Timeframe-best ranking used by the timeframe stats view
pub const RANK_BY_PROFIT_FACTOR: Metric = Metric::ProfitFactor;
/// Coin × timeframe ranking used by the matrix view
pub const RANK_BY_PNL: Metric = Metric::Pnl;

impl Metric {
    /// Accepts the record column name or the metric name (`max_dd` / `max_drawdown`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "pnl" => Some(Self::Pnl),
            "max_dd" | "max_drawdown" => Some(Self::MaxDrawdown),
            "win_rate" => Some(Self::WinRate),
            "profit_factor" => Some(Self::ProfitFactor),
            "buy_hold" => Some(Self::BuyHold),
            "net_profit_all" | "net_profit" => Some(Self::NetProfit),
            "sharpe_ratio" | "sharpe" => Some(Self::SharpeRatio),
            "sortino_ratio" | "sortino" => Some(Self::SortinoRatio),
            "trades" => Some(Self::Trades),
            _ => None,
        }
    }

    pub fn value(&self, metrics: &MetricValues) -> f64 {
        match self {
            Self::Pnl => metrics.pnl,
            Self::MaxDrawdown => metrics.drawdown_magnitude(),
            Self::WinRate => metrics.win_rate,
            Self::ProfitFactor => metrics.profit_factor,
            Self::BuyHold => metrics.buy_hold,
            Self::NetProfit => metrics.net_profit,
            Self::SharpeRatio => metrics.sharpe_ratio,
            Self::SortinoRatio => metrics.sortino_ratio,
            Self::Trades => metrics.trades as f64,
        }
    }
}

/// Numeric view of a result's metric strings, parsed once at ingestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    pub pnl: f64,
    /// Signed as stored; sources disagree on the sign convention
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub buy_hold: f64,
    pub net_profit: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub trades: i64,
}

impl MetricValues {
    pub fn from_result(result: &StrategyResult) -> Self {
        Self {
            pnl: parse_percentage(result.pnl.as_deref()),
            max_drawdown: parse_percentage(result.max_dd.as_deref()),
            win_rate: parse_percentage(result.win_rate.as_deref()),
            profit_factor: parse_metric(result.profit_factor.as_deref()),
            buy_hold: parse_percentage(result.buy_hold.as_deref()),
            net_profit: parse_dollar(result.net_profit_all.as_deref()),
            sharpe_ratio: parse_metric(result.sharpe_ratio.as_deref()),
            sortino_ratio: parse_metric(result.sortino_ratio.as_deref()),
            trades: parse_count(result.trades.as_deref()),
        }
    }

    pub fn drawdown_magnitude(&self) -> f64 {
        self.max_drawdown.abs()
    }
}

/// A stored result together with its parsed metrics.
/// Serializes as the raw record fields plus a `metrics` object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedResult {
    #[serde(flatten)]
    pub result: StrategyResult,
    pub metrics: MetricValues,
}

impl AnalyzedResult {
    pub fn new(result: StrategyResult) -> Self {
        let metrics = MetricValues::from_result(&result);
        Self { result, metrics }
    }
}

impl From<StrategyResult> for AnalyzedResult {
    fn from(result: StrategyResult) -> Self {
        Self::new(result)
    }
}

/// Summary of all runs on one timeframe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeframeStats {
    pub timeframe: String,
    pub total_runs: usize,
    /// Parsed PnL of `best_config`
    pub best_pnl: f64,
    pub best_config: AnalyzedResult,
    /// Mean over strictly positive win rates (0 when none)
    pub avg_win_rate: f64,
    /// Mean over strictly positive profit factors (0 when none)
    pub avg_profit_factor: f64,
}

/// Best run for one (ticker, timeframe) cell; `best_strategy` is `None` for an empty cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoinTimeframeBest {
    pub ticker: String,
    pub timeframe: String,
    pub best_strategy: Option<AnalyzedResult>,
    pub total_tested: usize,
}

/// Headline numbers over a result set
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_runs: usize,
    pub profitable_runs: usize,
    pub profitable_pct: f64,
    pub avg_pnl: f64,
    pub avg_win_rate: f64,
    pub avg_profit_factor: f64,
    pub avg_max_drawdown: f64,
    pub best_pnl: f64,
    pub worst_pnl: f64,
}

/// One page of a larger result set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}
