//! Filter engine: threshold and dimension filters over a result set

use crate::types::AnalyzedResult;
use std::collections::HashMap;

/// Filter thresholds. Every field is optional; `None` means no constraint,
/// so `FilterCriteria::default()` keeps everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub ticker: Option<String>,
    pub timeframe: Option<String>,
    pub vm_id: Option<String>,
    /// Upper bound on the drawdown magnitude, in percent
    pub max_drawdown: Option<f64>,
    pub min_pnl: Option<f64>,
    pub max_pnl: Option<f64>,
    pub min_win_rate: Option<f64>,
    pub min_profit_factor: Option<f64>,
    pub min_trades: Option<i64>,
}

impl FilterCriteria {
    /// Build criteria from query parameters. Accepts snake_case and camelCase
    /// keys; empty or unreadable values are treated as absent.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| params.get(*k))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
                .map(String::from)
        };
        let number = |keys: &[&str]| {
            text(keys)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        Self {
            ticker: text(&["ticker"]),
            timeframe: text(&["timeframe", "chart_tf"]),
            vm_id: text(&["vm_id", "vmId"]),
            max_drawdown: number(&["max_drawdown", "maxDrawdown"]),
            min_pnl: number(&["min_pnl", "minPnl"]),
            max_pnl: number(&["max_pnl", "maxPnl"]),
            min_win_rate: number(&["min_win_rate", "minWinRate"]),
            min_profit_factor: number(&["min_profit_factor", "minProfitFactor"]),
            min_trades: number(&["min_trades", "minTrades"]).map(|v| v as i64),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when `record` satisfies every set threshold.
    /// Unreadable metrics were parsed to 0 and are compared as 0.
    pub fn matches(&self, record: &AnalyzedResult) -> bool {
        let r = &record.result;
        let m = &record.metrics;

        if let Some(ticker) = &self.ticker {
            if r.ticker != *ticker {
                return false;
            }
        }
        if let Some(tf) = &self.timeframe {
            if r.chart_tf != *tf {
                return false;
            }
        }
        if let Some(vm) = &self.vm_id {
            if r.vm_id.as_deref() != Some(vm.as_str()) {
                return false;
            }
        }
        if let Some(max_dd) = self.max_drawdown {
            if m.drawdown_magnitude() > max_dd {
                return false;
            }
        }
        if let Some(min_pnl) = self.min_pnl {
            if m.pnl < min_pnl {
                return false;
            }
        }
        if let Some(max_pnl) = self.max_pnl {
            if m.pnl > max_pnl {
                return false;
            }
        }
        if let Some(min_wr) = self.min_win_rate {
            if m.win_rate < min_wr {
                return false;
            }
        }
        if let Some(min_pf) = self.min_profit_factor {
            if m.profit_factor < min_pf {
                return false;
            }
        }
        if let Some(min_trades) = self.min_trades {
            if m.trades < min_trades {
                return false;
            }
        }

        true
    }
}

/// Order-preserving subsequence of `records` matching `criteria`
pub fn apply_filters(records: &[AnalyzedResult], criteria: &FilterCriteria) -> Vec<AnalyzedResult> {
    if criteria.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| criteria.matches(r))
        .cloned()
        .collect()
}
