//! Aggregations over an in-memory result set
//!
//! Everything here is a pure function of its input slice. Results are never
//! cached or persisted; callers recompute them per request.

use crate::parse::parse_count;
use crate::sort::{sort_results, SortKey, SortOrder};
use crate::types::{AnalyzedResult, CoinTimeframeBest, Metric, PerformanceSummary, TimeframeStats};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// "Highest wins" comparator used by every dashboard ranking
pub fn higher(candidate: f64, current: f64) -> bool {
    candidate > current
}

/// Record with the extremal metric value. Ties keep the first record scanned.
/// `None` only for an empty slice.
pub fn best_by_metric<T, M, B>(records: &[T], metric: M, better: B) -> Option<&T>
where
    M: Fn(&T) -> f64,
    B: Fn(f64, f64) -> bool,
{
    let mut iter = records.iter();
    let first = iter.next()?;
    let mut best = (first, metric(first));

    for record in iter {
        let value = metric(record);
        if better(value, best.1) {
            best = (record, value);
        }
    }

    Some(best.0)
}

fn best_ranked<'a>(group: &[&'a AnalyzedResult], rank: Metric) -> Option<&'a AnalyzedResult> {
    best_by_metric(group, |r| rank.value(&r.metrics), higher).copied()
}

/// Mean of the strictly positive values, 0 when there are none
fn mean_positive(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| *v > 0.0)
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// One entry per timeframe present in `records`, best run picked by `rank`
/// (`RANK_BY_PROFIT_FACTOR` on the dashboard). Ordered by timeframe label,
/// byte-wise: "12h" sorts before "2h".
pub fn compute_timeframe_stats(records: &[AnalyzedResult], rank: Metric) -> Vec<TimeframeStats> {
    let mut groups: BTreeMap<&str, Vec<&AnalyzedResult>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.result.chart_tf.as_str())
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .filter_map(|(timeframe, group)| {
            let best = best_ranked(&group, rank)?;
            Some(TimeframeStats {
                timeframe: timeframe.to_string(),
                total_runs: group.len(),
                best_pnl: best.metrics.pnl,
                best_config: best.clone(),
                avg_win_rate: mean_positive(group.iter().map(|r| r.metrics.win_rate)),
                avg_profit_factor: mean_positive(group.iter().map(|r| r.metrics.profit_factor)),
            })
        })
        .collect()
}

/// Full ticker × timeframe grid, best run per cell picked by `rank`
/// (`RANK_BY_PNL` on the dashboard). Every pair gets a cell, including empty
/// ones. Ordered by ticker, then timeframe, both byte-wise.
pub fn compute_coin_timeframe_matrix(
    records: &[AnalyzedResult],
    tickers: &[String],
    timeframes: &[String],
    rank: Metric,
) -> Vec<CoinTimeframeBest> {
    let tickers: BTreeSet<&str> = tickers.iter().map(String::as_str).collect();
    let timeframes: BTreeSet<&str> = timeframes.iter().map(String::as_str).collect();

    let mut cells: HashMap<(&str, &str), Vec<&AnalyzedResult>> = HashMap::new();
    for record in records {
        cells
            .entry((record.result.ticker.as_str(), record.result.chart_tf.as_str()))
            .or_default()
            .push(record);
    }

    let mut matrix = Vec::with_capacity(tickers.len() * timeframes.len());
    for ticker in &tickers {
        for timeframe in &timeframes {
            let group = cells
                .get(&(*ticker, *timeframe))
                .map(Vec::as_slice)
                .unwrap_or_default();

            matrix.push(CoinTimeframeBest {
                ticker: ticker.to_string(),
                timeframe: timeframe.to_string(),
                best_strategy: best_ranked(group, rank).cloned(),
                total_tested: group.len(),
            });
        }
    }

    matrix
}

/// Headline numbers; all zero for an empty set
pub fn performance_summary(records: &[AnalyzedResult]) -> PerformanceSummary {
    if records.is_empty() {
        return PerformanceSummary::default();
    }

    let total = records.len();
    let n = total as f64;
    let profitable = records.iter().filter(|r| r.metrics.pnl > 0.0).count();
    let sum = |f: fn(&AnalyzedResult) -> f64| records.iter().map(f).sum::<f64>();

    let pnls = records.iter().map(|r| r.metrics.pnl);
    let (best_pnl, worst_pnl) = pnls.fold((f64::MIN, f64::MAX), |(best, worst), v| {
        (best.max(v), worst.min(v))
    });

    PerformanceSummary {
        total_runs: total,
        profitable_runs: profitable,
        profitable_pct: profitable as f64 / n * 100.0,
        avg_pnl: sum(|r| r.metrics.pnl) / n,
        avg_win_rate: sum(|r| r.metrics.win_rate) / n,
        avg_profit_factor: sum(|r| r.metrics.profit_factor) / n,
        avg_max_drawdown: sum(|r| r.metrics.drawdown_magnitude()) / n,
        best_pnl,
        worst_pnl,
    }
}

/// Highest PnL first, ties in input order
pub fn top_performers(records: &[AnalyzedResult], limit: usize) -> Vec<AnalyzedResult> {
    let mut ranked = records.to_vec();
    sort_results(&mut ranked, SortKey::Metric(Metric::Pnl), SortOrder::Desc);
    ranked.truncate(limit);
    ranked
}

/// Newest first; rows with an unreadable `created_at` go last
pub fn recent_results(records: &[AnalyzedResult], limit: usize) -> Vec<AnalyzedResult> {
    let mut recent = records.to_vec();
    sort_results(&mut recent, SortKey::CreatedAt, SortOrder::Desc);
    recent.truncate(limit);
    recent
}

pub fn distinct_tickers(records: &[AnalyzedResult]) -> Vec<String> {
    let set: BTreeSet<&str> = records.iter().map(|r| r.result.ticker.as_str()).collect();
    set.into_iter().map(String::from).collect()
}

pub fn distinct_timeframes(records: &[AnalyzedResult]) -> Vec<String> {
    let set: BTreeSet<&str> = records.iter().map(|r| r.result.chart_tf.as_str()).collect();
    set.into_iter().map(String::from).collect()
}

/// Hours covered by a timeframe label: "4h" -> 4, "1d" -> 24, anything else -> 0
pub fn timeframe_hours(label: &str) -> i64 {
    let label = label.trim().to_lowercase();
    if label.ends_with('h') {
        parse_count(Some(&label))
    } else if label.ends_with('d') {
        parse_count(Some(&label)) * 24
    } else {
        0
    }
}

/// Display order for timeframe labels (shortest first, stable)
pub fn sort_timeframes_by_duration(labels: &mut [String]) {
    labels.sort_by_key(|label| timeframe_hours(label));
}
