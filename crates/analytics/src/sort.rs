//! Sorting and pagination of result sets

use crate::types::{AnalyzedResult, Metric, Page};
use chrono::{DateTime, NaiveDateTime};
use std::cmp::Reverse;

/// Largest page a caller can request
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Metric(Metric),
    CreatedAt,
}

impl SortKey {
    /// Unknown or missing names fall back to PnL
    pub fn parse(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some("created_at") => Self::CreatedAt,
            Some(other) => Metric::from_name(other)
                .map(Self::Metric)
                .unwrap_or(Self::Metric(Metric::Pnl)),
            None => Self::Metric(Metric::Pnl),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(name: Option<&str>) -> Self {
        match name.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("asc") | Some("ascending") => Self::Asc,
            _ => Self::Desc,
        }
    }
}

/// Millisecond timestamp of `created_at`, if it is readable
pub fn created_at_millis(result: &AnalyzedResult) -> Option<i64> {
    let raw = result.result.created_at.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ts| ts.and_utc().timestamp_millis())
}

/// Stable in-place sort. Unreadable timestamps count as oldest.
pub fn sort_results(records: &mut [AnalyzedResult], key: SortKey, order: SortOrder) {
    match (key, order) {
        (SortKey::Metric(metric), SortOrder::Desc) => records.sort_by(|a, b| {
            metric.value(&b.metrics).total_cmp(&metric.value(&a.metrics))
        }),
        (SortKey::Metric(metric), SortOrder::Asc) => records.sort_by(|a, b| {
            metric.value(&a.metrics).total_cmp(&metric.value(&b.metrics))
        }),
        (SortKey::CreatedAt, SortOrder::Desc) => {
            records.sort_by_cached_key(|r| Reverse(created_at_millis(r)))
        }
        (SortKey::CreatedAt, SortOrder::Asc) => records.sort_by_cached_key(created_at_millis),
    }
}

/// Slice one page out of `items`. `limit` is clamped to `1..=MAX_PAGE_SIZE`.
pub fn paginate<T>(items: Vec<T>, limit: usize, offset: usize) -> Page<T> {
    let total = items.len();
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    let data: Vec<T> = items.into_iter().skip(offset).take(limit).collect();

    Page {
        data,
        total,
        limit,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrategyResult;

    fn make(id: i64, pnl: &str, max_dd: &str, created_at: &str) -> AnalyzedResult {
        AnalyzedResult::new(StrategyResult {
            id,
            pnl: Some(pnl.into()),
            max_dd: Some(max_dd.into()),
            created_at: created_at.into(),
            ..Default::default()
        })
    }

    fn ids(records: &[AnalyzedResult]) -> Vec<i64> {
        records.iter().map(|r| r.result.id).collect()
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse(None), SortKey::Metric(Metric::Pnl));
        assert_eq!(SortKey::parse(Some("created_at")), SortKey::CreatedAt);
        assert_eq!(SortKey::parse(Some("win_rate")), SortKey::Metric(Metric::WinRate));
        assert_eq!(SortKey::parse(Some("bogus")), SortKey::Metric(Metric::Pnl));
        assert_eq!(SortOrder::parse(Some("ASC")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("whatever")), SortOrder::Desc);
        assert_eq!(SortOrder::parse(None), SortOrder::Desc);
    }

    #[test]
    fn test_sort_by_pnl_is_stable() {
        let mut records = vec![
            make(1, "10%", "0", ""),
            make(2, "30%", "0", ""),
            make(3, "10%", "0", ""),
            make(4, "-5%", "0", ""),
        ];
        sort_results(&mut records, SortKey::Metric(Metric::Pnl), SortOrder::Desc);
        assert_eq!(ids(&records), vec![2, 1, 3, 4]);

        sort_results(&mut records, SortKey::Metric(Metric::Pnl), SortOrder::Asc);
        assert_eq!(ids(&records), vec![4, 1, 3, 2]);
    }

    #[test]
    fn test_sort_by_drawdown_uses_magnitude() {
        let mut records = vec![
            make(1, "0", "-30%", ""),
            make(2, "0", "5%", ""),
            make(3, "0", "\u{2212}12%", ""),
        ];
        sort_results(&mut records, SortKey::Metric(Metric::MaxDrawdown), SortOrder::Asc);
        assert_eq!(ids(&records), vec![2, 3, 1]);
    }

    #[test]
    fn test_sort_by_created_at() {
        let mut records = vec![
            make(1, "0", "0", "2024-03-01 12:00:00"),
            make(2, "0", "0", ""),
            make(3, "0", "0", "2024-03-02T00:00:00.250Z"),
        ];
        sort_results(&mut records, SortKey::CreatedAt, SortOrder::Desc);
        assert_eq!(ids(&records), vec![3, 1, 2]);

        sort_results(&mut records, SortKey::CreatedAt, SortOrder::Asc);
        assert_eq!(ids(&records), vec![2, 1, 3]);
    }

    #[test]
    fn test_paginate_bounds() {
        let items: Vec<u32> = (0..25).collect();

        let page = paginate(items.clone(), 10, 20);
        assert_eq!(page.data, vec![20, 21, 22, 23, 24]);
        assert_eq!(page.total, 25);

        let page = paginate(items.clone(), 10, 40);
        assert!(page.data.is_empty());
        assert_eq!(page.total, 25);

        let page = paginate(items.clone(), 0, 0);
        assert_eq!(page.limit, 1);
        assert_eq!(page.data, vec![0]);

        let page = paginate(items, 50_000, 0);
        assert_eq!(page.limit, MAX_PAGE_SIZE);
        assert_eq!(page.data.len(), 25);
    }
}
