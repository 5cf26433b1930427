//! Runtime configuration from environment variables (`.env` is loaded first)

use analytics::api::DEFAULT_TABLE_CACHE_TTL;
use analytics::{TableSelection, TableStoreConfig, DEFAULT_CACHE_TTL, DEFAULT_PAGE_SIZE};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_DB_PATH: &str = "data/dashboard.db";
const DEFAULT_TIMEFRAMES: &str = "2h,3h,4h,5h,6h";
const DEFAULT_TICKERS: &str = "btc_usdt,eth_usdt,sol_usdt,bnb_usdt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Sqlite,
    Rest,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceKind,
    pub db_path: String,
    pub cache_ttl: Duration,
    /// Matrix columns, and discovery timeframes for the table store
    pub timeframes: Vec<String>,
    pub page_size: i64,
    /// Set when `source` is `Rest`
    pub table_store: Option<TableStoreConfig>,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unreadable numbers fall back to their default.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        fn number<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
            match raw {
                None => default,
                Some(v) => v.parse().unwrap_or_else(|_| {
                    warn!(key, value = %v, "Invalid number, using default");
                    default
                }),
            }
        }

        let source = match text("DASHBOARD_SOURCE").map(|s| s.to_lowercase()).as_deref() {
            None | Some("sqlite") => SourceKind::Sqlite,
            Some("rest") | Some("table_store") => SourceKind::Rest,
            Some(other) => {
                anyhow::bail!("Unknown DASHBOARD_SOURCE '{}' (expected sqlite or rest)", other)
            }
        };

        let cache_ttl_secs = number(
            "DASHBOARD_CACHE_TTL_SECS",
            text("DASHBOARD_CACHE_TTL_SECS"),
            DEFAULT_CACHE_TTL.as_secs(),
        );
        let page_size = number(
            "DASHBOARD_PAGE_SIZE",
            text("DASHBOARD_PAGE_SIZE"),
            DEFAULT_PAGE_SIZE,
        );
        let page_size = if page_size > 0 {
            page_size
        } else {
            warn!(page_size, "DASHBOARD_PAGE_SIZE must be positive, using default");
            DEFAULT_PAGE_SIZE
        };
        let timeframes =
            split_list(&text("DASHBOARD_TIMEFRAMES").unwrap_or_else(|| DEFAULT_TIMEFRAMES.into()));

        let table_store = match source {
            SourceKind::Sqlite => None,
            SourceKind::Rest => {
                let base_url = text("TABLE_STORE_URL").ok_or_else(|| {
                    anyhow::anyhow!("TABLE_STORE_URL is required when DASHBOARD_SOURCE=rest")
                })?;
                let api_key = text("TABLE_STORE_KEY").ok_or_else(|| {
                    anyhow::anyhow!("TABLE_STORE_KEY is required when DASHBOARD_SOURCE=rest")
                })?;

                let tables = match text("TABLE_STORE_TABLES") {
                    Some(list) => TableSelection::Fixed(split_list(&list)),
                    None => TableSelection::Discover {
                        tickers: split_list(
                            &text("TABLE_STORE_TICKERS").unwrap_or_else(|| DEFAULT_TICKERS.into()),
                        ),
                        timeframes: timeframes.clone(),
                    },
                };
                let table_ttl = number(
                    "TABLE_STORE_CACHE_TTL_SECS",
                    text("TABLE_STORE_CACHE_TTL_SECS"),
                    DEFAULT_TABLE_CACHE_TTL.as_secs(),
                );

                Some(TableStoreConfig {
                    base_url,
                    api_key,
                    tables,
                    page_size,
                    table_cache_ttl: Duration::from_secs(table_ttl),
                })
            }
        };

        Ok(Self {
            source,
            db_path: text("DASHBOARD_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into()),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            timeframes,
            page_size,
            table_store,
        })
    }
}
