//! Hosted table store client (PostgREST-style `/rest/v1/{table}` endpoints)
//!
//! Backtest rows are spread over one table per ticker/timeframe. The table
//! list is either configured or discovered by checking candidate names.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::source::{ResultSource, DEFAULT_PAGE_SIZE};
use crate::types::StrategyResult;

pub const DEFAULT_TABLE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Row cap per request; PostgREST deployments commonly refuse larger pages
pub const MAX_REST_PAGE_SIZE: i64 = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TABLES_KEY: &str = "tables";

/// Per-ticker tables without a timeframe in the name
const SPECIAL_SUFFIXES: [&str; 2] = ["fixed_settings", "alex_settings"];

/// Which tables hold results
#[derive(Debug, Clone, PartialEq)]
pub enum TableSelection {
    Fixed(Vec<String>),
    /// Check `{ticker}_{tf}_results` and `{ticker}_{tf}_settings` for every
    /// pair, plus `{ticker}_fixed_settings` and `{ticker}_alex_settings`
    Discover {
        tickers: Vec<String>,
        timeframes: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct TableStoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub tables: TableSelection,
    pub page_size: i64,
    pub table_cache_ttl: Duration,
}

/// `"BTC/USDT"` → `"btc_usdt"`
pub fn ticker_slug(ticker: &str) -> String {
    ticker
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Candidate table names, in lookup order
pub fn candidate_tables(tickers: &[String], timeframes: &[String]) -> Vec<String> {
    let mut tables = Vec::new();
    for ticker in tickers {
        let slug = ticker_slug(ticker);
        for tf in timeframes {
            tables.push(format!("{}_{}_results", slug, tf));
            tables.push(format!("{}_{}_settings", slug, tf));
        }
        for suffix in SPECIAL_SUFFIXES {
            tables.push(format!("{}_{}", slug, suffix));
        }
    }
    tables
}

/// Outcome of checking one candidate table
#[derive(Debug)]
enum TableCheck {
    Present,
    /// The store answered and the table does not exist
    Absent,
    /// Transport error or an unexpected status; existence is unknown
    Failed(anyhow::Error),
}

/// Rows that do not fit `StrategyResult` are dropped, not fatal for the page
fn decode_rows(table: &str, raw: Vec<Value>) -> Vec<StrategyResult> {
    let total = raw.len();
    let rows: Vec<StrategyResult> = raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if rows.len() < total {
        warn!(table, skipped = total - rows.len(), "Dropped unreadable rows");
    }
    rows
}

pub struct TableStoreClient {
    client: Client,
    base_url: String,
    api_key: String,
    tables: TableSelection,
    page_size: i64,
    table_cache: TtlCache<&'static str, Vec<String>>,
}

impl TableStoreClient {
    pub fn new(config: TableStoreConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            tables: config.tables,
            page_size: if config.page_size > 0 {
                config.page_size.min(MAX_REST_PAGE_SIZE)
            } else {
                DEFAULT_PAGE_SIZE
            },
            table_cache: TtlCache::new(config.table_cache_ttl),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn send(&self, table: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?)
    }

    async fn get(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let resp = self.send(table, query).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Table store error {} on {}: {}", status, table, body);
        }

        Ok(resp.json().await?)
    }

    /// A missing table answers 404, or 400 on older PostgREST releases
    async fn check_table(&self, table: &str) -> TableCheck {
        let query = [("select", "id".to_string()), ("limit", "1".to_string())];
        let resp = match self.send(table, &query).await {
            Ok(resp) => resp,
            Err(e) => return TableCheck::Failed(e),
        };

        let status = resp.status();
        if status.is_success() {
            TableCheck::Present
        } else if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
            TableCheck::Absent
        } else {
            let body = resp.text().await.unwrap_or_default();
            TableCheck::Failed(anyhow::anyhow!("Table store error {} on {}: {}", status, table, body))
        }
    }

    /// Tables to read, from configuration or the discovery cache.
    ///
    /// Errors when discovery found nothing and at least one table check failed, so
    /// an unreachable store is not mistaken for an empty one. The list is
    /// cached only when every check got a definite answer.
    pub async fn tables(&self) -> Result<Vec<String>> {
        let (tickers, timeframes) = match &self.tables {
            TableSelection::Fixed(tables) => return Ok(tables.clone()),
            TableSelection::Discover {
                tickers,
                timeframes,
            } => (tickers, timeframes),
        };

        if let Some(cached) = self.table_cache.get(&TABLES_KEY) {
            debug!(tables = cached.len(), "Using cached table list");
            return Ok(cached);
        }

        let mut found = Vec::new();
        let mut failed = 0usize;
        let mut last_error = None;
        for table in candidate_tables(tickers, timeframes) {
            match self.check_table(&table).await {
                TableCheck::Present => found.push(table),
                TableCheck::Absent => debug!(table = %table, "Table not present"),
                TableCheck::Failed(e) => {
                    debug!(table = %table, error = %e, "Table check failed");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error.filter(|_| found.is_empty()) {
            return Err(e.context(format!("Table discovery failed ({} table checks errored)", failed)));
        }

        info!(tables = found.len(), failed_checks = failed, "Discovered result tables");
        if failed == 0 {
            self.table_cache.insert(TABLES_KEY, found.clone());
        }
        Ok(found)
    }

    /// Every row of one table, newest first. Paging stops at the first empty
    /// page, so a store that caps pages below `page_size` is still read fully.
    pub async fn fetch_table(&self, table: &str) -> Result<Vec<StrategyResult>> {
        let mut rows = Vec::new();
        let mut offset = 0i64;

        loop {
            let query = [
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("offset", offset.to_string()),
                ("limit", self.page_size.to_string()),
            ];
            let raw = self.get(table, &query).await?;
            if raw.is_empty() {
                break;
            }
            offset += raw.len() as i64;
            rows.extend(decode_rows(table, raw));
        }

        debug!(table, rows = rows.len(), "Fetched table");
        Ok(rows)
    }
}

#[async_trait]
impl ResultSource for TableStoreClient {
    fn name(&self) -> &str {
        "table-store"
    }

    async fn fetch_all(&self) -> Result<Vec<StrategyResult>> {
        let tables = self.tables().await?;
        let mut rows = Vec::new();
        let mut failed = 0usize;

        for table in &tables {
            match self.fetch_table(table).await {
                Ok(mut batch) => rows.append(&mut batch),
                Err(e) => {
                    warn!(table = %table, error = %e, "Skipping table");
                    failed += 1;
                }
            }
        }

        if !tables.is_empty() && failed == tables.len() {
            anyhow::bail!("All {} result tables failed to load", failed);
        }

        info!(tables = tables.len(), rows = rows.len(), "Loaded strategy results");
        Ok(rows)
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Option<StrategyResult>> {
        let query = [("select", "*".to_string()), ("id", format!("eq.{}", id))];
        for table in self.tables().await? {
            match self.get(&table, &query).await {
                Ok(raw) => {
                    if let Some(found) = decode_rows(&table, raw).into_iter().next() {
                        return Ok(Some(found));
                    }
                }
                Err(e) => warn!(table = %table, id, error = %e, "Lookup failed"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{DashboardService, DEFAULT_CACHE_TTL};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One request as the local store saw it
    #[derive(Debug, Clone)]
    struct Seen {
        table: String,
        query: HashMap<String, String>,
        /// Header block, lowercased
        headers: String,
    }

    impl Seen {
        fn param(&self, key: &str) -> Option<&str> {
            self.query.get(key).map(String::as_str)
        }
    }

    type Reply = Arc<dyn Fn(&Seen) -> (u16, String) + Send + Sync>;

    /// Minimal HTTP/1.1 server answering `/rest/v1/{table}` with canned JSON
    struct LocalStore {
        base_url: String,
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    impl LocalStore {
        async fn start(reply: impl Fn(&Seen) -> (u16, String) + Send + Sync + 'static) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let reply: Reply = Arc::new(reply);

            let log = seen.clone();
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let reply = reply.clone();
                    let log = log.clone();
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 4096];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }

                        let text = String::from_utf8_lossy(&buf).to_string();
                        let (request_line, headers) =
                            text.split_once("\r\n").unwrap_or((text.as_str(), ""));
                        let target = request_line.split_whitespace().nth(1).unwrap_or("/");
                        let (path, query) = target.split_once('?').unwrap_or((target, ""));
                        let request = Seen {
                            table: path.trim_start_matches("/rest/v1/").to_string(),
                            query: query
                                .split('&')
                                .filter_map(|kv| kv.split_once('='))
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect(),
                            headers: headers.to_lowercase(),
                        };

                        let (status, body) = reply(&request);
                        log.lock().push(request);
                        let response = format!(
                            "HTTP/1.1 {} Local\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
            });

            Self {
                base_url: format!("http://{}", addr),
                seen,
            }
        }

        fn requests(&self) -> Vec<Seen> {
            self.seen.lock().clone()
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn client(base_url: &str, tables: TableSelection, page_size: i64) -> TableStoreClient {
        TableStoreClient::new(TableStoreConfig {
            base_url: base_url.into(),
            api_key: "secret".into(),
            tables,
            page_size,
            table_cache_ttl: DEFAULT_TABLE_CACHE_TTL,
        })
        .unwrap()
    }

    fn row(id: i64) -> Value {
        json!({
            "id": id,
            "ticker": "BTC/USDT",
            "chart_tf": "2h",
            "pnl": format!("{}%", id),
            "created_at": "2024-05-01T00:00:00Z",
        })
    }

    /// Slice `ids` by the request's `offset` / `limit`, capped at `cap` rows
    fn page_of(ids: &[i64], seen: &Seen, cap: usize) -> String {
        let offset: usize = seen.param("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
        let limit: usize = seen.param("limit").and_then(|v| v.parse().ok()).unwrap_or(cap);
        let page: Vec<Value> = ids
            .iter()
            .skip(offset)
            .take(limit.min(cap))
            .map(|id| row(*id))
            .collect();
        Value::Array(page).to_string()
    }

    #[test]
    fn test_ticker_slug() {
        assert_eq!(ticker_slug("BTC/USDT"), "btc_usdt");
        assert_eq!(ticker_slug("eth_usdt"), "eth_usdt");
        assert_eq!(ticker_slug(" SOL-USDT "), "sol_usdt");
    }

    #[test]
    fn test_candidate_tables_order() {
        let tables = candidate_tables(&strings(&["BTC/USDT"]), &strings(&["2h", "4h"]));
        assert_eq!(
            tables,
            strings(&[
                "btc_usdt_2h_results",
                "btc_usdt_2h_settings",
                "btc_usdt_4h_results",
                "btc_usdt_4h_settings",
                "btc_usdt_fixed_settings",
                "btc_usdt_alex_settings",
            ])
        );
    }

    #[test]
    fn test_table_url_and_page_size_bounds() {
        let default_size = client(
            "https://store.example.com/",
            TableSelection::Fixed(strings(&["btc_usdt_2h_results"])),
            0,
        );
        assert_eq!(
            default_size.table_url("btc_usdt_2h_results"),
            "https://store.example.com/rest/v1/btc_usdt_2h_results"
        );
        assert_eq!(default_size.page_size, DEFAULT_PAGE_SIZE);

        let oversized = client("https://store.example.com", TableSelection::Fixed(vec![]), 5000);
        assert_eq!(oversized.page_size, MAX_REST_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_fixed_tables_skip_discovery() {
        let store = client("http://127.0.0.1:9", TableSelection::Fixed(strings(&["a", "b"])), 1000);
        assert_eq!(store.tables().await.unwrap(), strings(&["a", "b"]));
    }

    #[test]
    fn test_decode_rows_drops_misfits() {
        let raw = vec![
            json!({"id": 1, "ticker": "BTC/USDT", "chart_tf": "2h", "pnl": 12.5, "extra": true}),
            json!({"id": "not a number"}),
            json!({"id": 3, "ticker": null, "chart_tf": "4h", "pnl": "3%"}),
        ];
        let rows = decode_rows("t", raw);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pnl.as_deref(), Some("12.5"));
        assert_eq!(rows[1].ticker, "");
    }

    #[tokio::test]
    async fn test_fetch_table_pages_with_auth_headers() {
        let ids: Vec<i64> = (1..=5).collect();
        let local = LocalStore::start(move |seen| (200, page_of(&ids, seen, 1000))).await;
        let store = client(&local.base_url, TableSelection::Fixed(vec![]), 2);

        let rows = store.fetch_table("btc_usdt_2h_results").await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);

        let requests = local.requests();
        let offsets: Vec<&str> = requests.iter().filter_map(|r| r.param("offset")).collect();
        assert_eq!(offsets, vec!["0", "2", "4", "6"]);
        for r in &requests {
            assert_eq!(r.table, "btc_usdt_2h_results");
            assert_eq!(r.param("select"), Some("*"));
            assert_eq!(r.param("order"), Some("created_at.desc"));
            assert_eq!(r.param("limit"), Some("2"));
            assert!(r.headers.contains("apikey: secret"));
            assert!(r.headers.contains("authorization: bearer secret"));
        }
    }

    #[tokio::test]
    async fn test_fetch_table_reads_past_a_smaller_server_cap() {
        let ids: Vec<i64> = (1..=7).collect();
        // Store returns at most 3 rows whatever limit is asked for
        let local = LocalStore::start(move |seen| (200, page_of(&ids, seen, 3))).await;
        let store = client(&local.base_url, TableSelection::Fixed(vec![]), 10);

        let rows = store.fetch_table("t").await.unwrap();
        assert_eq!(rows.len(), 7);
    }

    #[tokio::test]
    async fn test_fetch_all_skips_failing_table() {
        let local = LocalStore::start(|seen| match seen.table.as_str() {
            "good" => (200, page_of(&[1, 2], seen, 1000)),
            _ => (500, r#"{"message":"boom"}"#.to_string()),
        })
        .await;
        let store = client(&local.base_url, TableSelection::Fixed(strings(&["good", "broken"])), 1000);

        let rows = store.fetch_all().await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_all_errors_when_every_table_fails() {
        let local = LocalStore::start(|_| (500, "{}".to_string())).await;
        let store = client(&local.base_url, TableSelection::Fixed(strings(&["a", "b"])), 1000);

        assert!(store.fetch_all().await.is_err());
    }

    #[tokio::test]
    async fn test_discovery_runs_once_and_caches_table_list() {
        let local = LocalStore::start(|seen| {
            let present = matches!(
                seen.table.as_str(),
                "btc_usdt_2h_results" | "btc_usdt_alex_settings"
            );
            match (present, seen.param("select")) {
                (false, _) => (404, r#"{"code":"42P01"}"#.to_string()),
                (true, Some("id")) => (200, "[]".to_string()),
                (true, _) => (200, page_of(&[1], seen, 1000)),
            }
        })
        .await;
        let store = client(
            &local.base_url,
            TableSelection::Discover {
                tickers: strings(&["BTC/USDT"]),
                timeframes: strings(&["2h"]),
            },
            1000,
        );

        let expected = strings(&["btc_usdt_2h_results", "btc_usdt_alex_settings"]);
        assert_eq!(store.tables().await.unwrap(), expected);
        assert_eq!(store.tables().await.unwrap(), expected);
        assert_eq!(store.fetch_all().await.unwrap().len(), 2);

        let checks = local
            .requests()
            .iter()
            .filter(|r| r.param("select") == Some("id"))
            .count();
        assert_eq!(checks, 4);
    }

    #[tokio::test]
    async fn test_reachable_store_without_tables_is_empty() {
        let local = LocalStore::start(|_| (404, "{}".to_string())).await;
        let store = client(
            &local.base_url,
            TableSelection::Discover {
                tickers: strings(&["ETH/USDT"]),
                timeframes: strings(&["4h"]),
            },
            1000,
        );

        assert!(store.tables().await.unwrap().is_empty());
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let store = client(
            &format!("http://{}", addr),
            TableSelection::Discover {
                tickers: strings(&["BTC/USDT"]),
                timeframes: strings(&["2h"]),
            },
            1000,
        );

        assert!(store.tables().await.is_err());
        assert!(store.fetch_all().await.is_err());
    }

    #[tokio::test]
    async fn test_outage_is_not_cached_by_dashboard() {
        let down = Arc::new(AtomicBool::new(true));
        let flag = down.clone();
        let local = LocalStore::start(move |seen| {
            if flag.load(Ordering::SeqCst) {
                return (503, r#"{"message":"unavailable"}"#.to_string());
            }
            match seen.param("select") {
                Some("id") => (200, "[]".to_string()),
                _ => (200, page_of(&[1, 2, 3], seen, 1000)),
            }
        })
        .await;
        let store = client(
            &local.base_url,
            TableSelection::Discover {
                tickers: strings(&["BTC/USDT"]),
                timeframes: strings(&["2h"]),
            },
            1000,
        );
        let service = DashboardService::new(Arc::new(store), DEFAULT_CACHE_TTL);

        assert!(service.results().await.is_empty());

        down.store(false, Ordering::SeqCst);
        // 4 candidate tables, 3 rows each
        assert_eq!(service.results().await.len(), 12);
    }

    #[tokio::test]
    async fn test_fetch_by_id_filters_each_table() {
        let local = LocalStore::start(|seen| {
            let body = if seen.table == "b" && seen.param("id") == Some("eq.42") {
                Value::Array(vec![row(42)]).to_string()
            } else {
                "[]".to_string()
            };
            (200, body)
        })
        .await;
        let store = client(&local.base_url, TableSelection::Fixed(strings(&["a", "b"])), 1000);

        let found = store.fetch_by_id(42).await.unwrap().unwrap();
        assert_eq!(found.id, 42);
        assert!(store.fetch_by_id(7).await.unwrap().is_none());

        let lookups: Vec<(String, Option<String>)> = local
            .requests()
            .iter()
            .map(|r| (r.table.clone(), r.param("id").map(String::from)))
            .collect();
        assert_eq!(
            lookups[..2],
            [
                ("a".to_string(), Some("eq.42".to_string())),
                ("b".to_string(), Some("eq.42".to_string())),
            ]
        );
    }
}
