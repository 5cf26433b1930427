//! Strategy Dashboard: backtest result analytics over HTTP and CLI
//!
//! Usage:
//!   strategy-dashboard serve --port 3001       Launch the JSON API
//!   strategy-dashboard import results.json     Load rows into SQLite
//!   strategy-dashboard summary --top-n 10      Print dashboard tables

mod config;

use analytics::{
    apply_filters, compute_coin_timeframe_matrix, compute_timeframe_stats, distinct_tickers,
    distinct_timeframes, paginate, performance_summary, recent_results, sort_results,
    sort_timeframes_by_duration, top_performers, AnalyzedResult, CoinTimeframeBest,
    DashboardService, FilterCriteria, Metric, ResultSource, SortKey, SortOrder, SqliteSource,
    StrategyResult, TableStoreClient, TimeframeStats, RANK_BY_PNL, RANK_BY_PROFIT_FACTOR,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use clap::{Parser, Subcommand};
use config::{Config, SourceKind};
use persistence::repository::StrategyResultRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_RESULTS_LIMIT: usize = 50;
const DEFAULT_TOP_LIMIT: usize = 20;

#[derive(Parser)]
#[command(name = "strategy-dashboard")]
#[command(about = "Analytics dashboard for strategy backtest results", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the dashboard API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3001)]
        port: u16,
    },
    /// Load a JSON array of backtest rows into the local database
    Import {
        /// Path to the JSON file
        file: String,
    },
    /// Print timeframe stats, the ticker × timeframe matrix and top performers
    Summary {
        /// Number of top performers to list
        #[arg(long, default_value_t = 10)]
        top_n: usize,
    },
}

#[derive(Clone)]
struct AppState {
    dashboard: Arc<DashboardService>,
    /// Matrix columns
    timeframes: Arc<Vec<String>>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,analytics=debug,persistence=debug,strategy_dashboard=debug")
    } else {
        EnvFilter::new("info,analytics=info,strategy_dashboard=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(config, &host, port).await?;
        }
        Commands::Import { file } => {
            cmd_import(config, &file).await?;
        }
        Commands::Summary { top_n } => {
            cmd_summary(config, top_n).await?;
        }
    }

    Ok(())
}

async fn open_database(db_path: &str) -> anyhow::Result<persistence::Database> {
    persistence::Database::new(db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })
}

/// Result source selected by `DASHBOARD_SOURCE`
async fn build_source(config: &Config) -> anyhow::Result<Arc<dyn ResultSource>> {
    match (config.source, &config.table_store) {
        (SourceKind::Rest, Some(store)) => {
            info!(url = %store.base_url, "Using hosted table store");
            Ok(Arc::new(TableStoreClient::new(store.clone())?))
        }
        (SourceKind::Rest, None) => anyhow::bail!("Table store is not configured"),
        (SourceKind::Sqlite, _) => {
            let db = open_database(&config.db_path).await?;
            info!("Database initialized: {}", config.db_path);
            Ok(Arc::new(SqliteSource::new(db.pool_clone(), config.page_size)))
        }
    }
}

// ============================================================================
// Serve command: Axum web server
// ============================================================================

async fn cmd_serve(config: Config, host: &str, port: u16) -> anyhow::Result<()> {
    info!("Strategy Dashboard v{} starting...", APP_VERSION);

    let source = build_source(&config).await?;
    let dashboard = DashboardService::new(source, config.cache_ttl);
    let source_name = dashboard.source_name().to_string();

    let state = AppState {
        dashboard: Arc::new(dashboard),
        timeframes: Arc::new(config.timeframes.clone()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/results", get(api_results))
        .route("/results/recent", get(api_recent_results))
        .route("/results/:id", get(api_result_by_id))
        .route("/top-performers", get(api_top_performers))
        .route("/timeframes", get(api_timeframes))
        .route("/timeframes/stats", get(api_timeframe_stats))
        .route("/matrix", get(api_matrix))
        .route("/summary", get(api_summary))
        .route("/tickers", get(api_tickers))
        .route("/revalidate", get(api_revalidate).post(api_revalidate))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Strategy Dashboard v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health              - Health check");
    println!("  GET  /api/results             - Filtered, sorted, paginated results");
    println!("  GET  /api/results/recent      - Newest results");
    println!("  GET  /api/results/:id         - One result");
    println!("  GET  /api/top-performers      - Highest PnL results");
    println!("  GET  /api/timeframes          - Timeframes present in the data");
    println!("  GET  /api/timeframes/stats    - Per-timeframe stats");
    println!("  GET  /api/matrix              - Best strategy per ticker × timeframe");
    println!("  GET  /api/summary             - Headline performance numbers");
    println!("  GET  /api/tickers             - Tickers present in the data");
    println!("  POST /api/revalidate          - Drop cached results");
    println!("\n  Source: {}", source_name);
    println!("  Cache TTL: {}s", config.cache_ttl.as_secs());
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Import command
// ============================================================================

async fn cmd_import(config: Config, file: &str) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)?;
    let rows: Vec<StrategyResult> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("{} is not a JSON array of results: {}", file, e))?;
    info!(file, rows = rows.len(), "Importing strategy results");

    let db = open_database(&config.db_path).await?;
    let repo = StrategyResultRepository::new(db.pool());
    let saved = repo
        .save_many(&rows)
        .await
        .map_err(|e| anyhow::anyhow!("Import failed: {}", e))?;
    let total = repo.count().await.unwrap_or_default();

    info!("Done! Imported {} rows into {} ({} total).", saved, config.db_path, total);
    Ok(())
}

// ============================================================================
// Summary command: CLI tables
// ============================================================================

async fn cmd_summary(config: Config, top_n: usize) -> anyhow::Result<()> {
    println!("\n=== Strategy Dashboard v{} ===", APP_VERSION);

    let source = build_source(&config).await?;
    let dashboard = DashboardService::new(source, config.cache_ttl);
    let results = dashboard.results().await;

    if results.is_empty() {
        println!("\nNo results found.");
        return Ok(());
    }

    let summary = performance_summary(&results);
    println!(
        "\n{} runs | {} profitable ({:.1}%) | avg PnL {:.2}% | best {:.2}% | worst {:.2}%",
        summary.total_runs,
        summary.profitable_runs,
        summary.profitable_pct,
        summary.avg_pnl,
        summary.best_pnl,
        summary.worst_pnl,
    );

    print_timeframe_stats(&compute_timeframe_stats(&results, RANK_BY_PROFIT_FACTOR));

    let tickers = distinct_tickers(&results);
    let matrix = compute_coin_timeframe_matrix(&results, &tickers, &config.timeframes, RANK_BY_PNL);
    print_matrix(&matrix);

    print_top_performers(&top_performers(&results, top_n), top_n);
    Ok(())
}

fn print_timeframe_stats(stats: &[TimeframeStats]) {
    println!("\nTimeframes (best by profit factor):");
    println!(
        "  {:<6} {:>6} {:>10} {:>8} {:>8}  {}",
        "TF", "Runs", "Best PnL", "Avg WR", "Avg PF", "Best config"
    );
    println!("  {}", "-".repeat(70));
    for s in stats {
        let best = &s.best_config.result;
        println!(
            "  {:<6} {:>6} {:>9.2}% {:>7.1}% {:>8.2}  #{} {}",
            s.timeframe,
            s.total_runs,
            s.best_pnl,
            s.avg_win_rate,
            s.avg_profit_factor,
            best.id,
            best.ticker,
        );
    }
}

fn print_matrix(matrix: &[CoinTimeframeBest]) {
    println!("\nBest PnL per ticker × timeframe:");
    println!("  {:<12} {:<6} {:>10} {:>8} {:>7}", "Ticker", "TF", "PnL", "Tested", "Id");
    println!("  {}", "-".repeat(48));
    for cell in matrix {
        match &cell.best_strategy {
            Some(best) => println!(
                "  {:<12} {:<6} {:>9.2}% {:>8} {:>7}",
                cell.ticker, cell.timeframe, best.metrics.pnl, cell.total_tested, best.result.id
            ),
            None => println!(
                "  {:<12} {:<6} {:>10} {:>8} {:>7}",
                cell.ticker, cell.timeframe, "-", cell.total_tested, "-"
            ),
        }
    }
}

fn print_top_performers(results: &[AnalyzedResult], top_n: usize) {
    println!("\nTop {} Results:", results.len().min(top_n));
    println!(
        "  {:>3}  {:<12} {:<6} {:>10} {:>8} {:>7} {:>7} {:>7}",
        "#", "Ticker", "TF", "PnL", "MaxDD", "WR%", "PF", "Trades"
    );
    println!("  {}", "-".repeat(72));
    for (i, r) in results.iter().take(top_n).enumerate() {
        println!(
            "  {:>3}  {:<12} {:<6} {:>+9.2}% {:>7.2}% {:>6.1}% {:>7.2} {:>7}",
            i + 1,
            r.result.ticker,
            r.result.chart_tf,
            r.metrics.pnl,
            r.metrics.drawdown_magnitude(),
            r.metrics.win_rate,
            r.metrics.profit_factor,
            r.metrics.trades,
        );
    }
}

// ============================================================================
// API Handlers
// ============================================================================

fn usize_param(params: &HashMap<String, String>, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn rank_param(params: &HashMap<String, String>, default: Metric) -> Metric {
    params
        .get("rank_by")
        .and_then(|s| Metric::from_name(s))
        .unwrap_or(default)
}

/// Cached result set narrowed by the request's filter params
async fn filtered(state: &AppState, params: &HashMap<String, String>) -> Vec<AnalyzedResult> {
    let results = state.dashboard.results().await;
    apply_filters(&results, &FilterCriteria::from_params(params))
}

/// GET /api/health
async fn api_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "strategy-dashboard",
        "version": APP_VERSION,
        "source": state.dashboard.source_name(),
    }))
}

/// GET /api/results: filtered, sorted and paginated results
async fn api_results(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let limit = usize_param(&params, "limit", DEFAULT_RESULTS_LIMIT);
    let offset = usize_param(&params, "offset", 0);
    let key = SortKey::parse(params.get("sort_by").map(|s| s.as_str()));
    let order = SortOrder::parse(params.get("order").map(|s| s.as_str()));

    let mut results = filtered(&state, &params).await;
    sort_results(&mut results, key, order);
    let page = paginate(results, limit, offset);

    Json(serde_json::json!({
        "success": true,
        "data": page.data,
        "total": page.total,
        "limit": page.limit,
        "offset": page.offset,
    }))
}

/// GET /api/results/recent: newest results first
async fn api_recent_results(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let limit = usize_param(&params, "limit", DEFAULT_RESULTS_LIMIT);
    let results = state.dashboard.results().await;
    let recent = recent_results(&results, limit);

    Json(serde_json::json!({
        "success": true,
        "data": recent,
        "total": recent.len(),
    }))
}

/// GET /api/results/:id: one result with its parsed metrics
async fn api_result_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.dashboard.find(id).await {
        Some(result) => Ok(Json(serde_json::json!({
            "success": true,
            "data": result,
        }))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "success": false,
                "error": format!("Strategy result {} not found", id),
            })),
        )),
    }
}

/// GET /api/top-performers: highest PnL first
async fn api_top_performers(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let limit = usize_param(&params, "limit", DEFAULT_TOP_LIMIT);
    let results = filtered(&state, &params).await;
    let top = top_performers(&results, limit);

    Json(serde_json::json!({
        "success": true,
        "data": top,
        "total": top.len(),
    }))
}

/// GET /api/timeframes: timeframes present in the data, shortest first
async fn api_timeframes(State(state): State<AppState>) -> Json<serde_json::Value> {
    let results = state.dashboard.results().await;
    let mut timeframes = distinct_timeframes(&results);
    sort_timeframes_by_duration(&mut timeframes);

    Json(serde_json::json!({
        "success": true,
        "data": timeframes,
    }))
}

/// GET /api/timeframes/stats: per-timeframe stats, best run by `rank_by`
async fn api_timeframe_stats(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let rank = rank_param(&params, RANK_BY_PROFIT_FACTOR);
    let results = filtered(&state, &params).await;
    let stats = compute_timeframe_stats(&results, rank);

    Json(serde_json::json!({
        "success": true,
        "rank_by": rank,
        "data": stats,
    }))
}

/// GET /api/matrix: best run per ticker × configured timeframe
async fn api_matrix(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let rank = rank_param(&params, RANK_BY_PNL);
    let results = filtered(&state, &params).await;
    let tickers = distinct_tickers(&results);
    let matrix = compute_coin_timeframe_matrix(&results, &tickers, &state.timeframes, rank);

    Json(serde_json::json!({
        "success": true,
        "rank_by": rank,
        "tickers": tickers,
        "timeframes": state.timeframes.as_slice(),
        "data": matrix,
    }))
}

/// GET /api/summary: headline numbers over the filtered set
async fn api_summary(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let results = filtered(&state, &params).await;

    Json(serde_json::json!({
        "success": true,
        "summary": performance_summary(&results),
    }))
}

/// GET /api/tickers
async fn api_tickers(State(state): State<AppState>) -> Json<serde_json::Value> {
    let results = state.dashboard.results().await;

    Json(serde_json::json!({
        "success": true,
        "data": distinct_tickers(&results),
    }))
}

/// GET|POST /api/revalidate: drop cached results so the next read refetches
async fn api_revalidate(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.dashboard.invalidate();

    Json(serde_json::json!({
        "success": true,
        "revalidated": true,
        "now": chrono::Utc::now().timestamp_millis(),
    }))
}
