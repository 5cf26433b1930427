//! Database schema definitions

/// SQL to create all tables
/// NOTE: metrics are stored as TEXT exactly as the backtester formatted them ("45.20%", "$1,234.56")
pub const CREATE_TABLES: &str = r#"
-- Backtest results, one row per strategy run
CREATE TABLE IF NOT EXISTS strategy_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    ticker TEXT NOT NULL,
    exchange TEXT,
    date_start TEXT,
    date_end TEXT,
    chart_tf TEXT NOT NULL,
    lookback INTEGER,
    primary_speed TEXT,
    secondary_speed TEXT,
    trend_type TEXT,
    smoothing_type TEXT,
    resolutions TEXT,
    pnl TEXT,
    max_dd TEXT,
    trades TEXT,
    win_rate TEXT,
    profit_factor TEXT,
    buy_hold TEXT,
    net_profit_all TEXT,
    sharpe_ratio TEXT,
    sortino_ratio TEXT,
    total_long_trades TEXT,
    total_short_trades TEXT,
    winning_trades_all TEXT,
    losing_trades_all TEXT,
    avg_win_trade_all TEXT,
    avg_loss_trade_all TEXT
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_results_ticker_tf ON strategy_results(ticker, chart_tf);
CREATE INDEX IF NOT EXISTS idx_results_created ON strategy_results(created_at DESC)
"#;

/// Incremental migrations, applied after `CREATE_TABLES` on every start.
/// "duplicate column name" failures are expected once a column exists.
pub const MIGRATIONS: &[&str] = &[
    // Origin tag of the VM that produced the run
    "ALTER TABLE strategy_results ADD COLUMN vm_id TEXT",
    "CREATE INDEX IF NOT EXISTS idx_results_vm ON strategy_results(vm_id)",
];
