//! CLI argument definitions for Stockwatch.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `favorites` | Show the server-authoritative watch-list |
//! | `add` | Add a symbol to the watch-list |
//! | `remove` | Remove a symbol from the watch-list |
//! | `sync` | Reconcile local and server watch-lists |
//! | `history` | Weekly market cap or turnover series |
//! | `search` | Search instruments by keyword |
//! | `hot` | Trending instruments |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--base-url` | `$STOCKWATCH_BASE_URL` | Service root URL |
//! | `--service` | `$STOCKWATCH_SERVICE` | Service name sent with every request |
//! | `--state-file` | `stockwatch-state.json` | Local watch-list and sync state |
//! | `--timeout-ms` | `3000` | Per-attempt timeout in ms |
//! | `--format` | `json` | Output format (json, ndjson) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! stockwatch add 600519.SH --name "Kweichow Moutai"
//! stockwatch history 00700 --period 5y --pretty
//! stockwatch search "ping an" --format ndjson
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use stockwatch_core::Period;

/// Stockwatch - watch-list and chart data from the command line
#[derive(Debug, Parser)]
#[command(
    name = "stockwatch",
    author,
    version,
    about = "Watch-list and chart data CLI",
    long_about = "Stockwatch talks to the stock service through a cached, coalescing client.\n\
\n\
  • Optimistic watch-list edits with rollback on failure\n\
  • One-time migration of locally saved favorites\n\
  • Weekly market cap and turnover history\n\
\n\
Set RUST_LOG=debug to see retries, cache hits and telemetry on stderr."
)]
pub struct Cli {
    /// Service root URL.
    #[arg(
        long,
        global = true,
        env = "STOCKWATCH_BASE_URL",
        default_value = "http://localhost:8080"
    )]
    pub base_url: String,

    /// Service name sent in the X-WX-SERVICE header.
    #[arg(long, global = true, env = "STOCKWATCH_SERVICE")]
    pub service: Option<String>,

    /// JSON file holding the local watch-list and sync state.
    #[arg(long, global = true, default_value = "stockwatch-state.json")]
    pub state_file: PathBuf,

    /// Per-attempt request timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 3000)]
    pub timeout_ms: u64,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON envelope.
    Json,
    /// One JSON line per element of an array payload.
    Ndjson,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the watch-list, reconciling with the server first when needed.
    Favorites,

    /// Add a symbol to the watch-list.
    ///
    /// # Examples
    ///
    ///   stockwatch add 000001.SZ
    ///   stockwatch add AAPL --name Apple
    Add(AddArgs),

    /// Remove a symbol from the watch-list.
    Remove(RemoveArgs),

    /// Upload local-only favorites and adopt the server list.
    Sync,

    /// Weekly history for a symbol, oldest first.
    ///
    /// # Examples
    ///
    ///   stockwatch history 600519
    ///   stockwatch history 00700.HK --period 3y --turnover
    History(HistoryArgs),

    /// Search instruments by code or name.
    Search(SearchArgs),

    /// Trending instruments.
    Hot,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Symbol, optionally with a market suffix (e.g. 600519.SH).
    pub symbol: String,

    /// Display name stored with the entry.
    #[arg(long, default_value = "")]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub symbol: String,

    /// Window: 1y, 3y, 5y, 10y or max.
    #[arg(long, default_value = "1y")]
    pub period: Period,

    /// Fetch turnover instead of market capitalisation.
    #[arg(long, default_value_t = false)]
    pub turnover: bool,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Free-form keyword (code or company name).
    pub keyword: String,

    /// Maximum number of results to print.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
