//! CLI argument definitions for tickerboard.
//!
//! # Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | `config.json` | JSON board configuration |
//! | `--mock` | `false` | Use in-memory demo providers instead of the network |
//! | `--once` | `false` | Initialize, render one snapshot and exit |
//! | `--format` | `table` | Output format (table, json) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--tick-ms` | `1000` | Refresh-loop tick in ms |
//! | `--log-level` | `RUST_LOG` or `info` | Log filter directive |
//!
//! # Examples
//!
//! ```bash
//! # Live board from config.json
//! TICKERBOARD_API_KEY=... tickerboard
//!
//! # Offline demo, one JSON snapshot
//! tickerboard --mock --once --format json --pretty
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Live board of stocks, cryptocurrencies and forex pairs.
#[derive(Debug, Parser)]
#[command(
    name = "tickerboard",
    author,
    version,
    about = "Live board of stocks, cryptocurrencies and forex pairs"
)]
pub struct Cli {
    /// Path to the JSON board configuration.
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Serve prices from built-in demo data instead of Twelve Data.
    ///
    /// When the config file does not exist a demo board is used.
    #[arg(long, default_value_t = false)]
    pub mock: bool,

    /// Render a single snapshot after initialization and exit.
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Output format for snapshots.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// Refresh-loop tick in milliseconds.
    #[arg(long, default_value_t = 1_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// Log filter directive (e.g. `debug`, `tickerboard_core=trace`).
    /// Falls back to `RUST_LOG`, then `info`.
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_a_live_table() {
        let cli = Cli::try_parse_from(["tickerboard"]).expect("defaults parse");

        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.tick_ms, 1_000);
        assert!(!cli.mock && !cli.once);
    }

    #[test]
    fn parses_mock_json_once() {
        let cli = Cli::try_parse_from([
            "tickerboard",
            "--mock",
            "--once",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("flags parse");

        assert!(cli.mock && cli.once);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn zero_tick_is_rejected() {
        assert!(Cli::try_parse_from(["tickerboard", "--tick-ms", "0"]).is_err());
    }
}
