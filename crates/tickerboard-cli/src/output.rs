use std::fmt::Write as _;

use tickerboard_core::{InstrumentView, Snapshot};

use crate::cli::OutputFormat;
use crate::error::CliError;

const MISSING: &str = "-";

pub fn render(snapshot: &Snapshot, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(snapshot)?
            } else {
                serde_json::to_string(snapshot)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => print!("{}", format_table(snapshot)),
    }

    Ok(())
}

pub fn format_table(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  {}", snapshot.date, snapshot.time);
    let _ = writeln!(
        out,
        "currency: {} (rate {:.4})  instruments: {}/{}",
        snapshot.currency,
        snapshot.exchange_rate,
        snapshot.len(),
        snapshot.valid_count
    );
    let _ = writeln!(
        out,
        "{:<7} {:<10} {:<24} {:>12} {:>10} {:>9}",
        "KIND", "SYMBOL", "NAME", "PRICE", "CHANGE", "CHANGE%"
    );

    for view in snapshot.instruments() {
        let _ = writeln!(out, "{}", format_row(view));
    }

    out
}

fn format_row(view: &InstrumentView) -> String {
    let cell = |value: &Option<String>| value.as_deref().unwrap_or(MISSING).to_owned();
    let name: String = view.name.as_deref().unwrap_or(MISSING).chars().take(24).collect();

    format!(
        "{:<7} {:<10} {:<24} {:>12} {:>10} {:>9}",
        view.kind.label(),
        view.symbol,
        name,
        cell(&view.price),
        cell(&view.value_change),
        cell(&view.percentage_change)
    )
}
