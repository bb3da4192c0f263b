//! Built-in data for `--mock`.

use tickerboard_core::{Config, FixedExchangeRate, FixtureListing, FixtureMarketData, InstrumentKind};

/// Placeholder credential; the demo providers never check it.
pub const MOCK_API_KEY: &str = "mock-mock-mock-mock-mock-mock-00";

const LISTINGS: &[(&str, InstrumentKind, &str, f64, f64)] = &[
    ("AAPL", InstrumentKind::Equity, "Apple Inc", 179.66, 181.42),
    ("MSFT", InstrumentKind::Equity, "Microsoft Corp", 415.50, 411.20),
    ("TSLA", InstrumentKind::Equity, "Tesla Inc", 175.22, 180.01),
    ("BTC/USD", InstrumentKind::Crypto, "Bitcoin", 62_850.00, 64_120.55),
    ("ETH/USD", InstrumentKind::Crypto, "Ethereum", 3_410.10, 3_380.75),
    ("EUR/USD", InstrumentKind::ForexPair, "Euro/US Dollar", 1.0842, 1.0857),
    ("GBP/USD", InstrumentKind::ForexPair, "British Pound/US Dollar", 1.2655, 1.2631),
];

pub fn market() -> FixtureMarketData {
    LISTINGS
        .iter()
        .fold(FixtureMarketData::new(), |market, &(symbol, kind, name, close, price)| {
            market.with_listing(symbol, FixtureListing::new(kind, name, close, price))
        })
}

pub fn rates(currency: &str) -> FixedExchangeRate {
    let rate = match currency.to_ascii_uppercase().as_str() {
        "EUR" => 0.92,
        "GBP" => 0.79,
        "CAD" => 1.35,
        "JPY" => 151.2,
        _ => 1.0,
    };
    FixedExchangeRate::new(rate)
}

/// Every demo listing on a board refreshed every 30 seconds.
pub fn config() -> Config {
    let symbols = |wanted: InstrumentKind| {
        LISTINGS
            .iter()
            .filter(|(_, kind, ..)| *kind == wanted)
            .map(|(symbol, ..)| String::from(*symbol))
            .collect::<Vec<_>>()
    };

    Config {
        stocks: symbols(InstrumentKind::Equity),
        cryptos: symbols(InstrumentKind::Crypto),
        forex: symbols(InstrumentKind::ForexPair),
        update_rate: 30,
        api_key: Some(String::from(MOCK_API_KEY)),
        ..Config::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickerboard_core::MIN_API_KEY_LEN;

    #[test]
    fn demo_board_covers_every_listing() {
        let config = config();

        assert_eq!(config.total_instruments(), LISTINGS.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mock_key_passes_the_credential_check() {
        assert!(MOCK_API_KEY.len() >= MIN_API_KEY_LEN);
    }
}
