//! Board configuration.
//!
//! Read from a JSON file; every field has a default, so `{}` is a valid (if
//! empty) board. The provider API key may also come from the
//! `TICKERBOARD_API_KEY` environment variable, which takes precedence.

use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::domain::validate_currency_code;
use crate::http_client::DEFAULT_TIMEOUT_MS;
use crate::provider::TWELVEDATA_FREE_TIER_PER_MINUTE;
use crate::{CoreError, ValidationError};

pub const API_KEY_ENV: &str = "TICKERBOARD_API_KEY";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Symbols are kept as written; malformed ones are dropped with a
    /// warning when the board initializes.
    pub stocks: Vec<String>,
    pub cryptos: Vec<String>,
    pub forex: Vec<String>,
    /// Display currency (ISO 4217).
    pub currency: String,
    /// Seconds between refresh cycles.
    pub update_rate: u64,
    pub clock_format: String,
    pub date_format: String,
    pub api_key: Option<String>,
    /// Country used for equity name lookups.
    pub country: String,
    pub request_timeout_ms: u64,
    /// Provider request quota shared by every instrument.
    pub requests_per_minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stocks: Vec::new(),
            cryptos: Vec::new(),
            forex: Vec::new(),
            currency: String::from("USD"),
            update_rate: 600,
            clock_format: String::from("%-I:%M %p"),
            date_format: String::from("%b %-d, %Y"),
            api_key: None,
            country: String::from("United States"),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            requests_per_minute: TWELVEDATA_FREE_TIER_PER_MINUTE,
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("stocks", &self.stocks)
            .field("cryptos", &self.cryptos)
            .field("forex", &self.forex)
            .field("currency", &self.currency)
            .field("update_rate", &self.update_rate)
            .field("clock_format", &self.clock_format)
            .field("date_format", &self.date_format)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("country", &self.country)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

impl Config {
    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads the file, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;

        let config = Self::from_json_str(&raw)?.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_api_key_override(std::env::var(API_KEY_ENV).ok())
    }

    /// A non-blank `api_key` replaces the configured one.
    pub fn with_api_key_override(mut self, api_key: Option<String>) -> Self {
        if let Some(key) = api_key.filter(|key| !key.trim().is_empty()) {
            self.api_key = Some(key);
        }
        self
    }

    /// Checks shape only. The API key is not checked here: a missing or short
    /// key is reported per instrument when the board initializes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_currency_code(&self.currency)?;

        if self.update_rate == 0 {
            return Err(ValidationError::ZeroUpdateRate);
        }
        if self.request_timeout_ms == 0 {
            return Err(ValidationError::ZeroRequestTimeout);
        }
        if self.requests_per_minute == 0 {
            return Err(ValidationError::ZeroRequestQuota);
        }

        check_format("clock_format", &self.clock_format)?;
        check_format("date_format", &self.date_format)?;
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_rate)
    }

    pub fn total_instruments(&self) -> usize {
        self.stocks.len() + self.cryptos.len() + self.forex.len()
    }
}

fn check_format(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyFormat { field });
    }

    if StrftimeItems::new(value).any(|item| matches!(item, Item::Error)) {
        return Err(ValidationError::InvalidFormat {
            field,
            value: value.to_owned(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_uses_defaults() {
        let config = Config::from_json_str("{}").expect("empty config parses");

        assert_eq!(config.currency, "USD");
        assert_eq!(config.update_interval(), Duration::from_secs(600));
        assert_eq!(config.country, "United States");
        assert_eq!(config.total_instruments(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_instrument_lists() {
        let config = Config::from_json_str(
            r#"{"stocks":["AAPL","MSFT"],"cryptos":["BTC/USD"],"forex":["EUR/USD"],"currency":"CAD"}"#,
        )
        .expect("config parses");

        assert_eq!(config.stocks[1], "MSFT");
        assert_eq!(config.total_instruments(), 4);
    }

    #[test]
    fn malformed_symbol_does_not_reject_the_file() {
        let config = Config::from_json_str(r#"{"stocks":["$AAPL","MSFT"]}"#)
            .expect("symbols are checked per instrument");

        assert_eq!(config.stocks, vec![String::from("$AAPL"), String::from("MSFT")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn request_quota_defaults_to_the_free_tier() {
        let config = Config::from_json_str(r#"{"requests_per_minute":55}"#).expect("parses");
        let zero_quota = Config {
            requests_per_minute: 0,
            ..Config::default()
        };

        assert_eq!(Config::default().requests_per_minute, 8);
        assert_eq!(config.requests_per_minute, 55);
        assert_eq!(zero_quota.validate(), Err(ValidationError::ZeroRequestQuota));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_currency = Config {
            currency: String::from("dollars"),
            ..Config::default()
        };
        let zero_rate = Config {
            update_rate: 0,
            ..Config::default()
        };
        let bad_format = Config {
            clock_format: String::from("%Q"),
            ..Config::default()
        };

        assert!(matches!(
            bad_currency.validate(),
            Err(ValidationError::InvalidCurrency { .. })
        ));
        assert_eq!(zero_rate.validate(), Err(ValidationError::ZeroUpdateRate));
        assert!(matches!(
            bad_format.validate(),
            Err(ValidationError::InvalidFormat { field: "clock_format", .. })
        ));
    }

    #[test]
    fn short_api_key_is_not_a_config_error() {
        let config = Config {
            api_key: Some(String::from("short")),
            ..Config::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn api_key_override_wins_unless_blank() {
        let config = Config {
            api_key: Some(String::from("from-file")),
            ..Config::default()
        };

        let kept = config.clone().with_api_key_override(Some(String::from("  ")));
        let replaced = config.with_api_key_override(Some(String::from("from-env")));

        assert_eq!(kept.api_key.as_deref(), Some("from-file"));
        assert_eq!(replaced.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn debug_output_redacts_the_api_key() {
        let config = Config {
            api_key: Some(String::from("0123456789abcdef0123456789abcdef")),
            ..Config::default()
        };

        let rendered = format!("{config:?}");

        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("0123456789abcdef"));
    }

    #[test]
    fn load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"cryptos":["ETH/USD"],"update_rate":30}}"#).expect("write config");

        let config = Config::load(file.path()).expect("config loads");

        assert_eq!(config.cryptos[0], "ETH/USD");
        assert_eq!(config.update_rate, 30);
    }

    #[test]
    fn load_reports_missing_files() {
        let error = Config::load("/definitely/not/here.json").expect_err("missing file");

        assert!(matches!(error, CoreError::ConfigIo { .. }));
    }
}
