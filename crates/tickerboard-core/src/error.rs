use thiserror::Error;

use crate::instrument::InstrumentKind;
use crate::provider::SourceError;

/// Validation and contract errors exposed by `tickerboard-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII alphanumeric character: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("currency must be a 3-letter uppercase ISO code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("update_rate must be at least one second")]
    ZeroUpdateRate,
    #[error("request_timeout_ms must be greater than zero")]
    ZeroRequestTimeout,
    #[error("requests_per_minute must be greater than zero")]
    ZeroRequestQuota,
    #[error("format string for '{field}' cannot be empty")]
    EmptyFormat { field: &'static str },
    #[error("format string for '{field}' is not a valid strftime pattern: '{value}'")]
    InvalidFormat { field: &'static str, value: String },
}

/// Failures that stop initialization outright.
///
/// The engine never exits the process on its own; these are handed to the
/// top-level caller, which decides what to do with them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error(
        "{kind} '{symbol}' requires a provider API key of at least {min_len} characters; \
         a free key is available at twelvedata.com/register"
    )]
    Configuration {
        kind: InstrumentKind,
        symbol: String,
        min_len: usize,
    },

    #[error("could not verify {kind} '{symbol}' after {attempts} attempt(s): {source}")]
    Validation {
        kind: InstrumentKind,
        symbol: String,
        attempts: u32,
        #[source]
        source: SourceError,
    },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("exchange rate for '{currency}' unavailable: {source}")]
    ExchangeRate {
        currency: String,
        #[source]
        source: SourceError,
    },

    #[error("failed to read config '{path}': {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Serialization(#[from] serde_json::Error),
}
