//! Market-data and exchange-rate provider contracts.
//!
//! The engine only talks to providers through [`MarketDataProvider`] and
//! [`ExchangeRateProvider`]. Adapters:
//!
//! | Adapter | Description |
//! |---------|-------------|
//! | [`TwelveDataProvider`] | Twelve Data REST API (quotes, names, symbol search) |
//! | [`HttpExchangeRates`] | USD base exchange rates over HTTP |
//! | [`FixtureMarketData`] / [`FixedExchangeRate`] | In-memory providers for tests and `--mock` |

mod exchange_rate;
mod fixture;
mod throttling;
mod twelvedata;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::Symbol;

pub use exchange_rate::HttpExchangeRates;
pub use fixture::{FixedExchangeRate, FixtureListing, FixtureMarketData, ProviderCall};
pub use throttling::{RequestBudget, TWELVEDATA_FREE_TIER_PER_MINUTE};
pub use twelvedata::TwelveDataProvider;

/// Boxed future returned by every provider call.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Provider-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidRequest,
    NotFound,
    Internal,
}

/// Structured provider error.
///
/// Every variant except `InvalidRequest` is transient from the engine's point
/// of view: the field stays at its previous value and the next scheduled
/// update tries again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: true,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "provider.unavailable",
            SourceErrorKind::RateLimited => "provider.rate_limited",
            SourceErrorKind::InvalidRequest => "provider.invalid_request",
            SourceErrorKind::NotFound => "provider.not_found",
            SourceErrorKind::Internal => "provider.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Market-data provider contract.
///
/// # Thread Safety
///
/// Implementations are shared by every worker task and must be `Send + Sync`.
pub trait MarketDataProvider: Send + Sync {
    /// Canonical symbol the provider resolves `symbol` to, or `None` when the
    /// provider has no match at all.
    fn symbol_search<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, Option<String>>;

    /// Close of the previous regular session.
    fn previous_close<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, f64>;

    /// Latest traded price.
    fn current_price<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, f64>;

    /// Listed company name, `None` when the symbol is not a stock in `country`.
    fn stock_name<'a>(
        &'a self,
        symbol: &'a Symbol,
        country: &'a str,
    ) -> ProviderFuture<'a, Option<String>>;

    /// Base currency name of a cryptocurrency pair (`BTC/USD` -> `Bitcoin`).
    fn crypto_name<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, String>;

    /// Human-readable forex pair (`EUR/USD` -> `Euro/US Dollar`).
    fn forex_name<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, String>;
}

/// Exchange-rate provider contract: USD -> `currency`.
pub trait ExchangeRateProvider: Send + Sync {
    fn rate<'a>(&'a self, currency: &'a str) -> ProviderFuture<'a, f64>;
}

/// Parses a provider decimal string such as `"187.42"`.
pub(crate) fn parse_decimal(field: &'static str, raw: &str) -> Result<f64, SourceError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| SourceError::internal(format!("field '{field}' is not a number: '{raw}'")))?;

    if !value.is_finite() {
        return Err(SourceError::internal(format!(
            "field '{field}' must be finite"
        )));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_retryable() {
        assert!(SourceError::unavailable("down").retryable());
        assert!(SourceError::rate_limited("slow down").retryable());
        assert!(!SourceError::invalid_request("bad").retryable());
        assert_eq!(SourceError::not_found("gone").code(), "provider.not_found");
    }

    #[test]
    fn parses_provider_decimals() {
        assert_eq!(parse_decimal("price", " 187.42 ").expect("valid"), 187.42);
        assert!(parse_decimal("price", "NaN").is_err());
        assert!(parse_decimal("price", "abc").is_err());
    }
}
