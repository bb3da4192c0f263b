//! # Tickerboard Core
//!
//! Concurrent aggregation-and-refresh engine behind the tickerboard display.
//!
//! ## Overview
//!
//! The engine keeps a live view of equities, cryptocurrencies and forex pairs:
//!
//! - **Fan-out initialization** of every configured symbol over a bounded
//!   worker pool, joined on a target that shrinks as invalid symbols drop out
//! - **Per-class staleness**: equities refresh only during the regular New York
//!   session, crypto and forex purely by elapsed time
//! - **Partial-failure tolerance**: provider errors are logged and retried on
//!   the next cycle, never propagated to the caller
//! - **Currency normalization** of displayed prices, with an hourly
//!   exchange-rate refresh
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`aggregator`] | Collections, join barrier, refresh cycles, snapshots |
//! | [`calendar`] | Trading-session policy |
//! | [`clock`] | Injectable wall clock |
//! | [`config`] | JSON configuration |
//! | [`dispatcher`] | Bounded task dispatcher |
//! | [`domain`] | Symbols, price changes, formatting |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`instrument`] | Instrument lifecycle and policies |
//! | [`provider`] | Market-data and exchange-rate providers |
//! | [`retry`] | Backoff for symbol validation |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickerboard_core::{
//!     Aggregator, Config, HttpExchangeRates, Services, SystemClock, TwelveDataProvider,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.json")?;
//!     let services = Services {
//!         market: Arc::new(TwelveDataProvider::new(config.api_key.clone())),
//!         rates: Arc::new(HttpExchangeRates::new()),
//!         clock: Arc::new(SystemClock),
//!     };
//!
//!     let mut board = Aggregator::new(config, services).await?;
//!     board.initialize().await?;
//!
//!     for view in board.snapshot().instruments() {
//!         println!("{} {:?}", view.symbol, view.price);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! The engine never terminates the process. Fatal conditions (a missing or
//! short API key, a symbol that cannot be verified) come back from
//! [`Aggregator::initialize`] as a [`FatalError`]; the caller decides whether
//! to exit.
//!
//! ## Security
//!
//! - API keys are redacted from `Debug` output and never logged
//! - Every provider request carries a bounded timeout

pub mod aggregator;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod instrument;
pub mod provider;
pub mod retry;

pub use aggregator::{Aggregator, Services, Snapshot, UpdateCycle, EXCHANGE_RATE_TTL};

pub use calendar::MarketCalendar;

pub use clock::{Clock, ManualClock, SystemClock};

pub use config::{Config, API_KEY_ENV};

pub use dispatcher::{pool_size_for, Dispatcher};

pub use domain::{PriceChange, Symbol, UNDEFINED_PERCENTAGE};

pub use error::{CoreError, FatalError, ValidationError};

pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

pub use instrument::{
    CredentialPolicy, FetchContext, Instrument, InstrumentKind, InstrumentView, StalenessPolicy,
    UpdateOutcome, MIN_API_KEY_LEN,
};

pub use provider::{
    ExchangeRateProvider, FixedExchangeRate, FixtureListing, FixtureMarketData, HttpExchangeRates,
    MarketDataProvider, ProviderCall, RequestBudget, SourceError, SourceErrorKind,
    TwelveDataProvider, TWELVEDATA_FREE_TIER_PER_MINUTE,
};

pub use retry::{Backoff, RetryConfig};
