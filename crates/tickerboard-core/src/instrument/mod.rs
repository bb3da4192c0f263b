//! Tracked instruments and their fetch/update lifecycle.
//!
//! An [`Instrument`] is one of three [`InstrumentKind`]s sharing the same
//! capability set. What differs between kinds is expressed through policy
//! values ([`CredentialPolicy`], [`StalenessPolicy`]) and the name lookup
//! used on first fetch.
//!
//! Provider failures never escape an instrument: they are logged and the
//! affected field keeps its previous value, so the next scheduled update
//! simply tries again.

mod kind;
mod policy;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use crate::calendar::MarketCalendar;
use crate::clock::Clock;
use crate::domain::{format_amount, PriceChange};
use crate::provider::{MarketDataProvider, SourceError, SourceErrorKind};
use crate::{FatalError, Symbol};

pub use kind::InstrumentKind;
pub(crate) use policy::elapsed_at_least;
pub use policy::{CredentialPolicy, StalenessPolicy, MIN_API_KEY_LEN};

/// Collaborators an instrument needs to talk to the outside world.
#[derive(Clone)]
pub struct FetchContext {
    pub provider: Arc<dyn MarketDataProvider>,
    pub clock: Arc<dyn Clock>,
    /// Country used for equity name lookups.
    pub country: String,
}

/// Result of one [`Instrument::incremental_update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// First fetch completed; every market attribute is populated.
    Initialized,
    /// First fetch ran but at least one field is still missing.
    Incomplete,
    Refreshed,
    /// Price refresh attempted and failed; previous price kept.
    Failed,
    /// Not stale yet, or the market is closed.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Instrument {
    kind: InstrumentKind,
    symbol: Symbol,
    currency: String,
    exchange_rate: f64,
    update_rate: Duration,
    staleness: StalenessPolicy,
    name: Option<String>,
    previous_close: Option<f64>,
    current_price: Option<f64>,
    change: Option<PriceChange>,
    initialized: bool,
    last_updated: DateTime<Utc>,
}

impl Instrument {
    pub fn new(
        kind: InstrumentKind,
        symbol: Symbol,
        currency: impl Into<String>,
        exchange_rate: f64,
        update_rate: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            symbol,
            currency: currency.into(),
            exchange_rate,
            update_rate,
            staleness: StalenessPolicy::for_kind(kind, MarketCalendar::default()),
            name: None,
            previous_close: None,
            current_price: None,
            change: None,
            initialized: false,
            last_updated: now,
        }
    }

    /// Replaces the exchange calendar used for equity gating.
    pub fn with_calendar(mut self, calendar: MarketCalendar) -> Self {
        self.staleness = StalenessPolicy::for_kind(self.kind, calendar);
        self
    }

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn previous_close(&self) -> Option<f64> {
        self.previous_close
    }

    pub fn current_price(&self) -> Option<f64> {
        self.current_price
    }

    pub fn change(&self) -> Option<PriceChange> {
        self.change
    }

    pub fn exchange_rate(&self) -> f64 {
        self.exchange_rate
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn set_exchange_rate(&mut self, rate: f64) {
        self.exchange_rate = rate;
    }

    /// Rate applied to displayed amounts.
    pub fn display_rate(&self) -> f64 {
        if self.kind.converts_currency() {
            self.exchange_rate
        } else {
            1.0
        }
    }

    pub fn validate_credential(&self, api_key: Option<&str>) -> Result<(), FatalError> {
        CredentialPolicy::for_kind(self.kind).check(self.kind, self.symbol.as_str(), api_key)
    }

    /// `Ok(true)` iff the provider's canonical symbol matches exactly.
    ///
    /// A provider `NotFound` counts as "no match"; any other provider failure
    /// is returned as-is since it says nothing about whether the symbol exists.
    pub async fn validate_symbol(&self, ctx: &FetchContext) -> Result<bool, SourceError> {
        debug!(kind = %self.kind, symbol = %self.symbol, "validating symbol");
        match ctx.provider.symbol_search(&self.symbol).await {
            Ok(canonical) => Ok(canonical.as_deref() == Some(self.symbol.as_str())),
            Err(err) if err.kind() == SourceErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Populates the name, previous close and current price.
    ///
    /// Only fields still missing are requested, so a partially failed first
    /// fetch is completed by the next call. Returns whether every market
    /// attribute is now populated.
    pub async fn initial_fetch(&mut self, ctx: &FetchContext) -> bool {
        let now = ctx.clock.now();
        self.initial_fetch_at(ctx, now).await
    }

    async fn initial_fetch_at(&mut self, ctx: &FetchContext, now: DateTime<Utc>) -> bool {
        debug!(kind = %self.kind, symbol = %self.symbol, "fetching initial data");

        if self.name.is_none() {
            match self.lookup_name(ctx).await {
                Ok(name) => self.name = Some(name),
                Err(err) => self.log_failure("name", &err),
            }
        }

        if self.previous_close.is_none() {
            match ctx.provider.previous_close(&self.symbol).await {
                Ok(close) => self.previous_close = Some(close),
                Err(err) => self.log_failure("previous close", &err),
            }
        }

        match ctx.provider.current_price(&self.symbol).await {
            Ok(price) => self.current_price = Some(price),
            Err(err) => self.log_failure("current price", &err),
        }

        self.recompute_change();
        self.initialized = self.name.is_some() && self.change.is_some();
        if self.initialized {
            self.last_updated = now;
        }
        self.initialized
    }

    /// First touch runs [`Self::initial_fetch`]; afterwards only the current
    /// price (and the derived change) is refreshed, when `force` is set or the
    /// instrument is stale.
    pub async fn incremental_update(&mut self, ctx: &FetchContext, force: bool) -> UpdateOutcome {
        let now = ctx.clock.now();
        self.update_at(ctx, force, now).await
    }

    /// [`Self::incremental_update`] judged and stamped at `now`.
    pub async fn update_at(
        &mut self,
        ctx: &FetchContext,
        force: bool,
        now: DateTime<Utc>,
    ) -> UpdateOutcome {
        if !self.initialized {
            return if self.initial_fetch_at(ctx, now).await {
                UpdateOutcome::Initialized
            } else {
                UpdateOutcome::Incomplete
            };
        }

        if !force && !self.should_update(now) {
            return UpdateOutcome::Skipped;
        }

        debug!(kind = %self.kind, symbol = %self.symbol, "refreshing price");
        match ctx.provider.current_price(&self.symbol).await {
            Ok(price) => {
                self.current_price = Some(price);
                self.recompute_change();
                self.last_updated = now;
                UpdateOutcome::Refreshed
            }
            Err(err) => {
                self.log_failure("current price", &err);
                UpdateOutcome::Failed
            }
        }
    }

    pub fn should_update(&self, now: DateTime<Utc>) -> bool {
        self.staleness
            .is_stale(self.last_updated, now, self.update_rate)
    }

    pub fn display_price(&self) -> Option<String> {
        self.current_price
            .map(|price| format_amount(price * self.display_rate()))
    }

    pub fn display_previous_close(&self) -> Option<String> {
        self.previous_close
            .map(|close| format_amount(close * self.display_rate()))
    }

    pub fn display_value_change(&self) -> Option<String> {
        self.change
            .map(|change| change.format_value(self.display_rate()))
    }

    pub fn display_percentage_change(&self) -> Option<String> {
        self.change.map(|change| change.format_percentage())
    }

    pub fn view(&self) -> InstrumentView {
        InstrumentView {
            kind: self.kind,
            symbol: self.symbol.as_str().to_owned(),
            name: self.name.clone(),
            currency: self
                .kind
                .converts_currency()
                .then(|| self.currency.clone()),
            price: self.display_price(),
            previous_close: self.display_previous_close(),
            value_change: self.display_value_change(),
            percentage_change: self.display_percentage_change(),
            last_updated: self.last_updated,
        }
    }

    async fn lookup_name(&self, ctx: &FetchContext) -> Result<String, SourceError> {
        match self.kind {
            InstrumentKind::Equity => {
                if let Some(name) = ctx.provider.stock_name(&self.symbol, &ctx.country).await? {
                    return Ok(name);
                }
                debug!(symbol = %self.symbol, "not listed as a stock, trying cryptocurrency names");
                ctx.provider.crypto_name(&self.symbol).await
            }
            InstrumentKind::Crypto => ctx.provider.crypto_name(&self.symbol).await,
            InstrumentKind::ForexPair => ctx.provider.forex_name(&self.symbol).await,
        }
    }

    fn recompute_change(&mut self) {
        if let (Some(previous_close), Some(current_price)) = (self.previous_close, self.current_price) {
            self.change = Some(PriceChange::between(previous_close, current_price));
        }
    }

    fn log_failure(&self, field: &'static str, err: &SourceError) {
        error!(
            kind = %self.kind,
            symbol = %self.symbol,
            field,
            code = err.code(),
            "unable to fetch {field}: {}",
            err.message()
        );
    }
}

/// Owned, display-ready projection of an [`Instrument`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentView {
    pub kind: InstrumentKind,
    pub symbol: String,
    pub name: Option<String>,
    /// Display currency; `None` for forex pairs, which are never converted.
    pub currency: Option<String>,
    pub price: Option<String>,
    pub previous_close: Option<String>,
    pub value_change: Option<String>,
    pub percentage_change: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::provider::{FixtureListing, FixtureMarketData, ProviderCall};
    use chrono::TimeZone;

    fn monday_session() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap()
    }

    fn context(market: Arc<FixtureMarketData>) -> FetchContext {
        FetchContext {
            provider: market,
            clock: Arc::new(ManualClock::new(monday_session())),
            country: String::from("United States"),
        }
    }

    fn crypto(rate: f64) -> Instrument {
        Instrument::new(
            InstrumentKind::Crypto,
            Symbol::parse("BTC/USD").expect("valid symbol"),
            "EUR",
            rate,
            Duration::from_secs(600),
            monday_session(),
        )
    }

    #[tokio::test]
    async fn first_update_runs_initial_fetch() {
        let market = Arc::new(FixtureMarketData::new().with_listing(
            "BTC/USD",
            FixtureListing::new(InstrumentKind::Crypto, "Bitcoin", 100.0, 110.0),
        ));
        let ctx = context(Arc::clone(&market));
        let mut instrument = crypto(1.0);

        let outcome = instrument.incremental_update(&ctx, false).await;

        assert_eq!(outcome, UpdateOutcome::Initialized);
        assert_eq!(instrument.name(), Some("Bitcoin"));
        assert_eq!(instrument.display_value_change().as_deref(), Some("10.00"));
        assert_eq!(instrument.display_percentage_change().as_deref(), Some("10.00%"));
        assert_eq!(market.calls(ProviderCall::CryptoName), 1);
    }

    #[tokio::test]
    async fn missing_fields_are_completed_on_the_next_touch() {
        let market = Arc::new(FixtureMarketData::new().with_listing(
            "BTC/USD",
            FixtureListing::new(InstrumentKind::Crypto, "Bitcoin", 100.0, 110.0),
        ));
        market.fail(ProviderCall::PreviousClose);
        let ctx = context(Arc::clone(&market));
        let mut instrument = crypto(1.0);

        assert_eq!(instrument.incremental_update(&ctx, false).await, UpdateOutcome::Incomplete);
        assert!(!instrument.is_initialized());
        assert_eq!(instrument.change(), None);

        market.recover(ProviderCall::PreviousClose);
        assert_eq!(instrument.incremental_update(&ctx, false).await, UpdateOutcome::Initialized);
        assert_eq!(market.calls(ProviderCall::CryptoName), 1);
        assert_eq!(market.calls(ProviderCall::PreviousClose), 2);
    }

    #[tokio::test]
    async fn converted_prices_follow_the_exchange_rate() {
        let market = Arc::new(FixtureMarketData::new().with_listing(
            "BTC/USD",
            FixtureListing::new(InstrumentKind::Crypto, "Bitcoin", 100.0, 110.0),
        ));
        let ctx = context(market);
        let mut instrument = crypto(0.5);

        instrument.initial_fetch(&ctx).await;

        assert_eq!(instrument.display_price().as_deref(), Some("55.00"));
        assert_eq!(instrument.display_value_change().as_deref(), Some("5.00"));
        assert_eq!(instrument.display_percentage_change().as_deref(), Some("10.00%"));
    }

    #[tokio::test]
    async fn forex_pairs_are_never_converted() {
        let market = Arc::new(FixtureMarketData::new().with_listing(
            "EUR/USD",
            FixtureListing::new(InstrumentKind::ForexPair, "Euro/US Dollar", 1.08, 1.10),
        ));
        let ctx = context(market);
        let mut instrument = Instrument::new(
            InstrumentKind::ForexPair,
            Symbol::parse("EUR/USD").expect("valid symbol"),
            "CAD",
            1.35,
            Duration::from_secs(600),
            monday_session(),
        );

        instrument.initial_fetch(&ctx).await;

        assert_eq!(instrument.display_price().as_deref(), Some("1.10"));
        assert_eq!(instrument.view().currency, None);
    }

    #[tokio::test]
    async fn unlisted_equity_falls_back_to_crypto_name() {
        let market = Arc::new(FixtureMarketData::new().with_listing(
            "BTC/USD",
            FixtureListing::new(InstrumentKind::Crypto, "Bitcoin", 100.0, 110.0),
        ));
        let ctx = context(Arc::clone(&market));
        let mut instrument = Instrument::new(
            InstrumentKind::Equity,
            Symbol::parse("BTC/USD").expect("valid symbol"),
            "USD",
            1.0,
            Duration::from_secs(600),
            monday_session(),
        );

        instrument.initial_fetch(&ctx).await;

        assert_eq!(instrument.name(), Some("Bitcoin"));
        assert_eq!(market.calls(ProviderCall::StockName), 1);
        assert_eq!(market.calls(ProviderCall::CryptoName), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_price() {
        let market = Arc::new(FixtureMarketData::new().with_listing(
            "BTC/USD",
            FixtureListing::new(InstrumentKind::Crypto, "Bitcoin", 100.0, 110.0),
        ));
        let ctx = context(Arc::clone(&market));
        let mut instrument = crypto(1.0);
        instrument.initial_fetch(&ctx).await;

        market.set_price("BTC/USD", 120.0);
        market.fail(ProviderCall::CurrentPrice);
        let outcome = instrument.incremental_update(&ctx, true).await;

        assert_eq!(outcome, UpdateOutcome::Failed);
        assert_eq!(instrument.current_price(), Some(110.0));
    }

    #[tokio::test]
    async fn zero_previous_close_yields_undefined_percentage() {
        let market = Arc::new(FixtureMarketData::new().with_listing(
            "BTC/USD",
            FixtureListing::new(InstrumentKind::Crypto, "Bitcoin", 0.0, 5.0),
        ));
        let ctx = context(market);
        let mut instrument = crypto(1.0);

        assert!(instrument.initial_fetch(&ctx).await);
        assert_eq!(instrument.display_percentage_change().as_deref(), Some("N/A"));
        assert_eq!(instrument.display_value_change().as_deref(), Some("5.00"));
    }
}
