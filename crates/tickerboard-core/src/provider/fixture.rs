use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ExchangeRateProvider, MarketDataProvider, ProviderFuture, SourceError};
use crate::instrument::InstrumentKind;
use crate::Symbol;

/// Provider operation, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderCall {
    SymbolSearch,
    PreviousClose,
    CurrentPrice,
    StockName,
    CryptoName,
    ForexName,
}

/// One symbol known to [`FixtureMarketData`].
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureListing {
    pub kind: InstrumentKind,
    pub name: String,
    pub previous_close: f64,
    pub price: f64,
}

impl FixtureListing {
    pub fn new(kind: InstrumentKind, name: impl Into<String>, previous_close: f64, price: f64) -> Self {
        Self {
            kind,
            name: name.into(),
            previous_close,
            price,
        }
    }
}

/// In-memory market data with call counters and failure injection.
///
/// Symbols without a listing are unknown to `symbol_search`, which is how
/// invalid instruments are simulated. An optional latency makes every call
/// sleep first so concurrency can be observed.
#[derive(Debug, Default)]
pub struct FixtureMarketData {
    listings: Mutex<HashMap<String, FixtureListing>>,
    failing: Mutex<HashSet<ProviderCall>>,
    search_failures: Mutex<HashMap<String, (u32, SourceError)>>,
    calls: Mutex<HashMap<ProviderCall, usize>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FixtureMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(self, symbol: &str, listing: FixtureListing) -> Self {
        self.insert(symbol, listing);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, symbol: &str, listing: FixtureListing) {
        self.listings
            .lock()
            .expect("fixture listings should not be poisoned")
            .insert(symbol.to_owned(), listing);
    }

    /// Moves the current price of a listed symbol.
    pub fn set_price(&self, symbol: &str, price: f64) {
        if let Some(listing) = self
            .listings
            .lock()
            .expect("fixture listings should not be poisoned")
            .get_mut(symbol)
        {
            listing.price = price;
        }
    }

    /// Makes every subsequent `call` fail with a transient error.
    pub fn fail(&self, call: ProviderCall) {
        self.failing
            .lock()
            .expect("fixture failures should not be poisoned")
            .insert(call);
    }

    pub fn recover(&self, call: ProviderCall) {
        self.failing
            .lock()
            .expect("fixture failures should not be poisoned")
            .remove(&call);
    }

    /// Makes the next `times` symbol searches for `symbol` fail transiently.
    pub fn fail_searches(&self, symbol: &str, times: u32) {
        self.inject_search_failures(
            symbol,
            times,
            SourceError::unavailable(format!("injected search failure for '{symbol}'")),
        );
    }

    /// Makes the next `times` symbol searches for `symbol` run out of quota.
    pub fn throttle_searches(&self, symbol: &str, times: u32) {
        self.inject_search_failures(
            symbol,
            times,
            SourceError::rate_limited(format!("injected quota exhaustion for '{symbol}'")),
        );
    }

    fn inject_search_failures(&self, symbol: &str, times: u32, error: SourceError) {
        self.search_failures
            .lock()
            .expect("fixture failures should not be poisoned")
            .insert(symbol.to_owned(), (times, error));
    }

    pub fn calls(&self, call: ProviderCall) -> usize {
        self.calls
            .lock()
            .expect("fixture call counters should not be poisoned")
            .get(&call)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .expect("fixture call counters should not be poisoned")
            .values()
            .sum()
    }

    /// Highest number of provider calls observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn listing(&self, symbol: &Symbol) -> Option<FixtureListing> {
        self.listings
            .lock()
            .expect("fixture listings should not be poisoned")
            .get(symbol.as_str())
            .cloned()
    }

    async fn enter(&self, call: ProviderCall, symbol: &Symbol) -> Result<CallGuard<'_>, SourceError> {
        *self
            .calls
            .lock()
            .expect("fixture call counters should not be poisoned")
            .entry(call)
            .or_insert(0) += 1;

        let guard = CallGuard::new(&self.in_flight, &self.peak_in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self
            .failing
            .lock()
            .expect("fixture failures should not be poisoned")
            .contains(&call)
        {
            return Err(SourceError::unavailable(format!(
                "injected {call:?} failure for '{symbol}'"
            )));
        }

        if call == ProviderCall::SymbolSearch {
            let mut remaining = self
                .search_failures
                .lock()
                .expect("fixture failures should not be poisoned");
            if let Some((count, error)) = remaining.get_mut(symbol.as_str()) {
                if *count > 0 {
                    *count -= 1;
                    return Err(error.clone());
                }
            }
        }

        Ok(guard)
    }

    fn require(&self, symbol: &Symbol) -> Result<FixtureListing, SourceError> {
        self.listing(symbol)
            .ok_or_else(|| SourceError::not_found(format!("no fixture listing for '{symbol}'")))
    }
}

struct CallGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> CallGuard<'a> {
    fn new(in_flight: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MarketDataProvider for FixtureMarketData {
    fn symbol_search<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, Option<String>> {
        Box::pin(async move {
            let _guard = self.enter(ProviderCall::SymbolSearch, symbol).await?;
            Ok(self.listing(symbol).map(|_| symbol.as_str().to_owned()))
        })
    }

    fn previous_close<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, f64> {
        Box::pin(async move {
            let _guard = self.enter(ProviderCall::PreviousClose, symbol).await?;
            Ok(self.require(symbol)?.previous_close)
        })
    }

    fn current_price<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, f64> {
        Box::pin(async move {
            let _guard = self.enter(ProviderCall::CurrentPrice, symbol).await?;
            Ok(self.require(symbol)?.price)
        })
    }

    fn stock_name<'a>(
        &'a self,
        symbol: &'a Symbol,
        _country: &'a str,
    ) -> ProviderFuture<'a, Option<String>> {
        Box::pin(async move {
            let _guard = self.enter(ProviderCall::StockName, symbol).await?;
            Ok(self
                .listing(symbol)
                .filter(|listing| listing.kind == InstrumentKind::Equity)
                .map(|listing| listing.name))
        })
    }

    fn crypto_name<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let _guard = self.enter(ProviderCall::CryptoName, symbol).await?;
            self.listing(symbol)
                .filter(|listing| listing.kind == InstrumentKind::Crypto)
                .map(|listing| listing.name)
                .ok_or_else(|| SourceError::not_found(format!("no cryptocurrency '{symbol}'")))
        })
    }

    fn forex_name<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let _guard = self.enter(ProviderCall::ForexName, symbol).await?;
            self.listing(symbol)
                .filter(|listing| listing.kind == InstrumentKind::ForexPair)
                .map(|listing| listing.name)
                .ok_or_else(|| SourceError::not_found(format!("no forex pair '{symbol}'")))
        })
    }
}

/// Exchange-rate provider returning a settable constant.
#[derive(Debug)]
pub struct FixedExchangeRate {
    rate: Mutex<f64>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FixedExchangeRate {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: Mutex::new(rate),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_rate(&self, rate: f64) {
        *self
            .rate
            .lock()
            .expect("fixture rate should not be poisoned") = rate;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExchangeRateProvider for FixedExchangeRate {
    fn rate<'a>(&'a self, currency: &'a str) -> ProviderFuture<'a, f64> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::unavailable(format!(
                    "injected exchange-rate failure for '{currency}'"
                )));
            }
            Ok(*self
                .rate
                .lock()
                .expect("fixture rate should not be poisoned"))
        })
    }
}
