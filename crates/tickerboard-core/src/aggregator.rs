//! The board: instrument collections, display currency and refresh cycles.
//!
//! Initialization fans out one validate-and-fetch task per configured symbol
//! through the [`Dispatcher`] and joins on a shrinking target: every task
//! either appends its instrument or lowers `valid_count`, and the join
//! completes when the number of held instruments equals `valid_count`.
//!
//! Collections and `valid_count` live behind one mutex so the join condition
//! is always read consistently. No lock is held across an `.await`: update
//! tasks work on a copy of their instrument and write it back when done.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::calendar::MarketCalendar;
use crate::clock::Clock;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::domain::validate_currency_code;
use crate::instrument::{
    elapsed_at_least, CredentialPolicy, FetchContext, Instrument, InstrumentKind, InstrumentView,
    UpdateOutcome,
};
use crate::provider::{ExchangeRateProvider, MarketDataProvider, SourceErrorKind};
use crate::retry::RetryConfig;
use crate::{CoreError, FatalError, Symbol};

/// How long a fetched exchange rate is reused.
pub const EXCHANGE_RATE_TTL: Duration = Duration::from_secs(3_600);

/// External collaborators of an [`Aggregator`].
#[derive(Clone)]
pub struct Services {
    pub market: Arc<dyn MarketDataProvider>,
    pub rates: Arc<dyn ExchangeRateProvider>,
    pub clock: Arc<dyn Clock>,
}

struct Slot {
    instrument: Mutex<Instrument>,
    in_flight: AtomicBool,
}

impl Slot {
    fn new(instrument: Instrument) -> Arc<Self> {
        Arc::new(Self {
            instrument: Mutex::new(instrument),
            in_flight: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Instrument> {
        self.instrument
            .lock()
            .expect("instrument slot should not be poisoned")
    }
}

/// Clears a slot's in-flight flag when the update task ends, panics included.
struct InFlight(Arc<Slot>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Collections {
    equities: Vec<Arc<Slot>>,
    cryptos: Vec<Arc<Slot>>,
    forex: Vec<Arc<Slot>>,
    valid_count: usize,
    fatal: Option<FatalError>,
}

impl Collections {
    fn len(&self) -> usize {
        self.equities.len() + self.cryptos.len() + self.forex.len()
    }

    fn settled(&self) -> bool {
        self.len() == self.valid_count
    }

    fn sequence_mut(&mut self, kind: InstrumentKind) -> &mut Vec<Arc<Slot>> {
        match kind {
            InstrumentKind::Equity => &mut self.equities,
            InstrumentKind::Crypto => &mut self.cryptos,
            InstrumentKind::ForexPair => &mut self.forex,
        }
    }

    fn pending(&self) -> usize {
        self.slots()
            .iter()
            .filter(|slot| !slot.lock().is_initialized())
            .count()
    }

    fn slots(&self) -> Vec<Arc<Slot>> {
        self.equities
            .iter()
            .chain(&self.cryptos)
            .chain(&self.forex)
            .cloned()
            .collect()
    }
}

/// State shared with worker tasks during initialization.
#[derive(Default)]
struct Shared {
    collections: Mutex<Collections>,
    changed: Notify,
}

impl Shared {
    fn with_target(valid_count: usize) -> Arc<Self> {
        let shared = Self::default();
        shared.lock().valid_count = valid_count;
        Arc::new(shared)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .expect("instrument collections should not be poisoned")
    }

    fn append(&self, instrument: Instrument) {
        let kind = instrument.kind();
        self.lock().sequence_mut(kind).push(Slot::new(instrument));
        self.changed.notify_one();
    }

    fn exclude(&self) {
        {
            let mut collections = self.lock();
            collections.valid_count = collections.valid_count.saturating_sub(1);
        }
        self.changed.notify_one();
    }

    fn abort(&self, fatal: FatalError) {
        self.lock().fatal.get_or_insert(fatal);
        self.changed.notify_one();
    }
}

/// Price-refresh tasks dispatched by one [`Aggregator::update`] call.
///
/// Dropping the cycle detaches the tasks; they still run to completion.
#[derive(Debug)]
pub struct UpdateCycle {
    handles: Vec<JoinHandle<UpdateOutcome>>,
    skipped: usize,
}

impl UpdateCycle {
    pub fn dispatched(&self) -> usize {
        self.handles.len()
    }

    /// Instruments skipped because their previous update was still running.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Waits for every dispatched task of this cycle.
    pub async fn settled(self) -> Vec<UpdateOutcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => error!(error = %err, "instrument update task failed"),
            }
        }
        outcomes
    }
}

/// Consistent, owned copy of the board between refresh cycles.
///
/// Only initialized instruments are listed; one still waiting for its first
/// complete fetch is held by the board but not shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub equities: Vec<InstrumentView>,
    pub cryptos: Vec<InstrumentView>,
    pub forex: Vec<InstrumentView>,
    pub valid_count: usize,
    pub currency: String,
    pub exchange_rate: f64,
    pub last_updated: DateTime<Utc>,
    pub date: String,
    pub time: String,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.equities.len() + self.cryptos.len() + self.forex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentView> {
        self.equities
            .iter()
            .chain(&self.cryptos)
            .chain(&self.forex)
    }
}

pub struct Aggregator {
    config: Config,
    currency: String,
    ctx: FetchContext,
    rates: Arc<dyn ExchangeRateProvider>,
    dispatcher: Dispatcher,
    calendar: MarketCalendar,
    validation_retry: RetryConfig,
    shared: Arc<Shared>,
    initialized: bool,
    exchange_rate: f64,
    rate_fetched_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    date: String,
    time: String,
}

impl Aggregator {
    /// Validates the config and fetches the initial exchange rate.
    ///
    /// The worker pool is sized once here from the configured instrument
    /// count.
    pub async fn new(config: Config, services: Services) -> Result<Self, CoreError> {
        config.validate()?;
        let currency = validate_currency_code(&config.currency)?;

        let exchange_rate = services
            .rates
            .rate(&currency)
            .await
            .map_err(|source| CoreError::ExchangeRate {
                currency: currency.clone(),
                source,
            })?;

        let total = config.total_instruments();
        let dispatcher = Dispatcher::for_instruments(total);
        debug!(instruments = total, pool_size = dispatcher.pool_size(), "dispatcher ready");

        let now = services.clock.now();
        let ctx = FetchContext {
            provider: services.market,
            clock: services.clock,
            country: config.country.clone(),
        };
        let shared = Shared::with_target(total);

        let mut aggregator = Self {
            config,
            currency,
            ctx,
            rates: services.rates,
            dispatcher,
            calendar: MarketCalendar::default(),
            validation_retry: RetryConfig::default(),
            shared,
            initialized: false,
            exchange_rate,
            rate_fetched_at: now,
            last_updated: now,
            date: String::new(),
            time: String::new(),
        };
        aggregator.update_clock();
        Ok(aggregator)
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_validation_retry(mut self, retry: RetryConfig) -> Self {
        self.validation_retry = retry;
        self
    }

    pub fn with_calendar(mut self, calendar: MarketCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    /// Validates and fetches every configured instrument, then waits until
    /// each one has either been added or excluded. Once it has succeeded,
    /// later calls return immediately; after a [`FatalError`] the board is
    /// empty again and a later call starts over.
    ///
    /// Invalid symbols are dropped with a warning. A missing or short API key,
    /// or a symbol that cannot be verified after retrying, aborts with a
    /// [`FatalError`]; credentials are checked before any request is made.
    pub async fn initialize(&mut self) -> Result<(), FatalError> {
        if self.initialized {
            return Ok(());
        }
        info!("initializing data");
        let requested = self.configured();

        for (kind, symbol) in &requested {
            CredentialPolicy::for_kind(*kind).check(
                *kind,
                symbol.as_str(),
                self.config.api_key.as_deref(),
            )?;
        }

        // Tasks of an aborted run keep the old state, so they cannot leak in.
        let shared = Shared::with_target(requested.len());
        self.shared = Arc::clone(&shared);

        let now = self.ctx.clock.now();
        let mut handles = Vec::with_capacity(requested.len());
        for (kind, symbol) in requested.iter().cloned() {
            let instrument = Instrument::new(
                kind,
                symbol,
                self.currency.as_str(),
                self.exchange_rate,
                self.config.update_interval(),
                now,
            )
            .with_calendar(self.calendar);
            let ctx = self.ctx.clone();
            let task_shared = Arc::clone(&shared);
            let retry = self.validation_retry.clone();

            handles.push(self.dispatcher.submit(async move {
                populate(instrument, ctx, task_shared, retry).await;
            }));
        }

        loop {
            // Registered before the check so a notification in between is kept.
            let notified = shared.changed.notified();
            {
                let collections = shared.lock();
                if let Some(fatal) = collections.fatal.clone() {
                    drop(collections);
                    handles.iter().for_each(JoinHandle::abort);
                    self.shared = Shared::with_target(requested.len());
                    error!(error = %fatal, "initialization aborted");
                    return Err(fatal);
                }
                if collections.settled() {
                    info!(
                        present = collections.len(),
                        requested = requested.len(),
                        "data initialized"
                    );
                    break;
                }
            }
            notified.await;
        }

        self.initialized = true;
        self.update_clock();
        Ok(())
    }

    /// Starts one refresh cycle.
    ///
    /// Refreshes the exchange rate when it is an hour old, propagates it to
    /// every instrument and dispatches one incremental update per instrument.
    /// Returns without waiting; `last_updated` is stamped right after
    /// dispatching.
    pub async fn update(&mut self) -> UpdateCycle {
        debug!("checking for update");
        let now = self.ctx.clock.now();
        self.refresh_exchange_rate(now).await;

        let slots = self.shared.lock().slots();
        let mut handles = Vec::with_capacity(slots.len());
        let mut skipped = 0;
        for slot in slots {
            if slot.in_flight.swap(true, Ordering::SeqCst) {
                debug!(symbol = %slot.lock().symbol(), "previous update still running");
                skipped += 1;
                continue;
            }
            slot.lock().set_exchange_rate(self.exchange_rate);

            let ctx = self.ctx.clone();
            let guard = InFlight(slot);
            handles.push(self.dispatcher.submit(async move {
                let mut working = guard.0.lock().clone();
                let outcome = working.update_at(&ctx, false, now).await;
                *guard.0.lock() = working;
                drop(guard);
                outcome
            }));
        }

        self.last_updated = self.ctx.clock.now();
        UpdateCycle { handles, skipped }
    }

    async fn refresh_exchange_rate(&mut self, now: DateTime<Utc>) {
        if !elapsed_at_least(self.rate_fetched_at, now, EXCHANGE_RATE_TTL) {
            return;
        }

        match self.rates.rate(&self.currency).await {
            Ok(rate) => {
                debug!(currency = %self.currency, rate, "exchange rate refreshed");
                self.exchange_rate = rate;
                self.rate_fetched_at = now;
            }
            Err(err) => warn!(
                currency = %self.currency,
                code = err.code(),
                "keeping cached exchange rate: {}",
                err.message()
            ),
        }
    }

    /// Recomputes the date and time strings from the configured formats.
    pub fn update_clock(&mut self) {
        let local = self.ctx.clock.now().with_timezone(&Local);
        self.date = render(&local, &self.config.date_format);
        self.time = render(&local, &self.config.clock_format);
    }

    /// Whether the caller should start another [`Self::update`].
    pub fn should_update(&self) -> bool {
        elapsed_at_least(
            self.last_updated,
            self.ctx.clock.now(),
            self.config.update_interval(),
        )
    }

    pub fn snapshot(&self) -> Snapshot {
        let collections = self.shared.lock();
        let views = |slots: &[Arc<Slot>]| -> Vec<InstrumentView> {
            slots
                .iter()
                .filter_map(|slot| {
                    let instrument = slot.lock();
                    instrument.is_initialized().then(|| instrument.view())
                })
                .collect()
        };

        Snapshot {
            equities: views(&collections.equities),
            cryptos: views(&collections.cryptos),
            forex: views(&collections.forex),
            valid_count: collections.valid_count,
            currency: self.currency.clone(),
            exchange_rate: self.exchange_rate,
            last_updated: self.last_updated,
            date: self.date.clone(),
            time: self.time.clone(),
        }
    }

    pub fn valid_count(&self) -> usize {
        self.shared.lock().valid_count
    }

    /// Instruments currently held across all three sequences, including
    /// those still waiting for their first complete fetch.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Held instruments not yet initialized, and so left out of [`Self::snapshot`].
    pub fn pending(&self) -> usize {
        self.shared.lock().pending()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn exchange_rate(&self) -> f64 {
        self.exchange_rate
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn pool_size(&self) -> usize {
        self.dispatcher.pool_size()
    }

    /// Configured instruments in sequence order. Malformed symbols are
    /// dropped here with a warning, like any other invalid instrument.
    fn configured(&self) -> Vec<(InstrumentKind, Symbol)> {
        let tagged = |kind: InstrumentKind, symbols: &[String]| {
            symbols
                .iter()
                .filter_map(move |raw| match Symbol::parse(raw) {
                    Ok(symbol) => Some((kind, symbol)),
                    Err(err) => {
                        warn!(kind = %kind, symbol = %raw, "{kind}: {raw} may not be valid: {err}");
                        None
                    }
                })
                .collect::<Vec<_>>()
        };

        let mut requested = tagged(InstrumentKind::Equity, &self.config.stocks);
        requested.extend(tagged(InstrumentKind::Crypto, &self.config.cryptos));
        requested.extend(tagged(InstrumentKind::ForexPair, &self.config.forex));
        requested
    }
}

/// Body of one initialization task: exactly one of append, exclude or abort.
async fn populate(
    mut instrument: Instrument,
    ctx: FetchContext,
    shared: Arc<Shared>,
    retry: RetryConfig,
) {
    match validate_with_retry(&instrument, &ctx, &retry).await {
        Ok(true) => {
            instrument.initial_fetch(&ctx).await;
            shared.append(instrument);
        }
        Ok(false) => {
            warn!(
                kind = %instrument.kind(),
                symbol = %instrument.symbol(),
                "{}: {} may not be valid",
                instrument.kind(),
                instrument.symbol()
            );
            shared.exclude();
        }
        Err(fatal) => shared.abort(fatal),
    }
}

async fn validate_with_retry(
    instrument: &Instrument,
    ctx: &FetchContext,
    retry: &RetryConfig,
) -> Result<bool, FatalError> {
    let mut attempt = 0;
    loop {
        match instrument.validate_symbol(ctx).await {
            Ok(valid) => return Ok(valid),
            // Quota exhaustion is a wait for budget, not a failed attempt.
            Err(err) if err.kind() == SourceErrorKind::RateLimited => {
                let delay = retry.delay_for_attempt(retry.max_retries);
                debug!(
                    symbol = %instrument.symbol(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "waiting for request budget: {}",
                    err.message()
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.retryable() && attempt < retry.max_retries => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    symbol = %instrument.symbol(),
                    attempt = attempt + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "symbol validation failed, retrying: {}",
                    err.message()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(FatalError::Validation {
                    kind: instrument.kind(),
                    symbol: instrument.symbol().as_str().to_owned(),
                    attempts: attempt + 1,
                    source,
                })
            }
        }
    }
}

fn render(now: &DateTime<Local>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() {
        out.clear();
    }
    out
}
