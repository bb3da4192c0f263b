//! Per-class policies: which instruments need a provider credential, and when
//! a price is worth re-fetching.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::InstrumentKind;
use crate::calendar::MarketCalendar;
use crate::FatalError;

/// Shortest API key the provider hands out.
pub const MIN_API_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Quote endpoints are authenticated with an API key.
    ApiKey { min_len: usize },
    NotRequired,
}

impl CredentialPolicy {
    pub const fn for_kind(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Equity | InstrumentKind::Crypto => Self::ApiKey {
                min_len: MIN_API_KEY_LEN,
            },
            InstrumentKind::ForexPair => Self::NotRequired,
        }
    }

    pub fn check(
        self,
        kind: InstrumentKind,
        symbol: &str,
        api_key: Option<&str>,
    ) -> Result<(), FatalError> {
        let Self::ApiKey { min_len } = self else {
            return Ok(());
        };

        let present = api_key.map_or(0, |key| key.trim().chars().count());
        if present < min_len {
            return Err(FatalError::Configuration {
                kind,
                symbol: symbol.to_owned(),
                min_len,
            });
        }

        Ok(())
    }
}

/// When a populated instrument's price should be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessPolicy {
    /// Only during the exchange's regular session, then by elapsed time.
    TradingHours(MarketCalendar),
    /// Purely by elapsed time.
    Continuous,
}

impl StalenessPolicy {
    pub fn for_kind(kind: InstrumentKind, calendar: MarketCalendar) -> Self {
        match kind {
            InstrumentKind::Equity => Self::TradingHours(calendar),
            InstrumentKind::Crypto | InstrumentKind::ForexPair => Self::Continuous,
        }
    }

    pub fn is_stale(
        &self,
        last_updated: DateTime<Utc>,
        now: DateTime<Utc>,
        update_rate: Duration,
    ) -> bool {
        match self {
            Self::TradingHours(calendar) => {
                calendar.requires_freshness(now) && elapsed_at_least(last_updated, now, update_rate)
            }
            Self::Continuous => elapsed_at_least(last_updated, now, update_rate),
        }
    }
}

/// `now - since >= interval`; a clock that went backwards is never stale.
pub(crate) fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> bool {
    (now - since)
        .to_std()
        .map(|elapsed| elapsed >= interval)
        .unwrap_or(false)
}
