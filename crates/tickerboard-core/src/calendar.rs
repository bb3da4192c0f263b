//! Trading-session policy for equities.
//!
//! Sessions are evaluated in the exchange's own timezone via `chrono_tz`, so
//! daylight-saving transitions are handled without any host-timezone
//! dependency. Both session boundaries are inclusive.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

const REGULAR_OPEN: NaiveTime = session_time(9, 30);
const REGULAR_CLOSE: NaiveTime = session_time(16, 0);

/// Evaluated at compile time, so an out-of-range constant fails the build.
const fn session_time(hour: u32, minute: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(time) => time,
        None => panic!("session time out of range"),
    }
}

/// Regular-session calendar for a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketCalendar {
    timezone: Tz,
    open: NaiveTime,
    close: NaiveTime,
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::new_york()
    }
}

impl MarketCalendar {
    pub fn new(timezone: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            timezone,
            open,
            close,
        }
    }

    /// US equities regular session: 09:30 to 16:00 `America/New_York`.
    pub fn new_york() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            REGULAR_OPEN,
            REGULAR_CLOSE,
        )
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Saturday or Sunday on the exchange's calendar.
    pub fn is_weekend(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Outside `open..=close` in exchange-local time.
    pub fn is_after_hours(&self, now: DateTime<Utc>) -> bool {
        let local_time = now.with_timezone(&self.timezone).time();
        local_time < self.open || local_time > self.close
    }

    /// Whether equity prices can move right now.
    pub fn requires_freshness(&self, now: DateTime<Utc>) -> bool {
        !self.is_weekend(now) && !self.is_after_hours(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn regular_session_runs_from_half_past_nine_to_four() {
        assert_eq!(REGULAR_OPEN.format("%H:%M:%S").to_string(), "09:30:00");
        assert_eq!(REGULAR_CLOSE.format("%H:%M:%S").to_string(), "16:00:00");
        assert_eq!(MarketCalendar::default(), MarketCalendar::new_york());
    }

    #[test]
    fn saturday_and_sunday_are_weekend() {
        let calendar = MarketCalendar::new_york();

        assert!(calendar.is_weekend(utc(2024, 3, 9, 16, 0, 0)));
        assert!(calendar.is_weekend(utc(2024, 3, 10, 16, 0, 0)));
        assert!(!calendar.is_weekend(utc(2024, 3, 11, 16, 0, 0)));
    }

    #[test]
    fn weekend_is_judged_in_exchange_time() {
        let calendar = MarketCalendar::new_york();

        // Saturday 02:00 UTC is still Friday evening in New York.
        assert!(!calendar.is_weekend(utc(2024, 3, 9, 2, 0, 0)));
    }

    #[test]
    fn session_boundaries_are_inclusive() {
        let calendar = MarketCalendar::new_york();
        // 2024-01-08 is a Monday; New York is on EST (UTC-5).
        let open = utc(2024, 1, 8, 14, 30, 0);
        let close = utc(2024, 1, 8, 21, 0, 0);

        assert!(!calendar.is_after_hours(open));
        assert!(!calendar.is_after_hours(close));
        assert!(calendar.is_after_hours(open - Duration::milliseconds(1)));
        assert!(calendar.is_after_hours(close + Duration::milliseconds(1)));
    }

    #[test]
    fn daylight_saving_shifts_the_utc_session() {
        let calendar = MarketCalendar::new_york();
        // 2024-07-15 is a Monday; New York is on EDT (UTC-4).
        assert!(calendar.requires_freshness(utc(2024, 7, 15, 13, 30, 0)));
        assert!(!calendar.requires_freshness(utc(2024, 7, 15, 20, 30, 0)));
    }

    #[test]
    fn requires_freshness_only_during_weekday_session() {
        let calendar = MarketCalendar::new_york();

        assert!(calendar.requires_freshness(utc(2024, 3, 4, 15, 0, 0)));
        assert!(!calendar.requires_freshness(utc(2024, 3, 9, 15, 0, 0)));
        assert!(!calendar.requires_freshness(utc(2024, 3, 4, 23, 0, 0)));
    }
}
