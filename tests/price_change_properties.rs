//! Property tests for price-change arithmetic and formatting.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tickerboard_core::{
    FetchContext, FixtureMarketData, Instrument, InstrumentKind, ManualClock, PriceChange, Symbol,
    UNDEFINED_PERCENTAGE,
};
use tickerboard_tests::{listing, session_open};

fn price() -> impl Strategy<Value = f64> {
    (-1_000_000.0f64..1_000_000.0).prop_filter("non-zero close", |value| value.abs() > 1e-6)
}

proptest! {
    #[test]
    fn value_change_is_current_minus_previous(previous in price(), current in price()) {
        let change = PriceChange::between(previous, current);

        prop_assert_eq!(change.value, current - previous);
    }

    #[test]
    fn percentage_uses_the_absolute_previous_close(previous in price(), current in price()) {
        let change = PriceChange::between(previous, current);
        let expected = 100.0 * (current - previous) / previous.abs();
        let percentage = change.percentage.expect("defined for a non-zero close");

        prop_assert!((percentage - expected).abs() <= 1e-9 * expected.abs().max(1.0));
    }

    #[test]
    fn zero_previous_close_is_undefined_not_a_crash(current in -1_000.0f64..1_000.0) {
        let change = PriceChange::between(0.0, current);

        prop_assert_eq!(change.percentage, None);
        prop_assert_eq!(change.format_percentage(), UNDEFINED_PERCENTAGE);
        prop_assert_eq!(change.value, current);
    }

    #[test]
    fn formatted_values_keep_two_decimals(previous in price(), current in price(), rate in 0.01f64..200.0) {
        let change = PriceChange::between(previous, current);
        let rendered = change.format_value(rate);
        let decimals = rendered.split('.').nth(1).map(str::len);

        prop_assert_eq!(decimals, Some(2));
        prop_assert!(change.format_percentage().ends_with('%'));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn initial_fetch_derives_change_from_provider_prices(
        previous in 0.01f64..100_000.0,
        current in 0.01f64..100_000.0,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        let instrument = runtime.block_on(async {
            let market = Arc::new(FixtureMarketData::new().with_listing(
                "BTC/USD",
                listing(InstrumentKind::Crypto, "Bitcoin", previous, current),
            ));
            let ctx = FetchContext {
                provider: market,
                clock: Arc::new(ManualClock::new(session_open())),
                country: String::from("United States"),
            };
            let mut instrument = Instrument::new(
                InstrumentKind::Crypto,
                Symbol::parse("BTC/USD").expect("valid symbol"),
                "USD",
                1.0,
                Duration::from_secs(600),
                session_open(),
            );
            instrument.initial_fetch(&ctx).await;
            instrument
        });

        let change = instrument.change().expect("change populated after initial fetch");
        prop_assert!(instrument.is_initialized());
        prop_assert_eq!(change.value, current - previous);
        prop_assert_eq!(change.percentage, Some(100.0 * (current - previous) / previous.abs()));
    }
}
