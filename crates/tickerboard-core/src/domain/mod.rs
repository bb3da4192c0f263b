//! Domain value types shared by instruments, providers and the aggregator.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Case-preserving provider ticker (`AAPL`, `BTC/USD`) |
//! | [`PriceChange`] | Absolute and percentage move since the previous close |

mod models;
mod symbol;

pub use models::{format_amount, validate_currency_code, PriceChange, UNDEFINED_PERCENTAGE};
pub use symbol::Symbol;
