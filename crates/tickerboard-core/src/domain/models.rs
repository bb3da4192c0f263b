use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Text shown in place of a percentage that cannot be computed.
pub const UNDEFINED_PERCENTAGE: &str = "N/A";

/// Movement of the current price relative to the previous session's close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    /// `current_price - previous_close`.
    pub value: f64,
    /// `100 * value / |previous_close|`; `None` when the previous close is zero.
    pub percentage: Option<f64>,
}

impl PriceChange {
    pub fn between(previous_close: f64, current_price: f64) -> Self {
        let value = current_price - previous_close;
        let percentage = if previous_close == 0.0 {
            None
        } else {
            Some(100.0 * value / previous_close.abs())
        };

        Self { value, percentage }
    }

    /// Value change in display currency, two decimals (`"10.00"`).
    pub fn format_value(&self, exchange_rate: f64) -> String {
        format_amount(self.value * exchange_rate)
    }

    /// Percentage change, two decimals with a trailing `%` (`"10.00%"`).
    pub fn format_percentage(&self) -> String {
        match self.percentage {
            Some(percentage) => format!("{percentage:.2}%"),
            None => String::from(UNDEFINED_PERCENTAGE),
        }
    }
}

/// Formats a monetary amount the way every price on the board is shown.
pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

pub fn validate_currency_code(input: &str) -> Result<String, ValidationError> {
    let normalized = input.trim().to_ascii_uppercase();
    let is_valid = normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());

    if !is_valid {
        return Err(ValidationError::InvalidCurrency {
            value: input.to_owned(),
        });
    }

    Ok(normalized)
}
