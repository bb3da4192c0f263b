use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::{ExchangeRateProvider, ProviderFuture, SourceError};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient, DEFAULT_TIMEOUT_MS};

const DEFAULT_ENDPOINT: &str = "https://open.er-api.com/v6/latest/USD";
const BASE_CURRENCY: &str = "USD";

/// USD-based exchange rates fetched over HTTP.
#[derive(Clone)]
pub struct HttpExchangeRates {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    timeout_ms: u64,
}

impl HttpExchangeRates {
    pub fn new() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            endpoint: String::from(DEFAULT_ENDPOINT),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for HttpExchangeRates {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeRateProvider for HttpExchangeRates {
    fn rate<'a>(&'a self, currency: &'a str) -> ProviderFuture<'a, f64> {
        Box::pin(async move {
            if currency.eq_ignore_ascii_case(BASE_CURRENCY) {
                return Ok(1.0);
            }

            debug!(currency, "fetching exchange rate");
            let request = HttpRequest::get(self.endpoint.as_str()).with_timeout_ms(self.timeout_ms);
            let response = self.http_client.execute(request).await.map_err(|error| {
                SourceError::unavailable(format!("exchange-rate transport error: {}", error.message()))
            })?;

            if !response.is_success() {
                return Err(SourceError::unavailable(format!(
                    "exchange-rate endpoint returned status {}",
                    response.status
                )));
            }

            let payload: RatesPayload = serde_json::from_str(&response.body).map_err(|e| {
                SourceError::internal(format!("failed to parse exchange-rate response: {e}"))
            })?;

            let rate = payload
                .rates
                .get(&currency.to_ascii_uppercase())
                .copied()
                .ok_or_else(|| SourceError::not_found(format!("no USD rate for '{currency}'")))?;

            if !rate.is_finite() || rate <= 0.0 {
                return Err(SourceError::internal(format!(
                    "exchange rate for '{currency}' must be positive, got {rate}"
                )));
            }

            Ok(rate)
        })
    }
}

#[derive(Debug, Deserialize)]
struct RatesPayload {
    #[serde(default)]
    rates: HashMap<String, f64>,
}
