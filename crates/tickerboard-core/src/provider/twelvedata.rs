use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{parse_decimal, MarketDataProvider, ProviderFuture, RequestBudget, SourceError};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient, DEFAULT_TIMEOUT_MS};
use crate::Symbol;

const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";
const DECIMAL_PLACES: &str = "2";

/// Twelve Data REST adapter.
///
/// Quote endpoints are authenticated with the `apikey` query parameter when a
/// key is configured; reference-data endpoints (`symbol_search`, `stocks`,
/// `cryptocurrencies`, `forex_pairs`) are public. Every request draws from the
/// shared [`RequestBudget`].
#[derive(Clone)]
pub struct TwelveDataProvider {
    http_client: Arc<dyn HttpClient>,
    api_key: Option<String>,
    base_url: String,
    timeout_ms: u64,
    budget: RequestBudget,
}

impl TwelveDataProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()), api_key)
    }

    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        Self {
            http_client,
            api_key,
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            budget: RequestBudget::twelvedata_free_tier(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_budget(mut self, budget: RequestBudget) -> Self {
        self.budget = budget;
        self
    }

    fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}/{}", self.base_url, path)).with_timeout_ms(self.timeout_ms)
    }

    fn authenticated(&self, request: HttpRequest) -> HttpRequest {
        match &self.api_key {
            Some(key) => request.with_query("apikey", key.as_str()),
            None => request,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, SourceError> {
        if let Err(delay) = self.budget.acquire().await {
            return Err(SourceError::rate_limited(format!(
                "twelvedata request budget exhausted; retry in {:.2}s",
                delay.as_secs_f64()
            )));
        }

        debug!(endpoint = %request.url, "twelvedata request");
        let response = self.http_client.execute(request).await.map_err(|error| {
            SourceError::unavailable(format!("twelvedata transport error: {}", error.message()))
        })?;

        if !response.is_success() {
            return Err(status_error(response.status, "twelvedata returned status"));
        }

        let value: serde_json::Value = serde_json::from_str(&response.body).map_err(|e| {
            SourceError::internal(format!("failed to parse twelvedata response: {e}"))
        })?;

        if value.get("status").and_then(serde_json::Value::as_str) == Some("error") {
            let failure: ErrorPayload = serde_json::from_value(value)
                .map_err(|e| SourceError::internal(format!("malformed twelvedata error: {e}")))?;
            return Err(status_error(failure.code, &failure.message));
        }

        serde_json::from_value(value)
            .map_err(|e| SourceError::internal(format!("unexpected twelvedata payload: {e}")))
    }
}

impl MarketDataProvider for TwelveDataProvider {
    fn symbol_search<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, Option<String>> {
        Box::pin(async move {
            let request = self
                .request("symbol_search")
                .with_query("symbol", symbol.as_str())
                .with_query("outputsize", "1");
            let payload: DataPayload<SymbolMatch> = self.fetch(request).await?;
            Ok(payload.data.into_iter().next().map(|entry| entry.symbol))
        })
    }

    fn previous_close<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, f64> {
        Box::pin(async move {
            let request = self.authenticated(
                self.request("time_series")
                    .with_query("symbol", symbol.as_str())
                    .with_query("interval", "1day")
                    .with_query("outputsize", "1")
                    .with_query("dp", DECIMAL_PLACES)
                    .with_query("previous_close", "true"),
            );
            let payload: TimeSeriesPayload = self.fetch(request).await?;
            let latest = payload.values.into_iter().next().ok_or_else(|| {
                SourceError::not_found(format!("no daily bar for '{symbol}'"))
            })?;
            let raw = latest.previous_close.ok_or_else(|| {
                SourceError::internal(format!("daily bar for '{symbol}' lacks previous_close"))
            })?;
            parse_decimal("previous_close", &raw)
        })
    }

    fn current_price<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, f64> {
        Box::pin(async move {
            let request = self.authenticated(
                self.request("price")
                    .with_query("symbol", symbol.as_str())
                    .with_query("dp", DECIMAL_PLACES),
            );
            let payload: PricePayload = self.fetch(request).await?;
            parse_decimal("price", &payload.price)
        })
    }

    fn stock_name<'a>(
        &'a self,
        symbol: &'a Symbol,
        country: &'a str,
    ) -> ProviderFuture<'a, Option<String>> {
        Box::pin(async move {
            let request = self
                .request("stocks")
                .with_query("symbol", symbol.as_str())
                .with_query("country", country);
            let payload: DataPayload<StockListing> = self.fetch(request).await?;
            Ok(payload.data.into_iter().next().map(|listing| listing.name))
        })
    }

    fn crypto_name<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let request = self
                .request("cryptocurrencies")
                .with_query("symbol", symbol.as_str());
            let payload: DataPayload<CurrencyPair> = self.fetch(request).await?;
            payload
                .data
                .into_iter()
                .next()
                .map(|pair| pair.currency_base)
                .ok_or_else(|| SourceError::not_found(format!("no cryptocurrency '{symbol}'")))
        })
    }

    fn forex_name<'a>(&'a self, symbol: &'a Symbol) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let request = self
                .request("forex_pairs")
                .with_query("symbol", symbol.as_str());
            let payload: DataPayload<CurrencyPair> = self.fetch(request).await?;
            payload
                .data
                .into_iter()
                .next()
                .map(|pair| match pair.currency_quote {
                    Some(quote) => format!("{}/{}", pair.currency_base, quote),
                    None => pair.currency_base,
                })
                .ok_or_else(|| SourceError::not_found(format!("no forex pair '{symbol}'")))
        })
    }
}

fn status_error(status: u16, message: &str) -> SourceError {
    match status {
        429 => SourceError::rate_limited(format!("{message} {status}")),
        400 => SourceError::invalid_request(format!("{message} {status}")),
        404 => SourceError::not_found(format!("{message} {status}")),
        _ => SourceError::unavailable(format!("{message} {status}")),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    code: u16,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DataPayload<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SymbolMatch {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct StockListing {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyPair {
    currency_base: String,
    #[serde(default)]
    currency_quote: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesPayload {
    #[serde(default)]
    values: Vec<TimeSeriesValue>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesValue {
    #[serde(default)]
    previous_close: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PricePayload {
    price: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpError, HttpResponse};
    use crate::provider::SourceErrorKind;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[derive(Debug)]
    struct RecordingHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn replying(body: &str) -> Self {
            Self {
                response: Ok(HttpResponse::ok_json(body)),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(HttpError::timeout("upstream timeout")),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn provider(client: Arc<RecordingHttpClient>) -> TwelveDataProvider {
        TwelveDataProvider::with_http_client(client, Some(String::from(KEY)))
            .with_base_url("https://td.example/")
            .with_budget(RequestBudget::per_minute(1_000, Duration::ZERO))
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[tokio::test]
    async fn symbol_search_returns_first_canonical_match() {
        let client = Arc::new(RecordingHttpClient::replying(
            r#"{"data":[{"symbol":"AAPL","instrument_name":"Apple Inc"}],"status":"ok"}"#,
        ));
        let adapter = provider(Arc::clone(&client));

        let canonical = adapter
            .symbol_search(&symbol("AAPL"))
            .await
            .expect("search should succeed");

        assert_eq!(canonical.as_deref(), Some("AAPL"));
        let requests = client.recorded_requests();
        assert_eq!(requests[0].url, "https://td.example/symbol_search");
        assert_eq!(requests[0].query_value("apikey"), None);
    }

    #[tokio::test]
    async fn symbol_search_without_matches_yields_none() {
        let client = Arc::new(RecordingHttpClient::replying(r#"{"data":[],"status":"ok"}"#));
        let adapter = provider(client);

        let canonical = adapter
            .symbol_search(&symbol("ZZZ"))
            .await
            .expect("search should succeed");

        assert_eq!(canonical, None);
    }

    #[tokio::test]
    async fn price_requests_are_authenticated() {
        let client = Arc::new(RecordingHttpClient::replying(r#"{"price":"187.42"}"#));
        let adapter = provider(Arc::clone(&client));

        let price = adapter
            .current_price(&symbol("AAPL"))
            .await
            .expect("price should parse");

        assert_eq!(price, 187.42);
        let requests = client.recorded_requests();
        assert_eq!(requests[0].query_value("apikey"), Some(KEY));
        assert_eq!(requests[0].query_value("dp"), Some("2"));
    }

    #[tokio::test]
    async fn previous_close_is_read_from_latest_daily_bar() {
        let client = Arc::new(RecordingHttpClient::replying(
            r#"{"meta":{"symbol":"AAPL"},"values":[{"datetime":"2024-03-04","close":"175.10","previous_close":"179.66"}],"status":"ok"}"#,
        ));
        let adapter = provider(Arc::clone(&client));

        let close = adapter
            .previous_close(&symbol("AAPL"))
            .await
            .expect("previous close should parse");

        assert_eq!(close, 179.66);
        let requests = client.recorded_requests();
        assert_eq!(requests[0].query_value("previous_close"), Some("true"));
        assert_eq!(requests[0].query_value("interval"), Some("1day"));
    }

    #[tokio::test]
    async fn error_status_payload_becomes_source_error() {
        let client = Arc::new(RecordingHttpClient::replying(
            r#"{"code":429,"message":"You have run out of API credits","status":"error"}"#,
        ));
        let adapter = provider(client);

        let error = adapter
            .current_price(&symbol("AAPL"))
            .await
            .expect_err("error payload must fail");

        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert!(error.retryable());
    }

    #[tokio::test]
    async fn unknown_stock_name_is_none() {
        let client = Arc::new(RecordingHttpClient::replying(r#"{"data":[],"status":"ok"}"#));
        let adapter = provider(client);

        let name = adapter
            .stock_name(&symbol("BTC/USD"), "United States")
            .await
            .expect("lookup should succeed");

        assert_eq!(name, None);
    }

    #[tokio::test]
    async fn forex_name_joins_base_and_quote() {
        let client = Arc::new(RecordingHttpClient::replying(
            r#"{"data":[{"symbol":"EUR/USD","currency_group":"Major","currency_base":"Euro","currency_quote":"US Dollar"}],"status":"ok"}"#,
        ));
        let adapter = provider(client);

        let name = adapter
            .forex_name(&symbol("EUR/USD"))
            .await
            .expect("lookup should succeed");

        assert_eq!(name, "Euro/US Dollar");
    }

    #[tokio::test]
    async fn transport_failure_is_transient() {
        let client = Arc::new(RecordingHttpClient::failing());
        let adapter = provider(client);

        let error = adapter
            .crypto_name(&symbol("BTC/USD"))
            .await
            .expect_err("transport failure must surface");

        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert!(error.message().contains("upstream timeout"));
    }

    #[tokio::test]
    async fn exhausted_budget_is_rate_limited() {
        let client = Arc::new(RecordingHttpClient::replying(r#"{"price":"1.00"}"#));
        let adapter = provider(Arc::clone(&client))
            .with_budget(RequestBudget::per_minute(1, Duration::ZERO));

        adapter
            .current_price(&symbol("AAPL"))
            .await
            .expect("first request fits the budget");
        let error = adapter
            .current_price(&symbol("AAPL"))
            .await
            .expect_err("second request exceeds the budget");

        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert_eq!(client.recorded_requests().len(), 1);
    }
}
