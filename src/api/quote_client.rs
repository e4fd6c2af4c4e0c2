//! Yahoo Finance chart client for quotes and daily bar history.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::Quote;

use super::types::ChartResponse;

pub const YAHOO_CHART_BASE: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; bot-arena/0.1)";

/// Why a single quote request failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error: HTTP {0}")]
    Server(u16),

    #[error("unknown symbol")]
    NotFound,

    #[error("request rejected: HTTP {0}")]
    Client(u16),

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("no price in response")]
    NoPrice,

    #[error("cancelled by shutdown")]
    Cancelled,
}

impl FetchError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transport(_)
                | FetchError::Timeout
                | FetchError::RateLimited { .. }
                | FetchError::Server(_)
        )
    }

    /// Server-requested delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    fn from_status(status: StatusCode, retry_after: Option<Duration>) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited { retry_after },
            StatusCode::NOT_FOUND => FetchError::NotFound,
            StatusCode::REQUEST_TIMEOUT => FetchError::Timeout,
            s if s.is_server_error() => FetchError::Server(s.as_u16()),
            s => FetchError::Client(s.as_u16()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Source of a single symbol's quote. One request, no retries.
pub trait QuoteProvider: Send + Sync {
    fn fetch_quote(&self, symbol: &str) -> impl Future<Output = Result<Quote, FetchError>> + Send;
}

/// Client for the Yahoo chart API (read-only).
pub struct YahooClient {
    client: Client,
    base_url: String,
    range: String,
}

impl YahooClient {
    /// Client for `base_url`, normally `YAHOO_CHART_BASE`.
    pub fn with_base_url(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            range: "3mo".to_string(),
        })
    }

    /// History window requested with each quote ("3mo", "6mo", ...).
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }
}

impl QuoteProvider for YahooClient {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        debug!(url = %url, "Fetching chart");

        let response = self
            .client
            .get(&url)
            .query(&[("range", self.range.as_str()), ("interval", "1d")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FetchError::from_status(status, retry_after));
        }

        let body = response.text().await?;
        let chart: ChartResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        parse_chart(symbol, chart)
    }
}

/// Turn a chart payload into a quote for `symbol`.
fn parse_chart(symbol: &str, chart: ChartResponse) -> Result<Quote, FetchError> {
    if let Some(err) = chart.chart.error {
        return Err(if err.code.eq_ignore_ascii_case("not found") {
            FetchError::NotFound
        } else {
            FetchError::Decode(format!("{}: {}", err.code, err.description))
        });
    }

    let result = chart
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or(FetchError::NotFound)?;

    let price = result
        .last_price()
        .and_then(Decimal::from_f64)
        .map(|p| p.round_dp(6))
        .filter(|p| *p > Decimal::ZERO)
        .ok_or(FetchError::NoPrice)?;

    let timestamp = result
        .meta
        .regular_market_time
        .or_else(|| result.timestamp.last().copied())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    let (closes, volumes) = result.bars();
    Ok(Quote::spot(symbol, price, timestamp).with_history(closes, volumes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chart_json(price: f64) -> serde_json::Value {
        serde_json::json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "regularMarketPrice": price, "regularMarketTime": 1772467200},
                    "timestamp": [1772208000, 1772294400, 1772380800],
                    "indicators": {"quote": [{"close": [185.0, 187.25, price], "volume": [100, 200, 300]}]}
                }],
                "error": null
            }
        })
    }

    async fn client(server: &MockServer) -> YahooClient {
        YahooClient::with_base_url(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_quote_parses_chart() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .and(query_param("interval", "1d"))
            .and(query_param("range", "3mo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_json(189.5)))
            .mount(&server)
            .await;

        let quote = client(&server).await.fetch_quote("AAPL").await.unwrap();

        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.price, dec!(189.5));
        assert_eq!(quote.timestamp.timestamp(), 1772467200);
        assert_eq!(quote.closes, vec![185.0, 187.25, 189.5]);
        assert_eq!(quote.volumes.len(), 3);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/LIMIT"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/DOWN"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/NOPE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server).await;

        let limited = client.fetch_quote("LIMIT").await.unwrap_err();
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
        assert!(limited.is_retryable());

        assert_eq!(client.fetch_quote("DOWN").await, Err(FetchError::Server(503)));
        let missing = client.fetch_quote("NOPE").await.unwrap_err();
        assert_eq!(missing, FetchError::NotFound);
        assert!(!missing.is_retryable());
    }

    #[tokio::test]
    async fn test_garbage_body_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server).await.fetch_quote("AAPL").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_payload_without_price() {
        let chart: ChartResponse = serde_json::from_value(serde_json::json!({
            "chart": {"result": [{"meta": {"symbol": "X"}, "indicators": {"quote": [{"close": [null]}]}}]}
        }))
        .unwrap();
        assert_eq!(parse_chart("X", chart), Err(FetchError::NoPrice));
    }
}
