use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::currency::CurrencyRateProvider;
use crate::core::price::{QuoteError, QuoteFetcher, RawQuote};
use crate::providers::util::{RetryPolicy, with_retry};

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    currency: Option<String>,
    #[serde(alias = "chartPreviousClose")]
    chart_previous_close: Option<f64>,
    #[serde(alias = "previousClose")]
    previous_close: Option<f64>,
}

// YahooQuoteFetcher implementation for QuoteFetcher
pub struct YahooQuoteFetcher {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl YahooQuoteFetcher {
    pub fn new(base_url: &str, client: reqwest::Client, retry: RetryPolicy) -> Self {
        YahooQuoteFetcher {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry,
        }
    }
}

#[async_trait]
impl QuoteFetcher for YahooQuoteFetcher {
    fn name(&self) -> &str {
        "yahoo"
    }

    #[instrument(
        name = "YahooQuoteFetch",
        skip(self),
        fields(identifier = %identifier)
    )]
    async fn fetch_quote(&self, identifier: &str) -> Result<RawQuote, QuoteError> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1d",
            self.base_url, identifier
        );
        debug!(url = %url, "Requesting quote");

        let response = with_retry(|| self.client.get(&url).send(), self.retry)
            .await
            .map_err(|e| QuoteError::Request {
                identifier: identifier.to_string(),
                source: e.into(),
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(QuoteError::NotFound(identifier.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(QuoteError::RateLimited(format!(
                    "Yahoo Finance returned 429 for {identifier}"
                )));
            }
            status if !status.is_success() => {
                return Err(QuoteError::Http {
                    status: status.as_u16(),
                    identifier: identifier.to_string(),
                });
            }
            _ => {}
        }

        let text = response.text().await.map_err(|e| QuoteError::Request {
            identifier: identifier.to_string(),
            source: e.into(),
        })?;
        let data: YahooChartResponse =
            serde_json::from_str(&text).map_err(|e| QuoteError::Malformed {
                identifier: identifier.to_string(),
                reason: e.to_string(),
            })?;

        let meta = data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .map(|item| item.meta)
            .ok_or_else(|| QuoteError::NotFound(identifier.to_string()))?;

        let price = meta
            .regular_market_price
            .filter(|p| p.is_finite())
            .ok_or_else(|| QuoteError::Malformed {
                identifier: identifier.to_string(),
                reason: "missing or non-finite price".to_string(),
            })?;

        Ok(RawQuote {
            price,
            previous_close: meta.chart_previous_close.or(meta.previous_close),
            currency: meta.currency,
        })
    }
}

// YahooCurrencyProvider implementation for CurrencyRateProvider
pub struct YahooCurrencyProvider {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl YahooCurrencyProvider {
    pub fn new(base_url: &str, client: reqwest::Client, retry: RetryPolicy) -> Self {
        YahooCurrencyProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry,
        }
    }
}

#[async_trait]
impl CurrencyRateProvider for YahooCurrencyProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    #[instrument(name = "YahooRateFetch", skip(self))]
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        let symbol = format!("{from}{to}=X");
        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        debug!(url = %url, "Requesting currency rate");

        let response = with_retry(|| self.client.get(&url).send(), self.retry)
            .await
            .map_err(|e| anyhow!("Request error: {} for currency pair: {}", e, symbol))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for currency pair: {}",
                response.status(),
                symbol
            ));
        }

        let text = response.text().await?;

        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        data.chart
            .result
            .and_then(|items| items.into_iter().next())
            .and_then(|item| item.meta.regular_market_price)
            .ok_or_else(|| anyhow!("No rate data found for currency pair: {}", symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_chart(status: u16, chart_path: &str, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(chart_path))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn fetcher(server: &MockServer) -> YahooQuoteFetcher {
        YahooQuoteFetcher::new(&server.uri(), reqwest::Client::new(), RetryPolicy::none())
    }

    fn rates(server: &MockServer) -> YahooCurrencyProvider {
        YahooCurrencyProvider::new(&server.uri(), reqwest::Client::new(), RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_successful_quote_fetch() {
        let mock_response = r#"{
            "chart": {
                "result": [{
                    "meta": {
                        "regularMarketPrice": 150.0,
                        "chartPreviousClose": 148.0,
                        "currency": "USD"
                    }
                }]
            }
        }"#;
        let server = mock_chart(200, "/v8/finance/chart/AAPL", mock_response).await;

        let quote = fetcher(&server).fetch_quote("AAPL").await.unwrap();
        assert_eq!(quote.price, 150.0);
        assert_eq!(quote.previous_close, Some(148.0));
        assert_eq!(quote.currency.as_deref(), Some("USD"));
    }

    #[tokio::test]
    async fn test_quote_without_currency_or_previous_close() {
        let mock_response = r#"{"chart": {"result": [{"meta": {"regularMarketPrice": 12.5, "previousClose": 12.0}}]}}"#;
        let server = mock_chart(200, "/v8/finance/chart/VOLV-B.ST", mock_response).await;

        let quote = fetcher(&server).fetch_quote("VOLV-B.ST").await.unwrap();
        assert_eq!(quote.previous_close, Some(12.0));
        assert!(quote.currency.is_none());
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_not_found() {
        let mock_response = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let server = mock_chart(404, "/v8/finance/chart/BADSYMBOL", mock_response).await;

        let err = fetcher(&server).fetch_quote("BADSYMBOL").await.unwrap_err();
        assert!(matches!(err, QuoteError::NotFound(ref id) if id == "BADSYMBOL"));
        assert_eq!(fetcher(&server).try_quote("BADSYMBOL").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_found() {
        let server = mock_chart(200, "/v8/finance/chart/NOPE", r#"{"chart": {"result": []}}"#).await;

        let err = fetcher(&server).fetch_quote("NOPE").await.unwrap_err();
        assert!(matches!(err, QuoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_too_many_requests_is_rate_limited() {
        let server = mock_chart(429, "/v8/finance/chart/AAPL", "Too Many Requests").await;

        let err = fetcher(&server).fetch_quote("AAPL").await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(fetcher(&server).try_quote("AAPL").await.unwrap_err().is_rate_limited());
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"chart": {"result": [{"meta": {"regularMarketPrice": 150.0}}]}}"#)
                    .set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        let request = crate::core::config::RequestConfig {
            timeout_secs: 1,
            ..Default::default()
        };
        let client = crate::providers::util::build_client(&request).unwrap();
        let fetcher = YahooQuoteFetcher::new(&server.uri(), client, RetryPolicy::none());

        let started = std::time::Instant::now();
        let err = fetcher.fetch_quote("AAPL").await.unwrap_err();

        assert!(matches!(err, QuoteError::Request { ref identifier, .. } if identifier == "AAPL"));
        assert!(started.elapsed() < std::time::Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let server = mock_chart(503, "/v8/finance/chart/AAPL", "").await;

        let err = fetcher(&server).fetch_quote("AAPL").await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP error: 503 for AAPL");
    }

    #[tokio::test]
    async fn test_missing_price_is_malformed() {
        let server = mock_chart(200, "/v8/finance/chart/AAPL", r#"{"chart": {"result": [{"meta": {"currency": "USD"}}]}}"#).await;

        let err = fetcher(&server).fetch_quote("AAPL").await.unwrap_err();
        assert!(matches!(err, QuoteError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_garbage_body_is_malformed() {
        let server = mock_chart(200, "/v8/finance/chart/AAPL", "<html>oops</html>").await;

        let err = fetcher(&server).fetch_quote("AAPL").await.unwrap_err();
        assert!(matches!(err, QuoteError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let mock_response = r#"{
            "chart": {
                "result": [
                    {
                        "meta": {
                            "regularMarketPrice": 0.9
                        }
                    }
                ]
            }
        }"#;
        let server = mock_chart(200, "/v8/finance/chart/USDEUR=X", mock_response).await;

        let rate = rates(&server)
            .get_rate("USD", "EUR")
            .await
            .expect("Failed to get rate");
        assert_eq!(rate, 0.9);
    }

    #[tokio::test]
    async fn test_no_currency_rate_found() {
        let server = mock_chart(200, "/v8/finance/chart/USDEUR=X", r#"{"chart": {"result": []}}"#).await;

        let result = rates(&server).get_rate("USD", "EUR").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No rate data found for currency pair: USDEUR=X"
        );
    }

    #[tokio::test]
    async fn test_currency_api_error_response() {
        let server = mock_chart(500, "/v8/finance/chart/USDEUR=X", "").await;

        let result = rates(&server).get_rate("USD", "EUR").await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "HTTP error: 500 Internal Server Error for currency pair: USDEUR=X"
        );
    }

    #[tokio::test]
    async fn test_currency_api_malformed_response() {
        // "results" instead of "result"
        let server = mock_chart(200, "/v8/finance/chart/USDEUR=X", r#"{"chart": {"results": []}}"#).await;

        let result = rates(&server).get_rate("USD", "EUR").await;
        assert!(result.is_err());
    }
}
