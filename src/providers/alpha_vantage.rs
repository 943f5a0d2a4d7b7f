//! Alpha Vantage adapters.
//!
//! Alpha Vantage reports throttling inside a 200 response, as a `Note` or
//! `Information` field, and never reports the quote currency.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::core::currency::CurrencyRateProvider;
use crate::core::price::{QuoteError, QuoteFetcher, RawQuote};
use crate::providers::util::{RetryPolicy, with_retry};

#[derive(Deserialize, Debug)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ExchangeRateResponse {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    rate: Option<RealtimeRate>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RealtimeRate {
    #[serde(rename = "5. Exchange Rate")]
    exchange_rate: String,
}

/// Returns the throttling message if `notice` is one.
fn rate_limit_notice(notice: Option<&str>) -> Option<&str> {
    notice.filter(|text| {
        let text = text.to_lowercase();
        text.contains("rate limit") || text.contains("call frequency") || text.contains("requests per day")
    })
}

fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .map(|v| v.trim().trim_end_matches('%'))
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub struct AlphaVantageQuoteFetcher {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl AlphaVantageQuoteFetcher {
    pub fn new(base_url: &str, api_key: &str, client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            retry,
        }
    }
}

#[async_trait]
impl QuoteFetcher for AlphaVantageQuoteFetcher {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    #[instrument(
        name = "AlphaVantageQuoteFetch",
        skip(self),
        fields(identifier = %identifier)
    )]
    async fn fetch_quote(&self, identifier: &str) -> Result<RawQuote, QuoteError> {
        if self.api_key.trim().is_empty() {
            return Err(QuoteError::MissingApiKey(self.name().to_string()));
        }

        let url = format!(
            "{}/query?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            self.base_url, identifier, self.api_key
        );
        debug!(identifier, "Requesting Alpha Vantage quote");

        let request_error = |e: reqwest::Error| QuoteError::Request {
            identifier: identifier.to_string(),
            source: e.into(),
        };
        let response = with_retry(|| self.client.get(&url).send(), self.retry)
            .await
            .map_err(request_error)?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(QuoteError::RateLimited(format!(
                    "Alpha Vantage returned 429 for {identifier}"
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

        let data: GlobalQuoteResponse = response.json().await.map_err(|e| QuoteError::Malformed {
            identifier: identifier.to_string(),
            reason: e.to_string(),
        })?;

        if let Some(notice) =
            rate_limit_notice(data.note.as_deref()).or(rate_limit_notice(data.information.as_deref()))
        {
            return Err(QuoteError::RateLimited(notice.to_string()));
        }
        if let Some(message) = &data.error_message {
            debug!(identifier, message = %message, "Alpha Vantage rejected identifier");
            return Err(QuoteError::NotFound(identifier.to_string()));
        }

        let quote = data
            .global_quote
            .filter(|q| q.price.as_deref().is_some_and(|p| !p.is_empty()))
            .ok_or_else(|| QuoteError::NotFound(identifier.to_string()))?;

        let price = parse_number(quote.price.as_deref()).ok_or_else(|| QuoteError::Malformed {
            identifier: identifier.to_string(),
            reason: "missing or non-finite price".to_string(),
        })?;
        let previous_close = parse_number(quote.previous_close.as_deref())
            .or_else(|| parse_number(quote.change.as_deref()).map(|change| price - change));

        Ok(RawQuote {
            price,
            previous_close,
            currency: None,
        })
    }
}

pub struct AlphaVantageCurrencyProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl AlphaVantageCurrencyProvider {
    pub fn new(base_url: &str, api_key: &str, client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            retry,
        }
    }
}

#[async_trait]
impl CurrencyRateProvider for AlphaVantageCurrencyProvider {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    #[instrument(name = "AlphaVantageRateFetch", skip(self))]
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        if self.api_key.trim().is_empty() {
            return Err(QuoteError::MissingApiKey(self.name().to_string()).into());
        }

        let pair = format!("{from}{to}");
        let url = format!(
            "{}/query?function=CURRENCY_EXCHANGE_RATE&from_currency={}&to_currency={}&apikey={}",
            self.base_url, from, to, self.api_key
        );

        let response = with_retry(|| self.client.get(&url).send(), self.retry)
            .await
            .map_err(|e| anyhow!("Request error: {} for currency pair: {}", e, pair))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for currency pair: {}",
                response.status(),
                pair
            ));
        }

        let data: ExchangeRateResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", pair, e))?;

        if let Some(notice) =
            rate_limit_notice(data.note.as_deref()).or(rate_limit_notice(data.information.as_deref()))
        {
            warn!(pair = %pair, "Alpha Vantage rate limit reached");
            return Err(QuoteError::RateLimited(notice.to_string()).into());
        }

        data.rate
            .and_then(|r| parse_number(Some(r.exchange_rate.as_str())))
            .ok_or_else(|| anyhow!("No rate data found for currency pair: {}", pair))
    }
}
