//! Quote abstractions and core types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors a vendor adapter reports for a single identifier.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("No quote found for {0}")]
    NotFound(String),
    #[error("Rate limit reached: {0}")]
    RateLimited(String),
    #[error("HTTP error: {status} for {identifier}")]
    Http { status: u16, identifier: String },
    #[error("Malformed quote for {identifier}: {reason}")]
    Malformed { identifier: String, reason: String },
    #[error("Request error for {identifier}: {source}")]
    Request {
        identifier: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("API key required for {0}")]
    MissingApiKey(String),
}

impl QuoteError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, QuoteError::RateLimited(_))
    }
}

/// What an upstream reports for an identifier, in its native currency.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote {
    pub price: f64,
    pub previous_close: Option<f64>,
    pub currency: Option<String>,
}

/// A quote with change figures derived, still in its native currency.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuote {
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub currency: String,
    /// The upstream did not report a currency and the default was applied.
    pub currency_assumed: bool,
}

impl NativeQuote {
    pub fn from_raw(raw: RawQuote, default_currency: &str) -> Self {
        let (currency, currency_assumed) = match raw.currency.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => (c.to_string(), false),
            _ => (default_currency.to_uppercase(), true),
        };

        let mut price = raw.price;
        let mut previous_close = raw.previous_close;

        // London listings are quoted in pence
        let currency = if currency == "GBp" || currency.eq_ignore_ascii_case("GBX") {
            price /= 100.0;
            previous_close = previous_close.map(|p| p / 100.0);
            "GBP".to_string()
        } else {
            currency.to_uppercase()
        };

        let (change, change_percent) = match previous_close {
            Some(prev) if prev.is_finite() && prev != 0.0 => {
                let change = price - prev;
                (change, change / prev * 100.0)
            }
            _ => (0.0, 0.0),
        };

        Self {
            price,
            change,
            change_percent,
            currency,
            currency_assumed,
        }
    }
}

/// A converted quote as stored in the price cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedQuote {
    pub symbol: String,
    pub native_price: f64,
    pub reporting_price: f64,
    pub native_change: f64,
    pub reporting_change: f64,
    pub change_percent: f64,
    pub native_currency: String,
    #[serde(default)]
    pub currency_assumed: bool,
    pub last_updated: DateTime<Utc>,
}

impl CachedQuote {
    /// Freezes `quote` into the reporting currency using `rate`.
    pub fn convert(symbol: &str, quote: &NativeQuote, rate: f64, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            native_price: quote.price,
            reporting_price: quote.price * rate,
            native_change: quote.change,
            reporting_change: quote.change * rate,
            change_percent: quote.change_percent,
            native_currency: quote.currency.clone(),
            currency_assumed: quote.currency_assumed,
            last_updated: now,
        }
    }
}

/// The per-symbol result handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub last_updated: DateTime<Utc>,
}

impl From<&CachedQuote> for PriceRecord {
    fn from(quote: &CachedQuote) -> Self {
        Self {
            symbol: quote.symbol.clone(),
            price: quote.reporting_price,
            change: quote.reporting_change,
            change_percent: quote.change_percent,
            last_updated: quote.last_updated,
        }
    }
}

#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// Short vendor name used in logs.
    fn name(&self) -> &str;

    async fn fetch_quote(&self, identifier: &str) -> Result<RawQuote, QuoteError>;

    /// Fetches `identifier` if it yields a usable quote. Only rate limiting
    /// is reported as an error; every other failure is `None`.
    async fn try_quote(&self, identifier: &str) -> Result<Option<RawQuote>, QuoteError> {
        match self.fetch_quote(identifier).await {
            Ok(quote) => Ok(Some(quote)),
            Err(e) if e.is_rate_limited() => Err(e),
            Err(e) => {
                debug!(identifier, error = %e, "Candidate has no usable quote");
                Ok(None)
            }
        }
    }
}
