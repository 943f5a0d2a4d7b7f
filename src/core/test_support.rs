//! Fakes shared by the core unit tests.

use crate::core::cache::KeyValueCollection;
use crate::core::currency::CurrencyRateProvider;
use crate::core::price::{QuoteError, QuoteFetcher, RawQuote};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct MockQuoteFetcher {
    quotes: HashMap<String, RawQuote>,
    rate_limited: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockQuoteFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, identifier: &str, price: f64, previous_close: f64, currency: Option<&str>) -> Self {
        self.quotes.insert(
            identifier.to_string(),
            RawQuote {
                price,
                previous_close: Some(previous_close),
                currency: currency.map(str::to_string),
            },
        );
        self
    }

    pub fn with_rate_limit(mut self, identifier: &str) -> Self {
        self.rate_limited.insert(identifier.to_string());
        self
    }

    /// Every fetch sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl QuoteFetcher for MockQuoteFetcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_quote(&self, identifier: &str) -> Result<RawQuote, QuoteError> {
        self.calls.lock().unwrap().push(identifier.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.rate_limited.contains(identifier) {
            return Err(QuoteError::RateLimited(identifier.to_string()));
        }
        self.quotes
            .get(identifier)
            .cloned()
            .ok_or_else(|| QuoteError::NotFound(identifier.to_string()))
    }
}

#[derive(Default)]
pub struct MockRateProvider {
    rates: HashMap<String, f64>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl MockRateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: &str, rate: f64) -> Self {
        self.rates.insert(from.to_string(), rate);
        self
    }

    pub fn with_delay(mut self, from: &str, delay: Duration) -> Self {
        self.delays.insert(from.to_string(), delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CurrencyRateProvider for MockRateProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(from) {
            tokio::time::sleep(*delay).await;
        }
        self.rates
            .get(from)
            .copied()
            .ok_or_else(|| anyhow!("HTTP error: 500 Internal Server Error for currency pair: {from}{to}=X"))
    }
}

/// A collection whose backing store is down.
pub struct FailingCollection;

#[async_trait]
impl KeyValueCollection for FailingCollection {
    async fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>> {
        Err(anyhow!("store unavailable"))
    }

    async fn put(&self, _key: &[u8], _value: &[u8], _ttl: Option<Duration>) -> Result<()> {
        Err(anyhow!("store unavailable"))
    }

    async fn remove(&self, _key: &[u8]) -> Result<()> {
        Err(anyhow!("store unavailable"))
    }

    async fn clear(&self) -> Result<()> {
        Err(anyhow!("store unavailable"))
    }
}
