//! Rates from any currency into the reporting currency.
//!
//! Lookup order: in-memory pair cache, persisted rate row, live provider,
//! configured fallback table. A lookup never fails.
//!
//! A fallback is remembered per pair until [`ExchangeRateService::reset_fallbacks`],
//! which the batch service calls when it starts a fetch round. It is never
//! written to the rate store.

use crate::core::cache::KeyValueCollection;
use crate::core::currency::{CurrencyRateProvider, ExchangeRate, is_valid_rate};
use crate::store::memory::MemoryCollection;
use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct ExchangeRateService {
    provider: Arc<dyn CurrencyRateProvider>,
    persisted: Arc<dyn KeyValueCollection>,
    memory: MemoryCollection,
    reporting_currency: String,
    window: Duration,
    fallback_rates: HashMap<String, f64>,
    fallbacks_in_use: StdMutex<HashMap<String, f64>>,
    pair_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ExchangeRateService {
    pub fn new(
        provider: Arc<dyn CurrencyRateProvider>,
        persisted: Arc<dyn KeyValueCollection>,
        reporting_currency: &str,
        window: Duration,
        fallback_rates: HashMap<String, f64>,
    ) -> Self {
        Self {
            provider,
            persisted,
            memory: MemoryCollection::new(),
            reporting_currency: reporting_currency.to_uppercase(),
            window,
            fallback_rates,
            fallbacks_in_use: StdMutex::new(HashMap::new()),
            pair_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn reporting_currency(&self) -> &str {
        &self.reporting_currency
    }

    /// Returns the multiplier that converts an amount in `currency` into the
    /// reporting currency.
    pub async fn rate_to_reporting(&self, currency: &str) -> f64 {
        let from = currency.trim().to_uppercase();
        if from == self.reporting_currency {
            return 1.0;
        }
        let key = ExchangeRate::pair_key(&from, &self.reporting_currency);

        if let Some(rate) = self.memory_rate(&key).await {
            return rate;
        }

        // Concurrent lookups of the same pair wait here so a batch makes one
        // provider call per currency. Other pairs proceed.
        let lock = self.pair_lock(&key);
        let _guard = lock.lock().await;
        if let Some(rate) = self.memory_rate(&key).await {
            return rate;
        }

        if let Some(row) = self.persisted_rate(&key).await {
            debug!(currency = %from, rate = row.rate, source = %row.source, "Using stored exchange rate");
            self.remember(&key, row.rate).await;
            return row.rate;
        }

        if let Some(rate) = self.fallback_in_use(&key) {
            return rate;
        }

        match self.provider.get_rate(&from, &self.reporting_currency).await {
            Ok(rate) if is_valid_rate(rate) => {
                info!(currency = %from, rate, source = self.provider.name(), "Fetched exchange rate");
                let row = ExchangeRate {
                    from_currency: from.clone(),
                    to_currency: self.reporting_currency.clone(),
                    rate,
                    last_updated: Utc::now(),
                    source: self.provider.name().to_string(),
                    is_active: true,
                };
                if let Err(e) = self.persist(&key, &row).await {
                    warn!(currency = %from, error = %e, "Failed to store exchange rate");
                }
                self.remember(&key, rate).await;
                rate
            }
            Ok(rate) => {
                warn!(currency = %from, rate, "Provider returned an invalid rate, using fallback");
                self.use_fallback(&key, &from)
            }
            Err(e) => {
                warn!(currency = %from, error = %e, "Failed to fetch exchange rate, using fallback");
                self.use_fallback(&key, &from)
            }
        }
    }

    /// Forgets fallbacks handed out so far, so the next lookup of those pairs
    /// asks the provider again.
    pub fn reset_fallbacks(&self) {
        self.fallbacks_in_use
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn use_fallback(&self, key: &str, currency: &str) -> f64 {
        let rate = self.fallback_rate(currency);
        self.fallbacks_in_use
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), rate);
        rate
    }

    fn fallback_in_use(&self, key: &str) -> Option<f64> {
        self.fallbacks_in_use
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }

    fn pair_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.pair_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// The configured fallback for `currency`, else the USD fallback.
    pub fn fallback_rate(&self, currency: &str) -> f64 {
        if let Some(rate) = self.fallback_rates.get(currency).copied().filter(|r| is_valid_rate(*r)) {
            return rate;
        }
        match self.fallback_rates.get("USD").copied().filter(|r| is_valid_rate(*r)) {
            Some(rate) => {
                warn!(currency, rate, "No fallback rate configured, using USD fallback");
                rate
            }
            None => {
                warn!(currency, "No fallback rates configured, converting at par");
                1.0
            }
        }
    }

    async fn memory_rate(&self, key: &str) -> Option<f64> {
        let bytes = self.memory.get(key.as_bytes()).await.ok()??;
        serde_json::from_slice(&bytes).ok()
    }

    async fn remember(&self, key: &str, rate: f64) {
        if let Ok(bytes) = serde_json::to_vec(&rate) {
            let _ = self.memory.put(key.as_bytes(), &bytes, Some(self.window)).await;
        }
    }

    async fn persisted_rate(&self, key: &str) -> Option<ExchangeRate> {
        let bytes = match self.persisted.get(key.as_bytes()).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(pair = key, error = %e, "Rate store unavailable");
                return None;
            }
        };
        let row: ExchangeRate = match serde_json::from_slice(&bytes) {
            Ok(row) => row,
            Err(e) => {
                warn!(pair = key, error = %e, "Ignoring unreadable rate row");
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(row.last_updated);
        let fresh = age
            .to_std()
            .map(|age| age < self.window)
            .unwrap_or(true);
        if row.is_active && row.is_valid() && fresh {
            Some(row)
        } else {
            debug!(pair = key, "Stored rate is stale or inactive");
            None
        }
    }

    async fn persist(&self, key: &str, row: &ExchangeRate) -> Result<()> {
        let bytes = serde_json::to_vec(row)?;
        self.persisted.put(key.as_bytes(), &bytes, None).await
    }

    /// Drops both the in-process and the persisted rates.
    pub async fn clear(&self) -> Result<()> {
        self.reset_fallbacks();
        self.memory.clear().await?;
        self.persisted.clear().await
    }
}
