//! Batch entry point: serve what the cache has, fetch the rest, and return
//! whatever could be priced.

use crate::core::cache::KeyValueCollection;
use crate::core::config::AppConfig;
use crate::core::exchange::ExchangeRateService;
use crate::core::price::{CachedQuote, NativeQuote, PriceRecord, QuoteError, QuoteFetcher};
use crate::core::price_cache::PriceCache;
use crate::core::resolver::{Resolved, SymbolResolver};
use crate::store::memory::MemoryCollection;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("No symbols provided")]
    EmptyBatch,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Currency assumed for quotes that do not report one.
    pub default_currency: String,
    /// Minimum time between batches that reach upstream. Zero disables.
    pub min_batch_interval: Duration,
    /// How long failed symbols are skipped. `None` retries every batch.
    pub negative_ttl: Option<Duration>,
    pub max_concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            min_batch_interval: Duration::from_secs(30),
            negative_ttl: None,
            max_concurrency: 4,
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_currency: config.default_quote_currency.clone(),
            min_batch_interval: config.cache.min_batch_interval(),
            negative_ttl: config.cache.negative_ttl(),
            max_concurrency: config.request.max_concurrency,
        }
    }
}

/// Trims, uppercases and de-duplicates symbols, keeping first appearance
/// order. Blank entries are dropped.
pub fn normalize_symbols<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for symbol in symbols {
        let symbol = symbol.as_ref().trim().to_uppercase();
        if !symbol.is_empty() && !normalized.contains(&symbol) {
            normalized.push(symbol);
        }
    }
    normalized
}

struct Inner {
    cache: PriceCache,
    resolver: SymbolResolver,
    fetcher: Arc<dyn QuoteFetcher>,
    rates: ExchangeRateService,
    options: BatchOptions,
    failures: MemoryCollection,
    permits: Semaphore,
    last_fetch: Mutex<Option<Instant>>,
    snapshot: Mutex<HashMap<String, PriceRecord>>,
}

/// The quote service. Cheap to clone; clones share caches.
#[derive(Clone)]
pub struct PriceService {
    inner: Arc<Inner>,
}

impl PriceService {
    pub fn new(
        cache: PriceCache,
        resolver: SymbolResolver,
        fetcher: Arc<dyn QuoteFetcher>,
        rates: ExchangeRateService,
        options: BatchOptions,
    ) -> Self {
        let permits = Semaphore::new(options.max_concurrency.max(1));
        Self {
            inner: Arc::new(Inner {
                cache,
                resolver,
                fetcher,
                rates,
                options,
                failures: MemoryCollection::new(),
                permits,
                last_fetch: Mutex::new(None),
                snapshot: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn reporting_currency(&self) -> &str {
        self.inner.rates.reporting_currency()
    }

    pub fn rates(&self) -> &ExchangeRateService {
        &self.inner.rates
    }

    /// Prices `symbols` in the reporting currency.
    ///
    /// The result holds at most one record per distinct symbol and may hold
    /// fewer: symbols that cannot be resolved or fetched are left out. Only
    /// an empty request is an error.
    ///
    /// Per-symbol work runs on spawned tasks, so dropping the returned
    /// future does not cancel fetches already in flight; they still
    /// populate the cache.
    pub async fn get_prices<S: AsRef<str>>(
        &self,
        symbols: &[S],
    ) -> Result<Vec<PriceRecord>, BatchError> {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        let requested = symbols.len();

        let mut records = Vec::with_capacity(requested);
        let mut misses = Vec::new();
        for symbol in symbols {
            match self.inner.cache.get(&symbol).await {
                Some(quote) => records.push(PriceRecord::from(&quote)),
                None => misses.push(symbol),
            }
        }
        debug!(hits = records.len(), misses = misses.len(), "Partitioned batch");

        let mut pending = Vec::with_capacity(misses.len());
        for symbol in misses {
            if self.inner.is_known_failure(&symbol).await {
                debug!(symbol = %symbol, "Skipping recently failed symbol");
            } else {
                pending.push(symbol);
            }
        }

        if pending.is_empty() {
            self.inner.remember(&records);
            return Ok(records);
        }

        if !self.inner.try_start_fetch_round() {
            info!(
                pending = pending.len(),
                "Batch within minimum interval, serving last known prices"
            );
            let snapshot = self.inner.snapshot.lock().unwrap_or_else(|e| e.into_inner());
            records.extend(pending.iter().filter_map(|s| snapshot.get(s).cloned()));
            return Ok(records);
        }
        self.inner.rates.reset_fallbacks();

        let halted = Arc::new(AtomicBool::new(false));
        let tasks = pending.into_iter().map(|symbol| {
            let inner = Arc::clone(&self.inner);
            let halted = Arc::clone(&halted);
            tokio::spawn(async move { inner.refresh_symbol(symbol, &halted).await })
        });

        for result in join_all(tasks).await {
            match result {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Symbol task failed"),
            }
        }

        info!(
            requested,
            returned = records.len(),
            "Returning prices"
        );
        self.inner.remember(&records);
        Ok(records)
    }

    /// Drops cached quotes, stored rates and in-process state.
    pub async fn clear_cache(&self) -> anyhow::Result<()> {
        self.inner.cache.clear().await?;
        self.inner.rates.clear().await?;
        self.inner.failures.clear().await?;
        self.inner
            .snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}

impl Inner {
    async fn refresh_symbol(&self, symbol: String, halted: &AtomicBool) -> Option<PriceRecord> {
        let _permit = self.permits.acquire().await.ok()?;
        if halted.load(Ordering::SeqCst) {
            debug!(symbol = %symbol, "Skipping fetch after rate limit");
            return None;
        }

        let (identifier, fetched) = match self.resolver.resolve(&symbol).await {
            Ok(Some(Resolved { identifier, quote })) => (identifier, quote),
            Ok(None) => {
                self.record_failure(&symbol).await;
                return None;
            }
            Err(e) => {
                self.halt(halted, &symbol, &e);
                return None;
            }
        };

        // A fresh resolution already fetched the quote.
        let raw = match fetched {
            Some(raw) => raw,
            None => match self.fetcher.fetch_quote(&identifier).await {
                Ok(raw) => raw,
                Err(e) if e.is_rate_limited() => {
                    self.halt(halted, &symbol, &e);
                    return None;
                }
                Err(e) => {
                    warn!(symbol = %symbol, identifier = %identifier, error = %e, "Failed to fetch quote");
                    self.resolver.forget(&symbol).await;
                    self.record_failure(&symbol).await;
                    return None;
                }
            },
        };

        let quote = NativeQuote::from_raw(raw, &self.options.default_currency);
        if quote.currency_assumed {
            warn!(
                symbol = %symbol,
                identifier = %identifier,
                currency = %quote.currency,
                "Quote has no currency, assuming default; review this symbol"
            );
        }

        let rate = self.rates.rate_to_reporting(&quote.currency).await;
        let cached = CachedQuote::convert(&symbol, &quote, rate, Utc::now());
        if let Err(e) = self.cache.put(&cached).await {
            warn!(symbol = %symbol, error = %e, "Returning price that could not be cached");
        }

        debug!(
            symbol = %symbol,
            identifier = %identifier,
            native_price = cached.native_price,
            currency = %cached.native_currency,
            rate,
            price = cached.reporting_price,
            "Fetched fresh price"
        );
        Some(PriceRecord::from(&cached))
    }

    fn halt(&self, halted: &AtomicBool, symbol: &str, error: &QuoteError) {
        if !halted.swap(true, Ordering::SeqCst) {
            warn!(
                symbol,
                vendor = self.fetcher.name(),
                error = %error,
                "Quote vendor rate limit reached, skipping remaining fetches"
            );
        }
    }

    async fn record_failure(&self, symbol: &str) {
        if let Some(ttl) = self.options.negative_ttl {
            let _ = self.failures.put(symbol.as_bytes(), b"1", Some(ttl)).await;
        }
    }

    async fn is_known_failure(&self, symbol: &str) -> bool {
        if self.options.negative_ttl.is_none() {
            return false;
        }
        matches!(self.failures.get(symbol.as_bytes()).await, Ok(Some(_)))
    }

    /// Returns true and stamps the round if enough time has passed since
    /// the last batch that reached upstream.
    fn try_start_fetch_round(&self) -> bool {
        let interval = self.options.min_batch_interval;
        let mut last_fetch = self.last_fetch.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if let Some(previous) = *last_fetch {
            if !interval.is_zero() && now.duration_since(previous) < interval {
                return false;
            }
        }
        *last_fetch = Some(now);
        true
    }

    fn remember(&self, records: &[PriceRecord]) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        for record in records {
            snapshot.insert(record.symbol.clone(), record.clone());
        }
    }
}
