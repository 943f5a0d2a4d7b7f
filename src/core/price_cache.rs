use crate::core::cache::KeyValueCollection;
use crate::core::price::CachedQuote;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Converted quotes keyed by canonical symbol, with a freshness window.
pub struct PriceCache {
    collection: Arc<dyn KeyValueCollection>,
    freshness_window: Duration,
}

impl PriceCache {
    pub fn new(collection: Arc<dyn KeyValueCollection>, freshness_window: Duration) -> Self {
        Self {
            collection,
            freshness_window,
        }
    }

    /// Returns the cached quote if it is younger than the freshness window.
    /// An unreadable store counts as a miss.
    pub async fn get(&self, symbol: &str) -> Option<CachedQuote> {
        let bytes = match self.collection.get(symbol.as_bytes()).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(symbol, error = %e, "Price cache unavailable, treating as miss");
                return None;
            }
        };

        let quote: CachedQuote = match serde_json::from_slice(&bytes) {
            Ok(quote) => quote,
            Err(e) => {
                warn!(symbol, error = %e, "Ignoring unreadable cached quote");
                return None;
            }
        };

        if self.is_fresh(&quote, Utc::now()) {
            debug!(symbol, last_updated = %quote.last_updated, "Fresh cached quote");
            Some(quote)
        } else {
            debug!(symbol, last_updated = %quote.last_updated, "Cached quote is stale");
            None
        }
    }

    /// Upserts `quote` under its symbol. Entries never expire on their own;
    /// a refresh overwrites them.
    pub async fn put(&self, quote: &CachedQuote) -> Result<()> {
        let bytes = serde_json::to_vec(quote)?;
        self.collection
            .put(quote.symbol.as_bytes(), &bytes, None)
            .await
            .with_context(|| format!("Failed to cache quote for {}", quote.symbol))
    }

    pub fn is_fresh(&self, quote: &CachedQuote, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(quote.last_updated).to_std() {
            Ok(age) => age < self.freshness_window,
            // Timestamps slightly in the future come from clock skew
            Err(_) => true,
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.collection.clear().await
    }
}
