//! Key-value storage abstractions shared by the quote and rate caches

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A named bucket of raw key/value pairs.
///
/// Implementations must make `put` an atomic upsert: concurrent writers to
/// the same key never leave a partially written value behind, the last
/// write wins.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    /// Returns the value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Inserts or replaces the value for `key`. A `ttl` of `None` keeps the
    /// entry until it is overwritten or removed.
    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()>;

    async fn remove(&self, key: &[u8]) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Hands out named collections, either persisted or process-local.
pub trait Store: Send + Sync {
    /// Returns the collection `name`, creating it on first use. Returns
    /// `None` if a persistent collection was requested but the backing
    /// store is unavailable.
    fn get_collection(&self, name: &str, persist: bool) -> Option<Arc<dyn KeyValueCollection>>;
}
