use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// Process-local collection backed by a `HashMap` behind a mutex.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<HashMap<Vec<u8>, CacheValue>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut cache = self.inner.lock().await;
        if let Some(entry) = cache.get(key) {
            if let Some(expiry) = entry.expires_at {
                if expiry <= Instant::now() {
                    debug!(key = %String::from_utf8_lossy(key), "Cache entry expired");
                    cache.remove(key);
                    return Ok(None);
                }
            }
            debug!(key = %String::from_utf8_lossy(key), "Cache HIT");
            return Ok(Some(entry.value.clone()));
        }
        debug!(key = %String::from_utf8_lossy(key), "Cache MISS");
        Ok(None)
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let entry = CacheValue {
            value: value.to_vec(),
            expires_at: ttl.map(|duration| Instant::now() + duration),
        };

        let mut cache = self.inner.lock().await;
        debug!(key = %String::from_utf8_lossy(key), "Cache PUT");
        cache.insert(key.to_vec(), entry);
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        let mut cache = self.inner.lock().await;
        cache.remove(key);
        debug!(key = %String::from_utf8_lossy(key), "Cache REMOVE");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut cache = self.inner.lock().await;
        cache.clear();
        debug!("Cache CLEAR");
        Ok(())
    }
}
