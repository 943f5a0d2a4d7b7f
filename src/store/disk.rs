use crate::core::cache::KeyValueCollection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::PartitionHandle;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<SystemTime>,
}

/// Collection persisted in a fjall partition.
pub struct DiskCollection {
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(partition: PartitionHandle) -> Self {
        Self { partition }
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.partition.get(key)? else {
            debug!(key = %String::from_utf8_lossy(key), "Cache MISS");
            return Ok(None);
        };

        let entry: CacheEntry =
            serde_json::from_slice(&raw).context("Corrupt cache entry in partition")?;
        if let Some(expires_at) = entry.expires_at {
            if SystemTime::now() > expires_at {
                debug!(key = %String::from_utf8_lossy(key), "Cache entry expired");
                self.partition.remove(key)?;
                return Ok(None);
            }
        }
        debug!(key = %String::from_utf8_lossy(key), "Cache HIT");
        Ok(Some(entry.value))
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: ttl.map(|d| SystemTime::now() + d),
        };
        self.partition.insert(key, serde_json::to_vec(&entry)?)?;
        debug!(key = %String::from_utf8_lossy(key), "Cache PUT");
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        self.partition.remove(key)?;
        debug!(key = %String::from_utf8_lossy(key), "Cache REMOVE");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let keys = self
            .partition
            .iter()
            .map(|kv| kv.map(|(key, _)| key))
            .collect::<Result<Vec<_>, _>>()?;
        for key in keys {
            self.partition.remove(key)?;
        }
        debug!("Cache CLEAR");
        Ok(())
    }
}
