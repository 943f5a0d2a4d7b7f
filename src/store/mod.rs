pub mod disk;
pub mod memory;

use crate::core::cache::{KeyValueCollection, Store};
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};
use tracing::{debug, warn};

/// A thread-safe key-value store that can hold multiple collections.
///
/// Persistent collections live in a fjall keyspace; when the keyspace could
/// not be opened only in-memory collections are available.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Keyspace>,
}

impl KeyValueStore {
    /// Opens (or creates) the keyspace under `path`.
    pub fn open(path: &Path) -> Self {
        let keyspace = match fjall::Config::new(path.join("cache")).open() {
            Ok(keyspace) => Some(keyspace),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open cache store, persistence disabled");
                None
            }
        };

        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace,
        }
    }

    /// A store without a backing keyspace.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.keyspace.is_some()
    }

    /// Returns the persistent collection `name`, or an in-memory one when
    /// the keyspace is unavailable.
    pub fn collection_or_memory(&self, name: &str) -> Arc<dyn KeyValueCollection> {
        self.get_collection(name, true)
            .or_else(|| {
                warn!(collection = name, "Persistent collection unavailable, using memory");
                self.get_collection(name, false)
            })
            .unwrap_or_else(|| Arc::new(MemoryCollection::new()) as Arc<dyn KeyValueCollection>)
    }

    fn open_collection(&self, name: &str, persist: bool) -> Option<Arc<dyn KeyValueCollection>> {
        if !persist {
            return Some(Arc::new(MemoryCollection::new()));
        }

        let keyspace = self.keyspace.as_ref()?;
        match keyspace.open_partition(name, PartitionCreateOptions::default()) {
            Ok(partition) => Some(Arc::new(DiskCollection::new(partition))),
            Err(e) => {
                warn!(collection = name, error = %e, "Failed to open partition");
                None
            }
        }
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn collection_key(name: &str, persist: bool) -> String {
    if persist {
        format!("disk:{name}")
    } else {
        format!("memory:{name}")
    }
}

impl Store for KeyValueStore {
    fn get_collection(&self, name: &str, persist: bool) -> Option<Arc<dyn KeyValueCollection>> {
        let key = collection_key(name, persist);
        {
            let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
            if let Some(collection) = collections.get(&key) {
                return Some(Arc::clone(collection));
            }
        }

        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        if let Some(collection) = collections.get(&key) {
            return Some(Arc::clone(collection));
        }
        let collection = self.open_collection(name, persist)?;
        debug!(collection = %key, "Created collection");
        collections.insert(key, Arc::clone(&collection));
        Some(collection)
    }
}
