use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::{validate_key, ObjectStore, WalkControl, WalkQuery};

/// In-memory, `BTreeMap`-based object store.
///
/// Intended for tests and embedding. Objects are held behind a `RwLock` and
/// cloned on read/write. The map keeps keys ordered, which gives `walk` its
/// ascending order for free.
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn walk(
        &self,
        query: &WalkQuery,
        visit: &mut dyn FnMut(&str) -> StoreResult<WalkControl>,
    ) -> StoreResult<()> {
        // Snapshot the selection so visitors may call back into the store.
        let selected: Vec<String> = {
            let map = self.objects.read().expect("lock poisoned");
            let lower = match &query.start_at {
                Some(start) if start.as_str() > query.prefix.as_str() => start.clone(),
                _ => query.prefix.clone(),
            };
            map.range(lower..)
                .map(|(k, _)| k)
                .take_while(|k| k.starts_with(&query.prefix))
                .filter(|k| query.matches(k))
                .cloned()
                .collect()
        };
        for key in &selected {
            if visit(key)? == WalkControl::Stop {
                break;
            }
        }
        Ok(())
    }

    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn write(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        let mut map = self.objects.write().expect("lock poisoned");
        map.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}
