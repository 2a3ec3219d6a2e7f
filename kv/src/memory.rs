//! In-memory key-value store implementation for testing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{KVError, KVResult, KVStore, UpdateFn};

/// An in-memory key-value store backed by an ordered map.
///
/// Clones share the same underlying data, which makes it possible to hand
/// one store to several backends in tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys in order. Handy for asserting that nothing was left behind.
    pub fn keys(&self) -> KVResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn lock(&self) -> KVResult<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.data
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))
    }
}

impl KVStore for MemoryStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> KVResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let data = self.lock()?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()> {
        let mut data = self.lock()?;
        for (key, value) in entries {
            data.insert(key.to_string(), value.to_vec());
        }
        Ok(())
    }

    fn batch_delete(&self, keys: &[&str]) -> KVResult<()> {
        let mut data = self.lock()?;
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> KVResult<()> {
        let mut data = self.lock()?;
        match f(data.get(key).map(|v| v.as_slice()))? {
            Some(value) => {
                data.insert(key.to_string(), value);
            }
            None => {
                data.remove(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let store = MemoryStore::new();

        store.set("key1", b"value1").unwrap();
        assert_eq!(store.get("key1").unwrap(), Some(b"value1".to_vec()));

        assert_eq!(store.get("nonexistent").unwrap(), None);

        store.delete("key1").unwrap();
        assert_eq!(store.get("key1").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_scan() {
        let store = MemoryStore::new();
        store.set("book:1", b"1").unwrap();
        store.set("book:2", b"2").unwrap();
        store.set("book_id_counter", b"2").unwrap();
        store.set("user:1", b"3").unwrap();

        let results = store.scan("book:").unwrap();
        let keys: Vec<_> = results.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["book:1", "book:2"]);
    }

    #[test]
    fn test_batch_operations() {
        let store = MemoryStore::new();

        store
            .batch_set(&[("key1", b"value1"), ("key2", b"value2")])
            .unwrap();
        assert_eq!(store.len(), 2);

        store.batch_delete(&["key1", "key2"]).unwrap();
        assert_eq!(store.get("key1").unwrap(), None);
        assert_eq!(store.get("key2").unwrap(), None);
    }

    #[test]
    fn test_update_insert_and_remove() {
        let store = MemoryStore::new();

        store
            .update("k", &mut |cur| {
                assert!(cur.is_none());
                Ok(Some(b"a".to_vec()))
            })
            .unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"a".to_vec()));

        store.update("k", &mut |_| Ok(None)).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_update_error_leaves_value() {
        let store = MemoryStore::new();
        store.set("k", b"keep").unwrap();

        let result = store.update("k", &mut |_| Err(KVError::Serialization("bad".into())));
        assert!(result.is_err());
        assert_eq!(store.get("k").unwrap(), Some(b"keep".to_vec()));
    }

    #[test]
    fn test_clones_share_data() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set("x", b"1").unwrap();
        assert_eq!(b.get("x").unwrap(), Some(b"1".to_vec()));
    }
}
