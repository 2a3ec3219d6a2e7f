//! Redb-based persistent key-value store implementation.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::{KVError, KVResult, KVStore, UpdateFn};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("shelf");

fn storage<E: ToString>(e: E) -> KVError {
    KVError::Storage(e.to_string())
}

/// A persistent key-value store backed by redb.
///
/// Each call runs in its own redb transaction, so single-key writes and
/// [`KVStore::update`] are atomic with respect to other processes.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> KVResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(storage)?;
            }
        }
        let db = Database::create(path).map_err(storage)?;

        // Create the table if it doesn't exist
        let tx = db.begin_write().map_err(storage)?;
        {
            let _ = tx.open_table(TABLE).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        Ok(Self { db })
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(TABLE).map_err(storage)?;
        let value = table.get(key).map_err(storage)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        self.batch_set(&[(key, value)])
    }

    fn delete(&self, key: &str) -> KVResult<()> {
        self.batch_delete(&[key])
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(TABLE).map_err(storage)?;

        let mut results = Vec::new();
        for item in table.iter().map_err(storage)? {
            let (key, value) = item.map_err(storage)?;
            let key_str = key.value();
            if key_str.starts_with(prefix) {
                results.push((key_str.to_string(), value.value().to_vec()));
            }
        }
        Ok(results)
    }

    fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()> {
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(TABLE).map_err(storage)?;
            for (key, value) in entries {
                table.insert(*key, *value).map_err(storage)?;
            }
        }
        tx.commit().map_err(storage)
    }

    fn batch_delete(&self, keys: &[&str]) -> KVResult<()> {
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(TABLE).map_err(storage)?;
            for key in keys {
                table.remove(*key).map_err(storage)?;
            }
        }
        tx.commit().map_err(storage)
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> KVResult<()> {
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(TABLE).map_err(storage)?;
            let current = table
                .get(key)
                .map_err(storage)?
                .map(|v| v.value().to_vec());
            // An error from `f` drops the transaction without committing.
            match f(current.as_deref())? {
                Some(value) => {
                    table.insert(key, value.as_slice()).map_err(storage)?;
                }
                None => {
                    table.remove(key).map_err(storage)?;
                }
            }
        }
        tx.commit().map_err(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KVExt;
    use tempfile::tempdir;

    #[test]
    fn test_redb_basic() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.set("key1", b"value1").unwrap();
        assert_eq!(store.get("key1").unwrap(), Some(b"value1".to_vec()));

        store.delete("key1").unwrap();
        assert_eq!(store.get("key1").unwrap(), None);
    }

    #[test]
    fn test_redb_scan() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.set("book:1", b"1").unwrap();
        store.set("book:2", b"2").unwrap();
        store.set("user:1", b"3").unwrap();

        let results = store.scan("book:").unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_redb_creates_parent_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("data").join("kv.redb");
        let store = RedbStore::open(&path).unwrap();
        store.set("k", b"v").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_redb_counter_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            assert_eq!(store.incr("book_id_counter").unwrap(), 1);
            assert_eq!(store.incr("book_id_counter").unwrap(), 2);
        }
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.incr("book_id_counter").unwrap(), 3);
    }

    #[test]
    fn test_redb_update_abort() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();
        store.set("k", b"keep").unwrap();

        let result = store.update("k", &mut |_| Err(KVError::Serialization("bad".into())));
        assert!(result.is_err());
        assert_eq!(store.get("k").unwrap(), Some(b"keep".to_vec()));
    }
}
