use std::collections::BTreeMap;

use shelf_kv::{KVExt, KVStore};

use super::keys;
use crate::error::{Ack, EntityKind, LibraryError, Result};

/// A record as stored: field name -> string value.
pub(crate) type Record = BTreeMap<String, String>;

/// Record storage addressed by generated sequential ids.
pub(crate) struct EntityStore<'a> {
    store: &'a dyn KVStore,
    kind: EntityKind,
}

impl<'a> EntityStore<'a> {
    pub(crate) fn new(store: &'a dyn KVStore, kind: EntityKind) -> Self {
        Self { store, kind }
    }

    /// Allocate the next id and write the record under it.
    pub(crate) fn create(&self, fields: &[(&str, &str)]) -> Result<u64> {
        let id = self
            .store
            .incr(&keys::id_counter_key(self.kind))
            .ack("allocate id")?;
        let id = u64::try_from(id).map_err(|_| LibraryError::Backend(format!("bad id {id}")))?;

        let key = keys::record_key(self.kind, id);
        if self.store.exists(&key)? {
            return Err(LibraryError::already_exists(self.kind, &id.to_string()));
        }
        self.store.hset_many(&key, fields).ack("write record")?;
        self.store
            .sadd(&keys::ids_key(self.kind), &id.to_string())
            .ack("register id")?;
        Ok(id)
    }

    pub(crate) fn get(&self, id: u64) -> Result<Option<Record>> {
        let record = self.store.hgetall(&keys::record_key(self.kind, id))?;
        Ok((!record.is_empty()).then_some(record))
    }

    pub(crate) fn field(&self, id: u64, field: &str) -> Result<Option<String>> {
        Ok(self.store.hget(&keys::record_key(self.kind, id), field)?)
    }

    pub(crate) fn update(&self, id: u64, field: &str, value: &str) -> Result<()> {
        let key = keys::record_key(self.kind, id);
        if !self.store.exists(&key)? {
            return Err(LibraryError::not_found(self.kind, &id.to_string()));
        }
        self.store.hset(&key, field, value).ack("write field")
    }

    pub(crate) fn delete(&self, id: u64) -> Result<()> {
        let key = keys::record_key(self.kind, id);
        if !self.store.exists(&key)? {
            return Err(LibraryError::not_found(self.kind, &id.to_string()));
        }
        self.store.delete(&key).ack("delete record")?;
        self.store
            .srem(&keys::ids_key(self.kind), &id.to_string())
            .ack("unregister id")?;
        Ok(())
    }

    /// Every live id, ascending.
    pub(crate) fn ids(&self) -> Result<Vec<u64>> {
        let mut ids: Vec<u64> = self
            .store
            .smembers(&keys::ids_key(self.kind))?
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Read a required field from a record.
pub(crate) fn required<'r>(record: &'r Record, field: &str) -> Result<&'r str> {
    record
        .get(field)
        .map(String::as_str)
        .ok_or_else(|| LibraryError::Backend(format!("record is missing {field:?}")))
}

/// Parse a required numeric field from a record.
pub(crate) fn required_num<T: std::str::FromStr>(record: &Record, field: &str) -> Result<T> {
    required(record, field)?
        .parse()
        .map_err(|_| LibraryError::Backend(format!("record field {field:?} is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_kv::MemoryStore;

    #[test]
    fn test_ids_are_sequential_and_not_reused() {
        let store = MemoryStore::new();
        let books = EntityStore::new(&store, EntityKind::Book);

        assert_eq!(books.create(&[("title", "A")]).unwrap(), 1);
        assert_eq!(books.create(&[("title", "B")]).unwrap(), 2);
        books.delete(2).unwrap();
        assert_eq!(books.create(&[("title", "C")]).unwrap(), 3);
        assert_eq!(books.ids().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_update_and_delete_missing() {
        let store = MemoryStore::new();
        let users = EntityStore::new(&store, EntityKind::User);

        assert!(matches!(users.update(9, "name", "x"), Err(LibraryError::NotFound { .. })));
        assert!(matches!(users.delete(9), Err(LibraryError::NotFound { .. })));

        let id = users.create(&[("name", "Al")]).unwrap();
        users.update(id, "name", "Alan").unwrap();
        assert_eq!(users.field(id, "name").unwrap().as_deref(), Some("Alan"));
        assert!(users.get(id).unwrap().is_some());

        users.delete(id).unwrap();
        assert!(users.get(id).unwrap().is_none());
        assert!(!store.exists("user_ids").unwrap());
    }
}
