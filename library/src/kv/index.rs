//! Secondary indexes: one bucket of ids per (field, value).
//!
//! Each indexed field keeps a tracking map from raw value to bucket key.
//! Buckets are created on first insertion and deleted, together with their
//! tracking entry, as soon as they become empty.

use std::collections::BTreeSet;

use shelf_kv::{KVExt, KVStore};
use tracing::debug;

use super::keys;
use crate::error::{Ack, EntityKind, Result};
use crate::model::Tag;

pub(crate) struct IndexManager<'a> {
    store: &'a dyn KVStore,
    kind: EntityKind,
    tag: Tag,
}

impl<'a> IndexManager<'a> {
    pub(crate) fn new(store: &'a dyn KVStore, kind: EntityKind, tag: Tag) -> Self {
        Self { store, kind, tag }
    }

    /// Bucket key for `value`, allocating and registering a new bucket when
    /// none exists.
    ///
    /// Check-then-create: two processes racing on the same new value can
    /// each allocate a bucket, and the later tracking write wins. Ids added
    /// to the losing bucket are then invisible to lookups.
    pub(crate) fn ensure_bucket(&self, field: &str, value: &str) -> Result<String> {
        let tracking = keys::tracking_key(field, self.kind);
        if let Some(bucket) = self.store.hget(&tracking, value)? {
            return Ok(bucket);
        }

        let n = self
            .store
            .incr(&keys::bucket_counter_key(field, self.kind))
            .ack("allocate bucket")?;
        let bucket = keys::bucket_key(field, value, self.kind, n);
        self.store
            .hset(&tracking, value, &bucket)
            .ack("register bucket")?;
        debug!(tag = %self.tag, field, value, bucket = %bucket, "created bucket");
        Ok(bucket)
    }

    pub(crate) fn add_to_bucket(&self, field: &str, value: &str, id: u64) -> Result<()> {
        let bucket = self.ensure_bucket(field, value)?;
        self.store
            .sadd(&bucket, &id.to_string())
            .ack("add to bucket")?;
        debug!(tag = %self.tag, field, value, id, "indexed");
        Ok(())
    }

    pub(crate) fn remove_from_bucket(&self, field: &str, value: &str, id: u64) -> Result<()> {
        let tracking = keys::tracking_key(field, self.kind);
        let Some(bucket) = self.store.hget(&tracking, value)? else {
            return Ok(());
        };

        let remaining = self
            .store
            .srem(&bucket, &id.to_string())
            .ack("remove from bucket")?;
        debug!(tag = %self.tag, field, value, id, remaining, "unindexed");
        if remaining == 0 {
            self.store.delete(&bucket).ack("delete bucket")?;
            self.store
                .hdel(&tracking, value)
                .ack("unregister bucket")?;
            debug!(tag = %self.tag, field, value, bucket = %bucket, "deleted empty bucket");
        }
        Ok(())
    }

    /// Move `id` from the `old` bucket to the `new` one. Equal values are a
    /// no-op, so the bucket is never emptied and recreated.
    pub(crate) fn rebind(&self, field: &str, old: &str, new: &str, id: u64) -> Result<()> {
        if old == new {
            return Ok(());
        }
        self.remove_from_bucket(field, old, id)?;
        self.add_to_bucket(field, new, id)
    }

    /// Rebind a multi-valued field element by element. Values present in
    /// both lists keep their membership untouched.
    pub(crate) fn rebind_many(&self, field: &str, old: &[String], new: &[String], id: u64) -> Result<()> {
        let old: BTreeSet<&str> = old.iter().map(String::as_str).collect();
        let new: BTreeSet<&str> = new.iter().map(String::as_str).collect();
        for value in old.difference(&new) {
            self.remove_from_bucket(field, value, id)?;
        }
        for value in new.difference(&old) {
            self.add_to_bucket(field, value, id)?;
        }
        Ok(())
    }

    /// Ids holding `value`; empty when there is no bucket.
    pub(crate) fn lookup(&self, field: &str, value: &str) -> Result<BTreeSet<u64>> {
        let tracking = keys::tracking_key(field, self.kind);
        let Some(bucket) = self.store.hget(&tracking, value)? else {
            return Ok(BTreeSet::new());
        };
        Ok(self
            .store
            .smembers(&bucket)?
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect())
    }

    /// Ids holding every one of `values`.
    pub(crate) fn lookup_all(&self, field: &str, values: &[String]) -> Result<BTreeSet<u64>> {
        let mut values = values.iter();
        let Some(first) = values.next() else {
            return Ok(BTreeSet::new());
        };
        let mut ids = self.lookup(field, first)?;
        for value in values {
            if ids.is_empty() {
                break;
            }
            let next = self.lookup(field, value)?;
            ids.retain(|id| next.contains(id));
        }
        Ok(ids)
    }

    /// The single id holding a unique value, if any.
    pub(crate) fn lookup_unique(&self, field: &str, value: &str) -> Result<Option<u64>> {
        Ok(self.lookup(field, value)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_kv::MemoryStore;

    fn index(store: &MemoryStore) -> IndexManager<'_> {
        IndexManager::new(store, EntityKind::Book, Tag::Add)
    }

    #[test]
    fn test_bucket_created_lazily_and_reused() {
        let store = MemoryStore::new();
        let idx = index(&store);

        idx.add_to_bucket("title", "Dune", 1).unwrap();
        idx.add_to_bucket("title", "Dune", 2).unwrap();
        assert_eq!(
            store.hget("title:book_set", "Dune").unwrap().as_deref(),
            Some("title:Dune:book_set1")
        );
        assert_eq!(idx.lookup("title", "Dune").unwrap(), BTreeSet::from([1, 2]));
        assert!(idx.lookup("title", "Emma").unwrap().is_empty());
    }

    #[test]
    fn test_empty_bucket_is_deleted() {
        let store = MemoryStore::new();
        let idx = index(&store);

        idx.add_to_bucket("title", "Dune", 1).unwrap();
        idx.add_to_bucket("title", "Emma", 2).unwrap();
        idx.remove_from_bucket("title", "Dune", 1).unwrap();

        assert!(!store.exists("title:Dune:book_set1").unwrap());
        assert!(!store.hexists("title:book_set", "Dune").unwrap());
        assert!(store.hexists("title:book_set", "Emma").unwrap());

        // A later insert allocates a fresh bucket number.
        idx.add_to_bucket("title", "Dune", 3).unwrap();
        assert_eq!(
            store.hget("title:book_set", "Dune").unwrap().as_deref(),
            Some("title:Dune:book_set3")
        );
    }

    #[test]
    fn test_rebind_same_value_is_noop() {
        let store = MemoryStore::new();
        let idx = index(&store);

        idx.add_to_bucket("title", "Dune", 1).unwrap();
        idx.rebind("title", "Dune", "Dune", 1).unwrap();
        assert_eq!(
            store.hget("title:book_set", "Dune").unwrap().as_deref(),
            Some("title:Dune:book_set1")
        );

        idx.rebind("title", "Dune", "Dune Messiah", 1).unwrap();
        assert!(idx.lookup("title", "Dune").unwrap().is_empty());
        assert_eq!(idx.lookup("title", "Dune Messiah").unwrap(), BTreeSet::from([1]));
        assert!(!store.hexists("title:book_set", "Dune").unwrap());
    }

    #[test]
    fn test_rebind_many_keeps_shared_values() {
        let store = MemoryStore::new();
        let idx = index(&store);
        let old = vec!["Herbert".to_string(), "Anderson".to_string()];
        let new = vec!["Herbert".to_string(), "Asimov".to_string()];

        for author in &old {
            idx.add_to_bucket("author", author, 1).unwrap();
        }
        let herbert_bucket = store.hget("author:book_set", "Herbert").unwrap();

        idx.rebind_many("author", &old, &new, 1).unwrap();
        assert_eq!(store.hget("author:book_set", "Herbert").unwrap(), herbert_bucket);
        assert!(idx.lookup("author", "Anderson").unwrap().is_empty());
        assert_eq!(idx.lookup("author", "Asimov").unwrap(), BTreeSet::from([1]));
    }

    #[test]
    fn test_lookup_all_intersects() {
        let store = MemoryStore::new();
        let idx = index(&store);
        idx.add_to_bucket("author", "A", 1).unwrap();
        idx.add_to_bucket("author", "B", 1).unwrap();
        idx.add_to_bucket("author", "A", 2).unwrap();

        let both = vec!["A".to_string(), "B".to_string()];
        assert_eq!(idx.lookup_all("author", &both).unwrap(), BTreeSet::from([1]));
        assert!(idx.lookup_all("author", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_remove_without_bucket_is_ok() {
        let store = MemoryStore::new();
        index(&store).remove_from_bucket("title", "Nothing", 1).unwrap();
        assert!(store.is_empty());
    }
}
