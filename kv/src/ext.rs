//! Redis-style structured values on top of [`KVStore`].
//!
//! Value encodings:
//!
//! ```text
//! counter -> decimal ASCII ("42")
//! hash    -> JSON object of strings {"title":"Dune","pages":"412"}
//! set     -> JSON array of unique strings, sorted ["1","7"]
//! ```
//!
//! Like Redis, a hash or set that becomes empty is removed from the store,
//! so "key exists" and "collection is non-empty" are the same question.
//! Every helper is one [`KVStore::update`] call and therefore atomic.

use std::collections::{BTreeMap, BTreeSet};

use crate::{KVError, KVResult, KVStore};

fn decode_counter(raw: Option<&[u8]>) -> KVResult<i64> {
    match raw {
        None => Ok(0),
        Some(data) => std::str::from_utf8(data)
            .map_err(|e| KVError::Serialization(e.to_string()))?
            .parse::<i64>()
            .map_err(|e| KVError::Serialization(e.to_string())),
    }
}

fn decode_hash(raw: Option<&[u8]>) -> KVResult<BTreeMap<String, String>> {
    match raw {
        None => Ok(BTreeMap::new()),
        Some(data) => {
            serde_json::from_slice(data).map_err(|e| KVError::Serialization(e.to_string()))
        }
    }
}

fn decode_set(raw: Option<&[u8]>) -> KVResult<BTreeSet<String>> {
    match raw {
        None => Ok(BTreeSet::new()),
        Some(data) => {
            serde_json::from_slice(data).map_err(|e| KVError::Serialization(e.to_string()))
        }
    }
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> KVResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| KVError::Serialization(e.to_string()))
}

/// Counter, hash and set operations available on every [`KVStore`].
pub trait KVExt: KVStore {
    /// Whether the key holds any value.
    fn exists(&self, key: &str) -> KVResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Increment the counter at `key` by one and return the new value.
    /// A missing counter starts at zero, so the first call returns 1.
    fn incr(&self, key: &str) -> KVResult<i64> {
        self.incr_by(key, 1)
    }

    /// Add `delta` to the counter at `key` and return the new value.
    fn incr_by(&self, key: &str, delta: i64) -> KVResult<i64> {
        let mut next = 0;
        self.update(key, &mut |cur| {
            next = decode_counter(cur)? + delta;
            Ok(Some(next.to_string().into_bytes()))
        })?;
        Ok(next)
    }

    /// Read a single hash field.
    fn hget(&self, key: &str, field: &str) -> KVResult<Option<String>> {
        let raw = self.get(key)?;
        Ok(decode_hash(raw.as_deref())?.remove(field))
    }

    /// Read every field of a hash. Missing keys read as an empty map.
    fn hgetall(&self, key: &str) -> KVResult<BTreeMap<String, String>> {
        let raw = self.get(key)?;
        decode_hash(raw.as_deref())
    }

    /// Whether the hash at `key` has `field`.
    fn hexists(&self, key: &str, field: &str) -> KVResult<bool> {
        Ok(self.hget(key, field)?.is_some())
    }

    /// Set one hash field, creating the hash if needed.
    fn hset(&self, key: &str, field: &str, value: &str) -> KVResult<()> {
        self.update(key, &mut |cur| {
            let mut map = decode_hash(cur)?;
            map.insert(field.to_string(), value.to_string());
            Ok(Some(encode(&map)?))
        })
    }

    /// Set several hash fields at once.
    fn hset_many(&self, key: &str, fields: &[(&str, &str)]) -> KVResult<()> {
        self.update(key, &mut |cur| {
            let mut map = decode_hash(cur)?;
            for (field, value) in fields {
                map.insert(field.to_string(), value.to_string());
            }
            Ok(Some(encode(&map)?))
        })
    }

    /// Remove a hash field. Returns whether it was present.
    fn hdel(&self, key: &str, field: &str) -> KVResult<bool> {
        let mut removed = false;
        self.update(key, &mut |cur| {
            let mut map = decode_hash(cur)?;
            removed = map.remove(field).is_some();
            if map.is_empty() {
                Ok(None)
            } else {
                Ok(Some(encode(&map)?))
            }
        })?;
        Ok(removed)
    }

    /// Add `delta` to an integer hash field and return the new value.
    /// A missing field counts as zero. Like Redis, a field that reaches
    /// zero is kept; callers that want it gone follow up with [`KVExt::hdel`].
    fn hincr_by(&self, key: &str, field: &str, delta: i64) -> KVResult<i64> {
        let mut next = 0;
        self.update(key, &mut |cur| {
            let mut map = decode_hash(cur)?;
            next = decode_counter(map.get(field).map(|v| v.as_bytes()))? + delta;
            map.insert(field.to_string(), next.to_string());
            Ok(Some(encode(&map)?))
        })?;
        Ok(next)
    }

    /// Add a member to a set. Returns whether it was newly inserted.
    fn sadd(&self, key: &str, member: &str) -> KVResult<bool> {
        let mut added = false;
        self.update(key, &mut |cur| {
            let mut set = decode_set(cur)?;
            added = set.insert(member.to_string());
            Ok(Some(encode(&set)?))
        })?;
        Ok(added)
    }

    /// Remove a member from a set and return the remaining cardinality.
    /// The key is deleted once the set is empty.
    fn srem(&self, key: &str, member: &str) -> KVResult<usize> {
        let mut remaining = 0;
        self.update(key, &mut |cur| {
            let mut set = decode_set(cur)?;
            set.remove(member);
            remaining = set.len();
            if set.is_empty() {
                Ok(None)
            } else {
                Ok(Some(encode(&set)?))
            }
        })?;
        Ok(remaining)
    }

    /// Every member of a set. Missing keys read as an empty set.
    fn smembers(&self, key: &str) -> KVResult<BTreeSet<String>> {
        let raw = self.get(key)?;
        decode_set(raw.as_deref())
    }

    /// Whether `member` is in the set at `key`.
    fn sismember(&self, key: &str, member: &str) -> KVResult<bool> {
        Ok(self.smembers(key)?.contains(member))
    }

    /// Number of members in a set.
    fn scard(&self, key: &str) -> KVResult<usize> {
        Ok(self.smembers(key)?.len())
    }
}

impl<S: KVStore + ?Sized> KVExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[test]
    fn test_incr_starts_at_one() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("book_id_counter").unwrap(), 1);
        assert_eq!(store.incr("book_id_counter").unwrap(), 2);
        assert_eq!(store.incr_by("book_id_counter", 10).unwrap(), 12);
        assert_eq!(store.get("book_id_counter").unwrap(), Some(b"12".to_vec()));
    }

    #[test]
    fn test_incr_rejects_garbage() {
        let store = MemoryStore::new();
        store.set("c", b"not a number").unwrap();
        assert!(matches!(store.incr("c"), Err(KVError::Serialization(_))));
    }

    #[test]
    fn test_hash_fields() {
        let store = MemoryStore::new();
        store
            .hset_many("book:1", &[("title", "Dune"), ("pages", "412")])
            .unwrap();
        store.hset("book:1", "title", "Dune Messiah").unwrap();

        assert_eq!(store.hget("book:1", "title").unwrap().as_deref(), Some("Dune Messiah"));
        assert!(store.hexists("book:1", "pages").unwrap());
        assert!(!store.hexists("book:1", "isbn").unwrap());
        assert_eq!(store.hgetall("book:1").unwrap().len(), 2);
    }

    #[test]
    fn test_hdel_removes_empty_hash() {
        let store = MemoryStore::new();
        store.hset("h", "a", "1").unwrap();
        assert!(store.hdel("h", "a").unwrap());
        assert!(!store.hdel("h", "a").unwrap());
        assert!(!store.exists("h").unwrap());
    }

    #[test]
    fn test_hincr_by_counts() {
        let store = MemoryStore::new();
        assert_eq!(store.hincr_by("user:1:loans", "7", 1).unwrap(), 1);
        assert_eq!(store.hincr_by("user:1:loans", "7", 1).unwrap(), 2);
        assert_eq!(store.hincr_by("user:1:loans", "7", -2).unwrap(), 0);
        assert_eq!(store.hget("user:1:loans", "7").unwrap().as_deref(), Some("0"));

        assert!(store.hdel("user:1:loans", "7").unwrap());
        assert!(!store.exists("user:1:loans").unwrap());
    }

    #[test]
    fn test_set_members() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "2").unwrap());
        assert!(store.sadd("s", "1").unwrap());
        assert!(!store.sadd("s", "2").unwrap());

        let members: Vec<_> = store.smembers("s").unwrap().into_iter().collect();
        assert_eq!(members, vec!["1", "2"]);
        assert!(store.sismember("s", "1").unwrap());
        assert_eq!(store.scard("s").unwrap(), 2);
    }

    #[test]
    fn test_srem_deletes_empty_set() {
        let store = MemoryStore::new();
        store.sadd("s", "1").unwrap();
        store.sadd("s", "2").unwrap();
        assert_eq!(store.srem("s", "1").unwrap(), 1);
        assert_eq!(store.srem("s", "2").unwrap(), 0);
        assert!(!store.exists("s").unwrap());
        assert_eq!(store.srem("missing", "x").unwrap(), 0);
        assert!(!store.exists("missing").unwrap());
    }

    #[test]
    fn test_ext_on_trait_object() {
        let store: Box<dyn KVStore> = Box::new(MemoryStore::new());
        store.sadd("s", "a").unwrap();
        assert_eq!(store.scard("s").unwrap(), 1);
    }
}
