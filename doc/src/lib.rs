//! JSON document collections on top of a [`KVStore`].
//!
//! Each collection stores one JSON object per natural key (an isbn, a
//! username) and assigns a sequential `_id` on insert. Queries scan the
//! collection and evaluate a [`Filter`]; updates are applied atomically per
//! document through [`KVStore::update`], guarded by a filter the way a
//! conditional `update_one` would be.
//!
//! KV key layout:
//!
//! ```text
//! {prefix}:{collection}:d:{key} -> JSON document
//! {prefix}:{collection}:seq     -> `_id` counter
//! ```

pub mod error;
pub mod filter;
pub mod update;

use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use shelf_kv::{KVExt, KVStore};

pub use error::DocError;
pub use filter::{FieldPath, Filter, compare_values};
pub use update::Update;

/// A stored document.
pub type Document = Map<String, Value>;

/// Field holding the generated sequential identifier.
pub const ID_FIELD: &str = "_id";

/// Owner of a set of collections sharing one store and key prefix.
pub struct DocStore {
    store: Box<dyn KVStore>,
    prefix: String,
}

impl DocStore {
    pub fn new(store: Box<dyn KVStore>, prefix: &str) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
        }
    }

    /// Handle to the named collection. Collections need no creation step.
    pub fn collection(&self, name: &str) -> Collection<'_> {
        Collection {
            store: self.store.as_ref(),
            base: format!("{}:{}", self.prefix, name),
        }
    }
}

/// Sort specification for [`Collection::find`].
#[derive(Debug, Clone)]
pub struct Sort {
    pub path: FieldPath,
    pub descending: bool,
}

impl Sort {
    pub fn asc(path: impl Into<FieldPath>) -> Self {
        Self {
            path: path.into(),
            descending: false,
        }
    }
}

/// Outcome of a guarded single-document update.
#[derive(Debug, Clone, Default)]
pub struct UpdateResult {
    /// A document with the key existed and satisfied the guard.
    pub matched: bool,
    /// At least one field actually changed.
    pub modified: bool,
    /// The document after the update, when matched.
    pub document: Option<Document>,
}

/// Outcome of a guarded single-document delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    /// No document with that key.
    Missing,
    /// The document exists but did not satisfy the guard.
    Rejected,
}

/// A named collection of JSON documents.
pub struct Collection<'a> {
    store: &'a dyn KVStore,
    base: String,
}

impl<'a> Collection<'a> {
    fn doc_key(&self, key: &str) -> String {
        format!("{}:d:{}", self.base, key)
    }

    fn doc_prefix(&self) -> String {
        format!("{}:d:", self.base)
    }

    fn seq_key(&self) -> String {
        format!("{}:seq", self.base)
    }

    /// Insert a document under `key` unless one already exists.
    ///
    /// Returns the new `_id`, or `None` when the key is taken (the existing
    /// document is left untouched, like an upsert with `$setOnInsert`).
    pub fn insert_one(&self, key: &str, mut doc: Document) -> Result<Option<u64>, DocError> {
        let doc_key = self.doc_key(key);
        if self.store.exists(&doc_key)? {
            return Ok(None);
        }

        let id = self.store.incr(&self.seq_key())?;
        doc.insert(ID_FIELD.to_string(), Value::from(id));
        let data = serde_json::to_vec(&doc)?;

        // A concurrent writer may claim the key between the check and the
        // write; the allocated id is then skipped, never reused.
        let mut inserted = false;
        self.store.update(&doc_key, &mut |cur| match cur {
            Some(existing) => Ok(Some(existing.to_vec())),
            None => {
                inserted = true;
                Ok(Some(data.clone()))
            }
        })?;
        Ok(inserted.then_some(id as u64))
    }

    /// Fetch the raw document stored under `key`.
    pub fn find_one(&self, key: &str) -> Result<Option<Document>, DocError> {
        match self.store.get(&self.doc_key(key))? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Fetch and deserialize the document stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DocError> {
        match self.find_one(key)? {
            Some(doc) => Ok(Some(serde_json::from_value(Value::Object(doc))?)),
            None => Ok(None),
        }
    }

    /// Every document matching `filter`, in `_id` order, or stably sorted by
    /// `sort` when given.
    pub fn find(&self, filter: &Filter, sort: Option<&Sort>) -> Result<Vec<Document>, DocError> {
        let mut docs = Vec::new();
        for (_, data) in self.store.scan(&self.doc_prefix())? {
            let doc: Document = serde_json::from_slice(&data)?;
            if filter.matches(&doc) {
                docs.push(doc);
            }
        }

        docs.sort_by(|a, b| compare_ids(a, b));
        if let Some(sort) = sort {
            docs.sort_by(|a, b| {
                let null = Value::Null;
                let l = sort.path.lookup(a).unwrap_or(&null);
                let r = sort.path.lookup(b).unwrap_or(&null);
                let ord = compare_values(l, r);
                if sort.descending { ord.reverse() } else { ord }
            });
        }
        Ok(docs)
    }

    /// [`Collection::find`] deserialized into `T`.
    pub fn find_as<T: DeserializeOwned>(
        &self,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<T>, DocError> {
        self.find(filter, sort)?
            .into_iter()
            .map(|doc| serde_json::from_value(Value::Object(doc)).map_err(DocError::from))
            .collect()
    }

    /// Apply `updates` to the document under `key` if it matches `guard`.
    ///
    /// The guard check and every update happen in one store transaction.
    pub fn update_one(
        &self,
        key: &str,
        guard: &Filter,
        updates: &[Update],
    ) -> Result<UpdateResult, DocError> {
        let mut result = UpdateResult::default();
        let mut failure: Option<DocError> = None;

        self.store.update(&self.doc_key(key), &mut |cur| {
            let Some(data) = cur else {
                return Ok(None);
            };
            let mut doc: Document = match serde_json::from_slice(data) {
                Ok(doc) => doc,
                Err(e) => {
                    failure = Some(e.into());
                    return Ok(Some(data.to_vec()));
                }
            };
            if !guard.matches(&doc) {
                return Ok(Some(data.to_vec()));
            }
            result.matched = true;
            for update in updates {
                match update.apply(&mut doc) {
                    Ok(changed) => result.modified |= changed,
                    Err(e) => {
                        failure = Some(e);
                        result = UpdateResult::default();
                        return Ok(Some(data.to_vec()));
                    }
                }
            }
            let encoded = serde_json::to_vec(&doc)
                .map_err(|e| shelf_kv::KVError::Serialization(e.to_string()))?;
            result.document = Some(doc);
            Ok(Some(encoded))
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }

    /// Delete the document under `key` if it matches `guard`.
    pub fn delete_one(&self, key: &str, guard: &Filter) -> Result<DeleteResult, DocError> {
        let mut outcome = DeleteResult::Missing;
        let mut failure: Option<DocError> = None;

        self.store.update(&self.doc_key(key), &mut |cur| {
            let Some(data) = cur else {
                return Ok(None);
            };
            match serde_json::from_slice::<Document>(data) {
                Ok(doc) if guard.matches(&doc) => {
                    outcome = DeleteResult::Deleted;
                    Ok(None)
                }
                Ok(_) => {
                    outcome = DeleteResult::Rejected;
                    Ok(Some(data.to_vec()))
                }
                Err(e) => {
                    failure = Some(e.into());
                    Ok(Some(data.to_vec()))
                }
            }
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Number of documents in the collection.
    pub fn count(&self) -> Result<usize, DocError> {
        Ok(self.store.scan(&self.doc_prefix())?.len())
    }
}

fn compare_ids(a: &Document, b: &Document) -> Ordering {
    let id = |d: &Document| d.get(ID_FIELD).and_then(Value::as_u64).unwrap_or(0);
    id(a).cmp(&id(b))
}
