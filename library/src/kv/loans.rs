use std::collections::{BTreeMap, BTreeSet};

use shelf_kv::{KVExt, KVStore};
use tracing::debug;

use super::keys;
use crate::error::{Ack, EntityKind, LibraryError, Result};
use crate::model::Tag;

/// Result of one checkout or checkin, by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoanState {
    pub count: u32,
    pub quantity: u32,
}

/// The borrowing relation between users and books, plus quantity
/// accounting on the book record.
pub(crate) struct Loans<'a> {
    store: &'a dyn KVStore,
    tag: Tag,
}

impl<'a> Loans<'a> {
    pub(crate) fn new(store: &'a dyn KVStore, tag: Tag) -> Self {
        Self { store, tag }
    }

    fn quantity(&self, book_id: u64) -> Result<i64> {
        let raw = self
            .store
            .hget(&keys::record_key(EntityKind::Book, book_id), "quantity")?
            .ok_or_else(|| LibraryError::Backend(format!("book {book_id} has no quantity")))?;
        raw.parse()
            .map_err(|_| LibraryError::Backend(format!("book {book_id} quantity {raw:?} is not a number")))
    }

    /// Lend one copy. The caller has resolved both ids; `isbn` only names
    /// the book in errors.
    pub(crate) fn checkout(&self, user_id: u64, book_id: u64, isbn: &str) -> Result<LoanState> {
        if self.quantity(book_id)? <= 0 {
            return Err(LibraryError::OutOfStock {
                isbn: isbn.to_string(),
            });
        }

        let quantity = self
            .store
            .hincr_by(&keys::record_key(EntityKind::Book, book_id), "quantity", -1)
            .ack("decrement quantity")?;
        let count = self
            .store
            .hincr_by(&keys::loans_key(user_id), &book_id.to_string(), 1)
            .ack("increment loan")?;
        self.store
            .sadd(&keys::borrowers_key(book_id), &user_id.to_string())
            .ack("record borrower")?;

        debug!(tag = %self.tag, user_id, book_id, count, quantity, "checked out");
        Ok(LoanState {
            count: clamp(count),
            quantity: clamp(quantity),
        })
    }

    /// Take one copy back, closing the loan when its count reaches zero.
    pub(crate) fn checkin(&self, user_id: u64, book_id: u64) -> Result<Option<LoanState>> {
        let loans = keys::loans_key(user_id);
        let field = book_id.to_string();
        let held: i64 = match self.store.hget(&loans, &field)? {
            Some(raw) => raw.parse().unwrap_or(0),
            None => 0,
        };
        if held <= 0 {
            return Ok(None);
        }

        let count = self.store.hincr_by(&loans, &field, -1).ack("decrement loan")?;
        if count <= 0 {
            self.store.hdel(&loans, &field).ack("close loan")?;
        }
        let quantity = self
            .store
            .hincr_by(&keys::record_key(EntityKind::Book, book_id), "quantity", 1)
            .ack("increment quantity")?;
        if count <= 0 {
            self.store
                .srem(&keys::borrowers_key(book_id), &user_id.to_string())
                .ack("release borrower")?;
        }

        debug!(tag = %self.tag, user_id, book_id, count, quantity, "checked in");
        Ok(Some(LoanState {
            count: clamp(count),
            quantity: clamp(quantity),
        }))
    }

    /// book id -> copies held by the user.
    pub(crate) fn stats_for_user(&self, user_id: u64) -> Result<BTreeMap<u64, u32>> {
        let mut out = BTreeMap::new();
        for (book, count) in self.store.hgetall(&keys::loans_key(user_id))? {
            if let (Ok(book), Ok(count)) = (book.parse::<u64>(), count.parse::<u32>()) {
                if count > 0 {
                    out.insert(book, count);
                }
            }
        }
        Ok(out)
    }

    /// Ids of users holding at least one copy of the book.
    pub(crate) fn stats_for_book(&self, book_id: u64) -> Result<BTreeSet<u64>> {
        Ok(self
            .store
            .smembers(&keys::borrowers_key(book_id))?
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect())
    }

    /// Copies of one book held by one user.
    pub(crate) fn held(&self, user_id: u64, book_id: u64) -> Result<u32> {
        Ok(self
            .store
            .hget(&keys::loans_key(user_id), &book_id.to_string())?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }

    /// Total copies a user holds across all books.
    pub(crate) fn outstanding_for_user(&self, user_id: u64) -> Result<u64> {
        Ok(self.stats_for_user(user_id)?.values().map(|&n| u64::from(n)).sum())
    }

    /// Total copies of a book on loan across all users.
    pub(crate) fn outstanding_for_book(&self, book_id: u64) -> Result<u64> {
        let mut total = 0;
        for user_id in self.stats_for_book(book_id)? {
            total += u64::from(self.held(user_id, book_id)?);
        }
        Ok(total)
    }
}

fn clamp(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}
