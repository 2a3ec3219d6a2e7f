//! Key-value backend: hash records, index buckets and loan hashes.
//!
//! See [`keys`] for the persisted layout.

mod entity;
mod index;
pub mod keys;
mod loans;

use std::collections::BTreeMap;

use shelf_kv::{KVExt, KVStore};
use tracing::{info, warn};

use crate::error::{Ack, EntityKind, LibraryError, Result};
use crate::library::{Backend, Library};
use crate::model::{
    Book, BookEdit, BookField, BookQuery, BookStats, Loan, NewBook, NewUser, RatingSummary, Score,
    Tag, User, UserEdit, UserField, UserQuery, UserStats,
};
use crate::sort;

use entity::{EntityStore, Record, required, required_num};
use index::IndexManager;
use loans::Loans;

const TITLE: &str = "title";
const AUTHOR: &str = "author";
const ISBN: &str = "isbn";
const NAME: &str = "name";
const USERNAME: &str = "username";
const PHONE: &str = "phone";

/// [`Library`] over plain key-value primitives.
pub struct KvLibrary {
    store: Box<dyn KVStore>,
}

impl KvLibrary {
    pub fn new(store: Box<dyn KVStore>) -> Self {
        Self { store }
    }

    fn books(&self) -> EntityStore<'_> {
        EntityStore::new(self.store.as_ref(), EntityKind::Book)
    }

    fn users(&self) -> EntityStore<'_> {
        EntityStore::new(self.store.as_ref(), EntityKind::User)
    }

    fn book_index(&self, tag: Tag) -> IndexManager<'_> {
        IndexManager::new(self.store.as_ref(), EntityKind::Book, tag)
    }

    fn user_index(&self, tag: Tag) -> IndexManager<'_> {
        IndexManager::new(self.store.as_ref(), EntityKind::User, tag)
    }

    fn loans(&self, tag: Tag) -> Loans<'_> {
        Loans::new(self.store.as_ref(), tag)
    }

    fn book_id(&self, tag: Tag, isbn: &str) -> Result<u64> {
        self.book_index(tag)
            .lookup_unique(ISBN, isbn)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Book, isbn))
    }

    fn user_id(&self, tag: Tag, username: &str) -> Result<u64> {
        self.user_index(tag)
            .lookup_unique(USERNAME, username)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, username))
    }

    fn book_record(&self, id: u64) -> Result<Record> {
        self.books()
            .get(id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Book, &id.to_string()))
    }

    fn user_record(&self, id: u64) -> Result<Record> {
        self.users()
            .get(id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, &id.to_string()))
    }

    fn load_book(&self, tag: Tag, id: u64) -> Result<Book> {
        let record = self.book_record(id)?;
        let loans = self.loans(tag);
        let mut borrowers = BTreeMap::new();
        for user_id in loans.stats_for_book(id)? {
            if let Some(username) = self.users().field(user_id, USERNAME)? {
                borrowers.insert(username, loans.held(user_id, id)?);
            }
        }
        Ok(Book {
            id,
            isbn: required(&record, ISBN)?.to_string(),
            title: required(&record, TITLE)?.to_string(),
            authors: decode_authors(&record)?,
            pages: required_num(&record, "pages")?,
            quantity: required_num(&record, "quantity")?,
            borrowers,
        })
    }

    fn load_user(&self, tag: Tag, id: u64) -> Result<User> {
        let record = self.user_record(id)?;
        let mut borrowing = BTreeMap::new();
        for (book_id, count) in self.loans(tag).stats_for_user(id)? {
            if let Some(isbn) = self.books().field(book_id, ISBN)? {
                borrowing.insert(isbn, count);
            }
        }
        Ok(User {
            id,
            username: required(&record, USERNAME)?.to_string(),
            name: required(&record, NAME)?.to_string(),
            phone: required_num(&record, PHONE)?,
            borrowing,
        })
    }

    fn load_books(&self, tag: Tag, ids: impl IntoIterator<Item = u64>) -> Result<Vec<Book>> {
        ids.into_iter().map(|id| self.load_book(tag, id)).collect()
    }

    fn load_users(&self, tag: Tag, ids: impl IntoIterator<Item = u64>) -> Result<Vec<User>> {
        ids.into_iter().map(|id| self.load_user(tag, id)).collect()
    }
}

fn encode_authors(authors: &[String]) -> Result<String> {
    serde_json::to_string(authors).map_err(|e| LibraryError::Backend(e.to_string()))
}

fn decode_authors(record: &Record) -> Result<Vec<String>> {
    serde_json::from_str(required(record, "authors")?)
        .map_err(|e| LibraryError::Backend(format!("bad authors list: {e}")))
}

impl Library for KvLibrary {
    fn backend(&self) -> Backend {
        Backend::Kv
    }

    fn add_book(&self, tag: Tag, book: &NewBook) -> Result<u64> {
        let index = self.book_index(tag);
        if index.lookup_unique(ISBN, &book.isbn)?.is_some() {
            warn!(tag = %tag, isbn = %book.isbn, "book already exists");
            return Err(LibraryError::already_exists(EntityKind::Book, &book.isbn));
        }

        let authors = encode_authors(&book.authors)?;
        let pages = book.pages.to_string();
        let quantity = book.quantity.to_string();
        let id = self.books().create(&[
            (TITLE, book.title.as_str()),
            ("authors", authors.as_str()),
            (ISBN, book.isbn.as_str()),
            ("pages", pages.as_str()),
            ("quantity", quantity.as_str()),
        ])?;

        index.add_to_bucket(TITLE, &book.title, id)?;
        index.rebind_many(AUTHOR, &[], &book.authors, id)?;
        index.add_to_bucket(ISBN, &book.isbn, id)?;

        info!(tag = %tag, id, isbn = %book.isbn, title = %book.title, "added book");
        Ok(id)
    }

    fn add_user(&self, tag: Tag, user: &NewUser) -> Result<u64> {
        let index = self.user_index(tag);
        if index.lookup_unique(USERNAME, &user.username)?.is_some() {
            warn!(tag = %tag, username = %user.username, "user already exists");
            return Err(LibraryError::already_exists(EntityKind::User, &user.username));
        }

        let phone = user.phone.to_string();
        let id = self.users().create(&[
            (NAME, user.name.as_str()),
            (USERNAME, user.username.as_str()),
            (PHONE, phone.as_str()),
        ])?;

        index.add_to_bucket(NAME, &user.name, id)?;
        index.add_to_bucket(USERNAME, &user.username, id)?;
        index.add_to_bucket(PHONE, &phone, id)?;

        info!(tag = %tag, id, username = %user.username, "added user");
        Ok(id)
    }

    fn get_book(&self, tag: Tag, isbn: &str) -> Result<Book> {
        let id = self.book_id(tag, isbn)?;
        self.load_book(tag, id)
    }

    fn get_user(&self, tag: Tag, username: &str) -> Result<User> {
        let id = self.user_id(tag, username)?;
        self.load_user(tag, id)
    }

    fn edit_book(&self, tag: Tag, isbn: &str, edit: &BookEdit) -> Result<()> {
        let id = self.book_id(tag, isbn)?;
        let record = self.book_record(id)?;
        let books = self.books();
        let index = self.book_index(tag);

        match edit {
            BookEdit::Title(title) => {
                let old = required(&record, TITLE)?;
                books.update(id, TITLE, title)?;
                index.rebind(TITLE, old, title, id)?;
            }
            BookEdit::Authors(authors) => {
                let old = decode_authors(&record)?;
                books.update(id, "authors", &encode_authors(authors)?)?;
                index.rebind_many(AUTHOR, &old, authors, id)?;
            }
            BookEdit::Pages(pages) => books.update(id, "pages", &pages.to_string())?,
            BookEdit::Quantity(quantity) => books.update(id, "quantity", &quantity.to_string())?,
        }

        info!(tag = %tag, id, isbn, field = %edit.field(), "edited book");
        Ok(())
    }

    fn edit_user(&self, tag: Tag, username: &str, edit: &UserEdit) -> Result<()> {
        let id = self.user_id(tag, username)?;
        let record = self.user_record(id)?;
        let users = self.users();
        let index = self.user_index(tag);

        match edit {
            UserEdit::Name(name) => {
                users.update(id, NAME, name)?;
                index.rebind(NAME, required(&record, NAME)?, name, id)?;
            }
            UserEdit::Phone(phone) => {
                let phone = phone.to_string();
                users.update(id, PHONE, &phone)?;
                index.rebind(PHONE, required(&record, PHONE)?, &phone, id)?;
            }
        }

        info!(tag = %tag, id, username, field = %edit.field(), "edited user");
        Ok(())
    }

    fn remove_book(&self, tag: Tag, isbn: &str) -> Result<()> {
        let id = self.book_id(tag, isbn)?;
        let loans = self.loans(tag).outstanding_for_book(id)?;
        if loans > 0 {
            warn!(tag = %tag, isbn, loans, "book still on loan");
            return Err(LibraryError::HasActiveReferences {
                kind: EntityKind::Book,
                key: isbn.to_string(),
                loans,
            });
        }

        let record = self.book_record(id)?;
        let index = self.book_index(tag);
        index.remove_from_bucket(TITLE, required(&record, TITLE)?, id)?;
        index.rebind_many(AUTHOR, &decode_authors(&record)?, &[], id)?;
        index.remove_from_bucket(ISBN, isbn, id)?;

        let ratings = keys::ratings_key(id);
        for user_id in self.store.hgetall(&ratings)?.keys() {
            if let Ok(user_id) = user_id.parse::<u64>() {
                self.store
                    .srem(&keys::rated_key(user_id), &id.to_string())
                    .ack("drop rating")?;
            }
        }
        self.store.delete(&ratings).ack("drop ratings")?;
        self.books().delete(id)?;

        info!(tag = %tag, id, isbn, "removed book");
        Ok(())
    }

    fn remove_user(&self, tag: Tag, username: &str) -> Result<()> {
        let id = self.user_id(tag, username)?;
        let loans = self.loans(tag).outstanding_for_user(id)?;
        if loans > 0 {
            warn!(tag = %tag, username, loans, "user still holds books");
            return Err(LibraryError::HasActiveReferences {
                kind: EntityKind::User,
                key: username.to_string(),
                loans,
            });
        }

        let record = self.user_record(id)?;
        let index = self.user_index(tag);
        index.remove_from_bucket(NAME, required(&record, NAME)?, id)?;
        index.remove_from_bucket(USERNAME, username, id)?;
        index.remove_from_bucket(PHONE, required(&record, PHONE)?, id)?;

        let rated = keys::rated_key(id);
        for book_id in self.store.smembers(&rated)? {
            if let Ok(book_id) = book_id.parse::<u64>() {
                self.store
                    .hdel(&keys::ratings_key(book_id), &id.to_string())
                    .ack("drop rating")?;
            }
        }
        self.store.delete(&rated).ack("drop ratings")?;
        self.users().delete(id)?;

        info!(tag = %tag, id, username, "removed user");
        Ok(())
    }

    fn find_books(&self, tag: Tag, query: &BookQuery) -> Result<Vec<Book>> {
        let index = self.book_index(tag);
        let ids = match query {
            BookQuery::Title(title) => index.lookup(TITLE, title)?,
            BookQuery::Authors(authors) => index.lookup_all(AUTHOR, authors)?,
            BookQuery::Isbn(isbn) => index.lookup(ISBN, isbn)?,
        };
        self.load_books(tag, ids)
    }

    fn find_users(&self, tag: Tag, query: &UserQuery) -> Result<Vec<User>> {
        let index = self.user_index(tag);
        let ids = match query {
            UserQuery::Name(name) => index.lookup(NAME, name)?,
            UserQuery::Username(username) => index.lookup(USERNAME, username)?,
            UserQuery::Phone(phone) => index.lookup(PHONE, &phone.to_string())?,
        };
        self.load_users(tag, ids)
    }

    fn sort_books_by(&self, tag: Tag, field: BookField) -> Result<Vec<Book>> {
        let mut books = self.load_books(tag, self.books().ids()?)?;
        sort::sort_books(&mut books, field);
        Ok(books)
    }

    fn sort_users_by(&self, tag: Tag, field: UserField) -> Result<Vec<User>> {
        let mut users = self.load_users(tag, self.users().ids()?)?;
        sort::sort_users(&mut users, field);
        Ok(users)
    }

    fn checkout(&self, tag: Tag, username: &str, isbn: &str) -> Result<Loan> {
        let user_id = self.user_id(tag, username)?;
        let book_id = self.book_id(tag, isbn)?;
        let state = self.loans(tag).checkout(user_id, book_id, isbn).inspect_err(|e| {
            warn!(tag = %tag, username, isbn, error = %e, "checkout refused");
        })?;

        info!(tag = %tag, username, isbn, count = state.count, "checked out");
        Ok(Loan {
            username: username.to_string(),
            isbn: isbn.to_string(),
            count: state.count,
            quantity: state.quantity,
        })
    }

    fn checkin(&self, tag: Tag, username: &str, isbn: &str) -> Result<Loan> {
        let user_id = self.user_id(tag, username)?;
        let book_id = self.book_id(tag, isbn)?;
        let Some(state) = self.loans(tag).checkin(user_id, book_id)? else {
            warn!(tag = %tag, username, isbn, "no active loan");
            return Err(LibraryError::NoActiveLoan {
                username: username.to_string(),
                isbn: isbn.to_string(),
            });
        };

        info!(tag = %tag, username, isbn, count = state.count, "checked in");
        Ok(Loan {
            username: username.to_string(),
            isbn: isbn.to_string(),
            count: state.count,
            quantity: state.quantity,
        })
    }

    fn user_stats(&self, tag: Tag, username: &str) -> Result<UserStats> {
        let user = self.get_user(tag, username)?;
        Ok(UserStats {
            username: user.username,
            loans: user.borrowing,
        })
    }

    fn book_stats(&self, tag: Tag, isbn: &str) -> Result<BookStats> {
        let id = self.book_id(tag, isbn)?;
        let book = self.load_book(tag, id)?;
        let scores = self
            .store
            .hgetall(&keys::ratings_key(id))?
            .into_values()
            .filter_map(|s| s.parse::<u8>().ok());
        Ok(BookStats {
            isbn: book.isbn,
            quantity: book.quantity,
            borrowers: book.borrowers.into_keys().collect(),
            ratings: RatingSummary::from_scores(scores),
        })
    }

    fn rate(&self, tag: Tag, username: &str, isbn: &str, score: Score) -> Result<()> {
        let user_id = self.user_id(tag, username)?;
        let book_id = self.book_id(tag, isbn)?;
        self.store
            .hset(
                &keys::ratings_key(book_id),
                &user_id.to_string(),
                &score.get().to_string(),
            )
            .ack("write rating")?;
        self.store
            .sadd(&keys::rated_key(user_id), &book_id.to_string())
            .ack("record rated book")?;

        info!(tag = %tag, username, isbn, score = score.get(), "rated book");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_kv::{MemoryStore, RedbStore};

    fn dune() -> NewBook {
        NewBook::new("Dune", vec!["Herbert".into()], "111", 412, 2).unwrap()
    }

    #[test]
    fn test_layout_after_add() {
        let store = MemoryStore::new();
        let lib = KvLibrary::new(Box::new(store.clone()));
        lib.add_book(Tag::Add, &dune()).unwrap();

        assert_eq!(store.hget("book:1", "title").unwrap().as_deref(), Some("Dune"));
        assert_eq!(
            store.hget("book:1", "authors").unwrap().as_deref(),
            Some(r#"["Herbert"]"#)
        );
        assert_eq!(
            store.hget("isbn:book_set", "111").unwrap().as_deref(),
            Some("isbn:111:book_set1")
        );
        assert!(store.sismember("author:Herbert:book_set1", "1").unwrap());
        assert!(store.sismember("book_ids", "1").unwrap());
    }

    #[test]
    fn test_edit_title_moves_bucket() {
        let store = MemoryStore::new();
        let lib = KvLibrary::new(Box::new(store.clone()));
        lib.add_book(Tag::Add, &dune()).unwrap();

        lib.edit_book(Tag::Edit, "111", &BookEdit::Title("Dune Messiah".into()))
            .unwrap();
        assert!(!store.exists("title:Dune:book_set1").unwrap());
        assert!(!store.hexists("title:book_set", "Dune").unwrap());
        assert!(store.sismember("title:Dune Messiah:book_set2", "1").unwrap());
    }

    #[test]
    fn test_edit_pages_does_no_bucket_work() {
        let store = MemoryStore::new();
        let lib = KvLibrary::new(Box::new(store.clone()));
        lib.add_book(Tag::Add, &dune()).unwrap();
        let before = store.keys().unwrap();

        lib.edit_book(Tag::Edit, "111", &BookEdit::Pages(500)).unwrap();
        assert_eq!(store.keys().unwrap(), before);
        assert_eq!(lib.get_book(Tag::Show, "111").unwrap().pages, 500);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.redb");
        {
            let lib = KvLibrary::new(Box::new(RedbStore::open(&path).unwrap()));
            lib.add_book(Tag::Add, &dune()).unwrap();
            lib.add_user(Tag::Add, &NewUser::new("Al", "al", 555).unwrap())
                .unwrap();
            lib.checkout(Tag::Action, "al", "111").unwrap();
        }
        let lib = KvLibrary::new(Box::new(RedbStore::open(&path).unwrap()));
        let book = lib.get_book(Tag::Show, "111").unwrap();
        assert_eq!(book.quantity, 1);
        assert_eq!(book.borrowers.get("al"), Some(&1));
        let emma = NewBook::new("Emma", vec!["Austen".into()], "222", 300, 1).unwrap();
        assert_eq!(lib.add_book(Tag::Add, &emma).unwrap(), 2);
    }
}
