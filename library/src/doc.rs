//! Document backend: one JSON document per book (keyed by isbn) and per
//! user (keyed by username).
//!
//! Loans are embedded on both sides: `borrowers.{username}` on the book and
//! `borrowing.{isbn}` on the user. Stock checks and loan guards are filters
//! on guarded single-document updates, so a refused checkout or checkin
//! writes nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelf_doc::{
    Collection, DeleteResult, DocStore, Document, FieldPath, Filter, ID_FIELD, Sort, Update,
};
use shelf_kv::KVStore;
use tracing::{info, warn};

use crate::error::{Ack, EntityKind, LibraryError, Result};
use crate::library::{Backend, Library};
use crate::model::{
    Book, BookEdit, BookField, BookQuery, BookStats, Loan, NewBook, NewUser, RatingSummary, Score,
    Tag, User, UserEdit, UserField, UserQuery, UserStats,
};

const BOOKS: &str = "books";
const USERS: &str = "users";

#[derive(Debug, Serialize, Deserialize)]
struct BookDoc {
    #[serde(rename = "_id", default)]
    id: u64,
    isbn: String,
    title: String,
    authors: Vec<String>,
    pages: u32,
    quantity: u32,
    #[serde(default)]
    borrowers: BTreeMap<String, u32>,
    #[serde(default)]
    ratings: BTreeMap<String, u8>,
}

impl From<BookDoc> for Book {
    fn from(doc: BookDoc) -> Self {
        Book {
            id: doc.id,
            isbn: doc.isbn,
            title: doc.title,
            authors: doc.authors,
            pages: doc.pages,
            quantity: doc.quantity,
            borrowers: doc.borrowers,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UserDoc {
    #[serde(rename = "_id", default)]
    id: u64,
    username: String,
    name: String,
    phone: u64,
    #[serde(default)]
    borrowing: BTreeMap<String, u32>,
}

impl From<UserDoc> for User {
    fn from(doc: UserDoc) -> Self {
        User {
            id: doc.id,
            username: doc.username,
            name: doc.name,
            phone: doc.phone,
            borrowing: doc.borrowing,
        }
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value) {
        Ok(Value::Object(mut doc)) => {
            doc.remove(ID_FIELD);
            Ok(doc)
        }
        Ok(_) => Err(LibraryError::Backend("document is not an object".into())),
        Err(e) => Err(LibraryError::Backend(e.to_string())),
    }
}

/// Read an integer at `path` from an updated document.
fn count_at(doc: Option<&Document>, path: impl Into<FieldPath>) -> u32 {
    let path = path.into();
    doc.and_then(|d| path.lookup(d))
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

/// [`Library`] over JSON document collections.
pub struct DocLibrary {
    docs: DocStore,
}

impl DocLibrary {
    pub fn new(store: Box<dyn KVStore>) -> Self {
        Self {
            docs: DocStore::new(store, "library"),
        }
    }

    fn books(&self) -> Collection<'_> {
        self.docs.collection(BOOKS)
    }

    fn users(&self) -> Collection<'_> {
        self.docs.collection(USERS)
    }

    fn book_doc(&self, isbn: &str) -> Result<BookDoc> {
        self.books()
            .get(isbn)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Book, isbn))
    }

    fn user_doc(&self, username: &str) -> Result<UserDoc> {
        self.users()
            .get(username)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, username))
    }
}

impl Library for DocLibrary {
    fn backend(&self) -> Backend {
        Backend::Doc
    }

    fn add_book(&self, tag: Tag, book: &NewBook) -> Result<u64> {
        let doc = to_document(&BookDoc {
            id: 0,
            isbn: book.isbn.clone(),
            title: book.title.clone(),
            authors: book.authors.clone(),
            pages: book.pages,
            quantity: book.quantity,
            borrowers: BTreeMap::new(),
            ratings: BTreeMap::new(),
        })?;
        match self.books().insert_one(&book.isbn, doc).ack("insert book")? {
            Some(id) => {
                info!(tag = %tag, id, isbn = %book.isbn, title = %book.title, "added book");
                Ok(id)
            }
            None => {
                warn!(tag = %tag, isbn = %book.isbn, "book already exists");
                Err(LibraryError::already_exists(EntityKind::Book, &book.isbn))
            }
        }
    }

    fn add_user(&self, tag: Tag, user: &NewUser) -> Result<u64> {
        let doc = to_document(&UserDoc {
            id: 0,
            username: user.username.clone(),
            name: user.name.clone(),
            phone: user.phone,
            borrowing: BTreeMap::new(),
        })?;
        match self.users().insert_one(&user.username, doc).ack("insert user")? {
            Some(id) => {
                info!(tag = %tag, id, username = %user.username, "added user");
                Ok(id)
            }
            None => {
                warn!(tag = %tag, username = %user.username, "user already exists");
                Err(LibraryError::already_exists(EntityKind::User, &user.username))
            }
        }
    }

    fn get_book(&self, _tag: Tag, isbn: &str) -> Result<Book> {
        Ok(self.book_doc(isbn)?.into())
    }

    fn get_user(&self, _tag: Tag, username: &str) -> Result<User> {
        Ok(self.user_doc(username)?.into())
    }

    fn edit_book(&self, tag: Tag, isbn: &str, edit: &BookEdit) -> Result<()> {
        let update = match edit {
            BookEdit::Title(title) => Update::set("title", title.as_str()),
            BookEdit::Authors(authors) => Update::set("authors", authors.clone()),
            BookEdit::Pages(pages) => Update::set("pages", *pages),
            BookEdit::Quantity(quantity) => Update::set("quantity", *quantity),
        };
        let result = self
            .books()
            .update_one(isbn, &Filter::any(), &[update])
            .ack("update book")?;
        if !result.matched {
            return Err(LibraryError::not_found(EntityKind::Book, isbn));
        }
        info!(tag = %tag, isbn, field = %edit.field(), modified = result.modified, "edited book");
        Ok(())
    }

    fn edit_user(&self, tag: Tag, username: &str, edit: &UserEdit) -> Result<()> {
        let update = match edit {
            UserEdit::Name(name) => Update::set("name", name.as_str()),
            UserEdit::Phone(phone) => Update::set("phone", *phone),
        };
        let result = self
            .users()
            .update_one(username, &Filter::any(), &[update])
            .ack("update user")?;
        if !result.matched {
            return Err(LibraryError::not_found(EntityKind::User, username));
        }
        info!(tag = %tag, username, field = %edit.field(), modified = result.modified, "edited user");
        Ok(())
    }

    fn remove_book(&self, tag: Tag, isbn: &str) -> Result<()> {
        match self
            .books()
            .delete_one(isbn, &Filter::is_empty("borrowers"))
            .ack("delete book")?
        {
            DeleteResult::Deleted => {
                info!(tag = %tag, isbn, "removed book");
                Ok(())
            }
            DeleteResult::Missing => Err(LibraryError::not_found(EntityKind::Book, isbn)),
            DeleteResult::Rejected => {
                let loans = self
                    .book_doc(isbn)?
                    .borrowers
                    .values()
                    .map(|&n| u64::from(n))
                    .sum();
                warn!(tag = %tag, isbn, loans, "book still on loan");
                Err(LibraryError::HasActiveReferences {
                    kind: EntityKind::Book,
                    key: isbn.to_string(),
                    loans,
                })
            }
        }
    }

    fn remove_user(&self, tag: Tag, username: &str) -> Result<()> {
        match self
            .users()
            .delete_one(username, &Filter::is_empty("borrowing"))
            .ack("delete user")?
        {
            DeleteResult::Deleted => {}
            DeleteResult::Missing => {
                return Err(LibraryError::not_found(EntityKind::User, username));
            }
            DeleteResult::Rejected => {
                let loans = self
                    .user_doc(username)?
                    .borrowing
                    .values()
                    .map(|&n| u64::from(n))
                    .sum();
                warn!(tag = %tag, username, loans, "user still holds books");
                return Err(LibraryError::HasActiveReferences {
                    kind: EntityKind::User,
                    key: username.to_string(),
                    loans,
                });
            }
        }

        let books = self.books();
        let rated = books.find_as::<BookDoc>(&Filter::gt(["ratings", username], 0), None)?;
        for book in rated {
            books
                .update_one(&book.isbn, &Filter::any(), &[Update::unset(["ratings", username])])
                .ack("drop rating")?;
        }
        info!(tag = %tag, username, "removed user");
        Ok(())
    }

    fn find_books(&self, _tag: Tag, query: &BookQuery) -> Result<Vec<Book>> {
        let filter = match query {
            BookQuery::Title(title) => Filter::eq("title", title.as_str()),
            BookQuery::Authors(authors) => Filter::All(
                authors
                    .iter()
                    .map(|a| Filter::eq("authors", a.as_str()))
                    .collect(),
            ),
            BookQuery::Isbn(isbn) => Filter::eq("isbn", isbn.as_str()),
        };
        Ok(self
            .books()
            .find_as::<BookDoc>(&filter, None)?
            .into_iter()
            .map(Book::from)
            .collect())
    }

    fn find_users(&self, _tag: Tag, query: &UserQuery) -> Result<Vec<User>> {
        let filter = match query {
            UserQuery::Name(name) => Filter::eq("name", name.as_str()),
            UserQuery::Username(username) => Filter::eq("username", username.as_str()),
            UserQuery::Phone(phone) => Filter::eq("phone", *phone),
        };
        Ok(self
            .users()
            .find_as::<UserDoc>(&filter, None)?
            .into_iter()
            .map(User::from)
            .collect())
    }

    fn sort_books_by(&self, _tag: Tag, field: BookField) -> Result<Vec<Book>> {
        let sort = Sort::asc(field.as_str());
        Ok(self
            .books()
            .find_as::<BookDoc>(&Filter::any(), Some(&sort))?
            .into_iter()
            .map(Book::from)
            .collect())
    }

    fn sort_users_by(&self, _tag: Tag, field: UserField) -> Result<Vec<User>> {
        let sort = Sort::asc(field.as_str());
        Ok(self
            .users()
            .find_as::<UserDoc>(&Filter::any(), Some(&sort))?
            .into_iter()
            .map(User::from)
            .collect())
    }

    /// The book document takes the quantity decrement and the borrower
    /// entry in one guarded update; the user's loan entry follows.
    fn checkout(&self, tag: Tag, username: &str, isbn: &str) -> Result<Loan> {
        self.user_doc(username)?;
        self.book_doc(isbn)?;

        let book = self
            .books()
            .update_one(
                isbn,
                &Filter::gt("quantity", 0),
                &[
                    Update::inc("quantity", -1),
                    Update::inc(["borrowers", username], 1),
                ],
            )
            .ack("decrement quantity")?;
        if !book.matched {
            warn!(tag = %tag, username, isbn, "out of stock");
            return Err(LibraryError::OutOfStock {
                isbn: isbn.to_string(),
            });
        }

        let user = self
            .users()
            .update_one(username, &Filter::any(), &[Update::inc(["borrowing", isbn], 1)])
            .ack("increment loan")?;
        if !user.matched {
            return Err(LibraryError::Unacknowledged {
                step: "increment loan",
                reason: format!("user {username:?} disappeared"),
            });
        }

        let count = count_at(user.document.as_ref(), ["borrowing", isbn]);
        let quantity = count_at(book.document.as_ref(), "quantity");
        info!(tag = %tag, username, isbn, count, "checked out");
        Ok(Loan {
            username: username.to_string(),
            isbn: isbn.to_string(),
            count,
            quantity,
        })
    }

    fn checkin(&self, tag: Tag, username: &str, isbn: &str) -> Result<Loan> {
        self.user_doc(username)?;
        self.book_doc(isbn)?;

        let users = self.users();
        let user = users
            .update_one(
                username,
                &Filter::gt(["borrowing", isbn], 0),
                &[Update::inc(["borrowing", isbn], -1)],
            )
            .ack("decrement loan")?;
        if !user.matched {
            warn!(tag = %tag, username, isbn, "no active loan");
            return Err(LibraryError::NoActiveLoan {
                username: username.to_string(),
                isbn: isbn.to_string(),
            });
        }
        let count = count_at(user.document.as_ref(), ["borrowing", isbn]);
        if count == 0 {
            users
                .update_one(
                    username,
                    &Filter::eq(["borrowing", isbn], 0),
                    &[Update::unset(["borrowing", isbn])],
                )
                .ack("close loan")?;
        }

        let books = self.books();
        let book = books
            .update_one(
                isbn,
                &Filter::any(),
                &[
                    Update::inc("quantity", 1),
                    Update::inc(["borrowers", username], -1),
                ],
            )
            .ack("increment quantity")?;
        if count_at(book.document.as_ref(), ["borrowers", username]) == 0 {
            books
                .update_one(
                    isbn,
                    &Filter::eq(["borrowers", username], 0),
                    &[Update::unset(["borrowers", username])],
                )
                .ack("release borrower")?;
        }

        let quantity = count_at(book.document.as_ref(), "quantity");
        info!(tag = %tag, username, isbn, count, "checked in");
        Ok(Loan {
            username: username.to_string(),
            isbn: isbn.to_string(),
            count,
            quantity,
        })
    }

    fn user_stats(&self, _tag: Tag, username: &str) -> Result<UserStats> {
        let user = self.user_doc(username)?;
        Ok(UserStats {
            username: user.username,
            loans: user.borrowing,
        })
    }

    fn book_stats(&self, _tag: Tag, isbn: &str) -> Result<BookStats> {
        let book = self.book_doc(isbn)?;
        Ok(BookStats {
            isbn: book.isbn,
            quantity: book.quantity,
            borrowers: book.borrowers.into_keys().collect(),
            ratings: RatingSummary::from_scores(book.ratings.into_values()),
        })
    }

    fn rate(&self, tag: Tag, username: &str, isbn: &str, score: Score) -> Result<()> {
        self.user_doc(username)?;
        let result = self
            .books()
            .update_one(
                isbn,
                &Filter::any(),
                &[Update::set(["ratings", username], score.get())],
            )
            .ack("write rating")?;
        if !result.matched {
            return Err(LibraryError::not_found(EntityKind::Book, isbn));
        }
        info!(tag = %tag, username, isbn, score = score.get(), "rated book");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_kv::{KVStore, MemoryStore};

    fn library() -> (MemoryStore, DocLibrary) {
        let store = MemoryStore::new();
        (store.clone(), DocLibrary::new(Box::new(store)))
    }

    #[test]
    fn test_book_document_shape() {
        let (store, lib) = library();
        let book = NewBook::new("Dune", vec!["Herbert".into()], "111", 412, 2).unwrap();
        assert_eq!(lib.add_book(Tag::Add, &book).unwrap(), 1);

        let raw = store.get("library:books:d:111").unwrap().unwrap();
        let doc: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(doc["_id"], 1);
        assert_eq!(doc["authors"], serde_json::json!(["Herbert"]));
        assert_eq!(doc["quantity"], 2);
    }

    #[test]
    fn test_loan_entries_are_unset_when_closed() {
        let (store, lib) = library();
        let book = NewBook::new("Dune", vec!["Herbert".into()], "111", 412, 1).unwrap();
        lib.add_book(Tag::Add, &book).unwrap();
        lib.add_user(Tag::Add, &NewUser::new("Al", "al", 555).unwrap())
            .unwrap();

        lib.checkout(Tag::Action, "al", "111").unwrap();
        lib.checkin(Tag::Action, "al", "111").unwrap();

        let raw = store.get("library:users:d:al").unwrap().unwrap();
        let user: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(user["borrowing"], serde_json::json!({}));
        let raw = store.get("library:books:d:111").unwrap().unwrap();
        let book: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(book["borrowers"], serde_json::json!({}));
    }

    #[test]
    fn test_count_at_reads_top_level_and_nested() {
        let doc = serde_json::json!({"quantity": 3, "borrowers": {"al": 2}});
        let doc = doc.as_object().cloned().unwrap();
        assert_eq!(count_at(Some(&doc), "quantity"), 3);
        assert_eq!(count_at(Some(&doc), ["borrowers", "al"]), 2);
        assert_eq!(count_at(None, ["borrowers", "al"]), 0);
    }
}
