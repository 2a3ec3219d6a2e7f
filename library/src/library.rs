use std::fmt;
use std::str::FromStr;

use crate::error::{LibraryError, Result};
use crate::model::{
    Book, BookEdit, BookField, BookQuery, BookStats, Loan, NewBook, NewUser, Score, Tag, User,
    UserEdit, UserField, UserQuery, UserStats,
};

/// Which storage model a [`Library`] is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Kv,
    Doc,
    Graph,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Kv => "kv",
            Backend::Doc => "doc",
            Backend::Graph => "graph",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kv" | "redis" => Ok(Backend::Kv),
            "doc" | "mongo" => Ok(Backend::Doc),
            "graph" | "neo4j" => Ok(Backend::Graph),
            other => Err(LibraryError::invalid(
                "backend",
                format!("{other:?} is not one of kv, doc, graph"),
            )),
        }
    }
}

/// Library is the operation catalogue every backend implements.
///
/// Books are addressed by isbn and users by username. Every call takes the
/// [`Tag`] of the command that issued it; the tag is attached to the log
/// events the call emits.
///
/// Mutations check existence and uniqueness before writing anything, so a
/// refused call leaves the store untouched.
pub trait Library {
    fn backend(&self) -> Backend;

    /// Add a book. Returns its generated id.
    fn add_book(&self, tag: Tag, book: &NewBook) -> Result<u64>;

    /// Add a user. Returns its generated id.
    fn add_user(&self, tag: Tag, user: &NewUser) -> Result<u64>;

    fn get_book(&self, tag: Tag, isbn: &str) -> Result<Book>;

    fn get_user(&self, tag: Tag, username: &str) -> Result<User>;

    fn edit_book(&self, tag: Tag, isbn: &str, edit: &BookEdit) -> Result<()>;

    fn edit_user(&self, tag: Tag, username: &str, edit: &UserEdit) -> Result<()>;

    /// Remove a book that has no copies on loan.
    fn remove_book(&self, tag: Tag, isbn: &str) -> Result<()>;

    /// Remove a user that holds no books.
    fn remove_user(&self, tag: Tag, username: &str) -> Result<()>;

    /// Books matching the query, in id order. An empty result is not an error.
    fn find_books(&self, tag: Tag, query: &BookQuery) -> Result<Vec<Book>>;

    /// Users matching the query, in id order.
    fn find_users(&self, tag: Tag, query: &UserQuery) -> Result<Vec<User>>;

    /// Every book, stably sorted ascending by `field`.
    fn sort_books_by(&self, tag: Tag, field: BookField) -> Result<Vec<Book>>;

    /// Every user, stably sorted ascending by `field`.
    fn sort_users_by(&self, tag: Tag, field: UserField) -> Result<Vec<User>>;

    /// Lend one copy of a book to a user.
    fn checkout(&self, tag: Tag, username: &str, isbn: &str) -> Result<Loan>;

    /// Return one copy of a book from a user.
    fn checkin(&self, tag: Tag, username: &str, isbn: &str) -> Result<Loan>;

    fn user_stats(&self, tag: Tag, username: &str) -> Result<UserStats>;

    fn book_stats(&self, tag: Tag, isbn: &str) -> Result<BookStats>;

    /// Record a user's score for a book, replacing any earlier score.
    fn rate(&self, tag: Tag, username: &str, isbn: &str, score: Score) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!("kv".parse::<Backend>().unwrap(), Backend::Kv);
        assert_eq!("mongo".parse::<Backend>().unwrap(), Backend::Doc);
        assert_eq!(Backend::Graph.to_string(), "graph");
        assert!("sql".parse::<Backend>().is_err());
    }
}
