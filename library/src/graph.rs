//! Graph backend: books, users and authors as nodes.
//!
//! ```text
//! (author:{name}) -[AUTHOR_OF {position}]-> (book:{isbn})
//! (user:{username}) -[BORROWS {count}]-> (book:{isbn})
//! (user:{username}) -[RATED {score}]-> (book:{isbn})
//! ```
//!
//! A BORROWS edge is both the loan and, through the graph's reverse index,
//! the book's reference back to its borrower. Author nodes are merged by
//! name and deleted once no book points at them.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use shelf_graph::{Direction, Edge, Graph, GraphError, KVGraph, Node, Props, UNIT_SEPARATOR};
use shelf_kv::{KVExt, KVStore};
use tracing::{debug, info, warn};

use crate::error::{Ack, EntityKind, LibraryError, Result};
use crate::library::{Backend, Library};
use crate::model::{
    Book, BookEdit, BookField, BookQuery, BookStats, Loan, NewBook, NewUser, RatingSummary, Score,
    Tag, User, UserEdit, UserField, UserQuery, UserStats,
};
use crate::sort;

const AUTHOR_OF: &str = "AUTHOR_OF";
const BORROWS: &str = "BORROWS";
const RATED: &str = "RATED";

const BOOK_PREFIX: &str = "book:";
const USER_PREFIX: &str = "user:";
const AUTHOR_PREFIX: &str = "author:";

fn book_label(isbn: &str) -> String {
    format!("{BOOK_PREFIX}{isbn}")
}

fn user_label(username: &str) -> String {
    format!("{USER_PREFIX}{username}")
}

fn author_label(name: &str) -> String {
    format!("{AUTHOR_PREFIX}{name}")
}

fn prop_str(node: &Node, key: &str) -> Result<String> {
    node.str_prop(key)
        .map(String::from)
        .ok_or_else(|| LibraryError::Backend(format!("node {:?} has no {key}", node.label)))
}

fn prop_num<T: TryFrom<u64>>(node: &Node, key: &str) -> Result<T> {
    node.u64_prop(key)
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| LibraryError::Backend(format!("node {:?} has no numeric {key}", node.label)))
}

fn edge_count(edge: &Edge, key: &str) -> u32 {
    edge.u64_prop(key)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn props(key: &str, value: impl Into<Value>) -> Props {
    Props::from([(key.to_string(), value.into())])
}

/// [`Library`] over a property graph.
pub struct GraphLibrary {
    graph: KVGraph,
}

impl GraphLibrary {
    pub fn new(store: Box<dyn KVStore>) -> Self {
        Self {
            graph: KVGraph::with_separator(store, "library", UNIT_SEPARATOR),
        }
    }

    fn next_id(&self, kind: EntityKind) -> Result<u64> {
        let id = self
            .graph
            .store()
            .incr(&format!("{kind}_id_counter"))
            .ack("allocate id")?;
        u64::try_from(id).map_err(|_| LibraryError::Backend(format!("bad id {id}")))
    }

    fn book_node(&self, isbn: &str) -> Result<Node> {
        self.graph
            .get_node(&book_label(isbn))?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Book, isbn))
    }

    fn user_node(&self, username: &str) -> Result<Node> {
        self.graph
            .get_node(&user_label(username))?
            .ok_or_else(|| LibraryError::not_found(EntityKind::User, username))
    }

    /// Author names of a book, in the order they were given.
    fn authors_of(&self, label: &str) -> Result<Vec<String>> {
        let mut edges = self.graph.edges(label, Some(AUTHOR_OF), Direction::Incoming)?;
        edges.sort_by_key(|e| e.u64_prop("position").unwrap_or(u64::MAX));
        Ok(edges
            .into_iter()
            .filter_map(|e| e.from.strip_prefix(AUTHOR_PREFIX).map(String::from))
            .collect())
    }

    /// username -> copies, from a book's incoming BORROWS edges.
    fn borrowers_of(&self, label: &str) -> Result<BTreeMap<String, u32>> {
        Ok(self
            .graph
            .edges(label, Some(BORROWS), Direction::Incoming)?
            .into_iter()
            .filter_map(|e| {
                let count = edge_count(&e, "count");
                e.from
                    .strip_prefix(USER_PREFIX)
                    .map(|u| (u.to_string(), count))
            })
            .collect())
    }

    /// isbn -> copies, from a user's outgoing BORROWS edges.
    fn borrowing_of(&self, label: &str) -> Result<BTreeMap<String, u32>> {
        Ok(self
            .graph
            .edges(label, Some(BORROWS), Direction::Outgoing)?
            .into_iter()
            .filter_map(|e| {
                let count = edge_count(&e, "count");
                e.to.strip_prefix(BOOK_PREFIX).map(|b| (b.to_string(), count))
            })
            .collect())
    }

    fn to_book(&self, node: &Node) -> Result<Book> {
        Ok(Book {
            id: prop_num(node, "id")?,
            isbn: prop_str(node, "isbn")?,
            title: prop_str(node, "title")?,
            authors: self.authors_of(&node.label)?,
            pages: prop_num(node, "pages")?,
            quantity: prop_num(node, "quantity")?,
            borrowers: self.borrowers_of(&node.label)?,
        })
    }

    fn to_user(&self, node: &Node) -> Result<User> {
        Ok(User {
            id: prop_num(node, "id")?,
            username: prop_str(node, "username")?,
            name: prop_str(node, "name")?,
            phone: prop_num(node, "phone")?,
            borrowing: self.borrowing_of(&node.label)?,
        })
    }

    fn all_books(&self) -> Result<Vec<Book>> {
        let mut books = self
            .graph
            .list_nodes(BOOK_PREFIX)?
            .iter()
            .map(|n| self.to_book(n))
            .collect::<Result<Vec<_>>>()?;
        books.sort_by_key(|b| b.id);
        Ok(books)
    }

    fn all_users(&self) -> Result<Vec<User>> {
        let mut users = self
            .graph
            .list_nodes(USER_PREFIX)?
            .iter()
            .map(|n| self.to_user(n))
            .collect::<Result<Vec<_>>>()?;
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    /// Point every author at the book, creating author nodes on demand.
    /// Existing edges only have their position refreshed.
    fn link_authors(&self, tag: Tag, book: &str, authors: &[String]) -> Result<()> {
        for (position, name) in authors.iter().enumerate() {
            let label = author_label(name);
            let created = self
                .graph
                .merge_node(&Node::new(&label).with("name", name.as_str()))
                .ack("merge author")?;
            if created {
                debug!(tag = %tag, author = %name, "created author");
            }
            self.graph
                .set_edge(&Edge::new(&label, AUTHOR_OF, book).with("position", position as u64))
                .ack("link author")?;
        }
        Ok(())
    }

    /// Delete author nodes that no longer write any book.
    fn prune_authors(&self, tag: Tag, authors: &[String]) -> Result<()> {
        for name in authors {
            let label = author_label(name);
            if self.graph.edges(&label, None, Direction::Both)?.is_empty() {
                self.graph.delete_node(&label).ack("delete author")?;
                debug!(tag = %tag, author = %name, "deleted orphan author");
            }
        }
        Ok(())
    }
}

impl Library for GraphLibrary {
    fn backend(&self) -> Backend {
        Backend::Graph
    }

    fn add_book(&self, tag: Tag, book: &NewBook) -> Result<u64> {
        let label = book_label(&book.isbn);
        if self.graph.get_node(&label)?.is_some() {
            warn!(tag = %tag, isbn = %book.isbn, "book already exists");
            return Err(LibraryError::already_exists(EntityKind::Book, &book.isbn));
        }

        let id = self.next_id(EntityKind::Book)?;
        let node = Node::new(&label)
            .with("id", id)
            .with("isbn", book.isbn.as_str())
            .with("title", book.title.as_str())
            .with("pages", book.pages)
            .with("quantity", book.quantity);
        match self.graph.create_node(&node) {
            Ok(()) => {}
            Err(GraphError::AlreadyExists(_)) => {
                return Err(LibraryError::already_exists(EntityKind::Book, &book.isbn));
            }
            Err(e) => return Err(e).ack("create book"),
        }
        self.link_authors(tag, &label, &book.authors)?;

        info!(tag = %tag, id, isbn = %book.isbn, title = %book.title, "added book");
        Ok(id)
    }

    fn add_user(&self, tag: Tag, user: &NewUser) -> Result<u64> {
        let label = user_label(&user.username);
        if self.graph.get_node(&label)?.is_some() {
            warn!(tag = %tag, username = %user.username, "user already exists");
            return Err(LibraryError::already_exists(EntityKind::User, &user.username));
        }

        let id = self.next_id(EntityKind::User)?;
        let node = Node::new(&label)
            .with("id", id)
            .with("username", user.username.as_str())
            .with("name", user.name.as_str())
            .with("phone", user.phone);
        match self.graph.create_node(&node) {
            Ok(()) => {}
            Err(GraphError::AlreadyExists(_)) => {
                return Err(LibraryError::already_exists(EntityKind::User, &user.username));
            }
            Err(e) => return Err(e).ack("create user"),
        }

        info!(tag = %tag, id, username = %user.username, "added user");
        Ok(id)
    }

    fn get_book(&self, _tag: Tag, isbn: &str) -> Result<Book> {
        self.to_book(&self.book_node(isbn)?)
    }

    fn get_user(&self, _tag: Tag, username: &str) -> Result<User> {
        self.to_user(&self.user_node(username)?)
    }

    fn edit_book(&self, tag: Tag, isbn: &str, edit: &BookEdit) -> Result<()> {
        let node = self.book_node(isbn)?;
        match edit {
            BookEdit::Title(title) => self
                .graph
                .merge_props(&node.label, &props("title", title.as_str()))
                .ack("write title")?,
            BookEdit::Pages(pages) => self
                .graph
                .merge_props(&node.label, &props("pages", *pages))
                .ack("write pages")?,
            BookEdit::Quantity(quantity) => self
                .graph
                .merge_props(&node.label, &props("quantity", *quantity))
                .ack("write quantity")?,
            BookEdit::Authors(authors) => {
                let old = self.authors_of(&node.label)?;
                let dropped: Vec<String> = old
                    .into_iter()
                    .filter(|a| !authors.contains(a))
                    .collect();
                for name in &dropped {
                    self.graph
                        .remove_edge(&author_label(name), AUTHOR_OF, &node.label)
                        .ack("unlink author")?;
                }
                self.link_authors(tag, &node.label, authors)?;
                self.prune_authors(tag, &dropped)?;
            }
        }

        info!(tag = %tag, isbn, field = %edit.field(), "edited book");
        Ok(())
    }

    fn edit_user(&self, tag: Tag, username: &str, edit: &UserEdit) -> Result<()> {
        let node = self.user_node(username)?;
        let update = match edit {
            UserEdit::Name(name) => props("name", name.as_str()),
            UserEdit::Phone(phone) => props("phone", *phone),
        };
        self.graph
            .merge_props(&node.label, &update)
            .ack("write user")?;

        info!(tag = %tag, username, field = %edit.field(), "edited user");
        Ok(())
    }

    fn remove_book(&self, tag: Tag, isbn: &str) -> Result<()> {
        let node = self.book_node(isbn)?;
        let loans: u64 = self
            .borrowers_of(&node.label)?
            .values()
            .map(|&n| u64::from(n))
            .sum();
        if loans > 0 {
            warn!(tag = %tag, isbn, loans, "book still on loan");
            return Err(LibraryError::HasActiveReferences {
                kind: EntityKind::Book,
                key: isbn.to_string(),
                loans,
            });
        }

        let authors = self.authors_of(&node.label)?;
        self.graph.delete_node(&node.label).ack("delete book")?;
        self.prune_authors(tag, &authors)?;

        info!(tag = %tag, isbn, "removed book");
        Ok(())
    }

    fn remove_user(&self, tag: Tag, username: &str) -> Result<()> {
        let node = self.user_node(username)?;
        let loans: u64 = self
            .borrowing_of(&node.label)?
            .values()
            .map(|&n| u64::from(n))
            .sum();
        if loans > 0 {
            warn!(tag = %tag, username, loans, "user still holds books");
            return Err(LibraryError::HasActiveReferences {
                kind: EntityKind::User,
                key: username.to_string(),
                loans,
            });
        }

        self.graph.delete_node(&node.label).ack("delete user")?;
        info!(tag = %tag, username, "removed user");
        Ok(())
    }

    fn find_books(&self, _tag: Tag, query: &BookQuery) -> Result<Vec<Book>> {
        match query {
            BookQuery::Isbn(isbn) => match self.graph.get_node(&book_label(isbn))? {
                Some(node) => Ok(vec![self.to_book(&node)?]),
                None => Ok(Vec::new()),
            },
            BookQuery::Title(title) => Ok(self
                .all_books()?
                .into_iter()
                .filter(|b| &b.title == title)
                .collect()),
            BookQuery::Authors(authors) => {
                let mut labels: Option<BTreeSet<String>> = None;
                for name in authors {
                    let written: BTreeSet<String> = self
                        .graph
                        .neighbors(&author_label(name), Some(AUTHOR_OF), Direction::Outgoing)?
                        .into_iter()
                        .collect();
                    labels = Some(match labels {
                        Some(acc) => acc.intersection(&written).cloned().collect(),
                        None => written,
                    });
                }

                let mut books = Vec::new();
                for label in labels.unwrap_or_default() {
                    if let Some(node) = self.graph.get_node(&label)? {
                        books.push(self.to_book(&node)?);
                    }
                }
                books.sort_by_key(|b| b.id);
                Ok(books)
            }
        }
    }

    fn find_users(&self, _tag: Tag, query: &UserQuery) -> Result<Vec<User>> {
        if let UserQuery::Username(username) = query {
            return match self.graph.get_node(&user_label(username))? {
                Some(node) => Ok(vec![self.to_user(&node)?]),
                None => Ok(Vec::new()),
            };
        }
        Ok(self
            .all_users()?
            .into_iter()
            .filter(|u| match query {
                UserQuery::Name(name) => &u.name == name,
                UserQuery::Phone(phone) => u.phone == *phone,
                UserQuery::Username(username) => &u.username == username,
            })
            .collect())
    }

    fn sort_books_by(&self, _tag: Tag, field: BookField) -> Result<Vec<Book>> {
        let mut books = self.all_books()?;
        sort::sort_books(&mut books, field);
        Ok(books)
    }

    fn sort_users_by(&self, _tag: Tag, field: UserField) -> Result<Vec<User>> {
        let mut users = self.all_users()?;
        sort::sort_users(&mut users, field);
        Ok(users)
    }

    fn checkout(&self, tag: Tag, username: &str, isbn: &str) -> Result<Loan> {
        let user = self.user_node(username)?;
        let book = self.book_node(isbn)?;
        let quantity: u32 = prop_num(&book, "quantity")?;
        if quantity == 0 {
            warn!(tag = %tag, username, isbn, "out of stock");
            return Err(LibraryError::OutOfStock {
                isbn: isbn.to_string(),
            });
        }

        let quantity = quantity - 1;
        self.graph
            .merge_props(&book.label, &props("quantity", quantity))
            .ack("decrement quantity")?;

        let count = match self.graph.get_edge(&user.label, BORROWS, &book.label)? {
            Some(edge) => edge_count(&edge, "count") + 1,
            None => 1,
        };
        self.graph
            .set_edge(&Edge::new(&user.label, BORROWS, &book.label).with("count", count))
            .ack("increment loan")?;

        info!(tag = %tag, username, isbn, count, "checked out");
        Ok(Loan {
            username: username.to_string(),
            isbn: isbn.to_string(),
            count,
            quantity,
        })
    }

    fn checkin(&self, tag: Tag, username: &str, isbn: &str) -> Result<Loan> {
        let user = self.user_node(username)?;
        let book = self.book_node(isbn)?;
        let held = self
            .graph
            .get_edge(&user.label, BORROWS, &book.label)?
            .map(|e| edge_count(&e, "count"))
            .unwrap_or(0);
        if held == 0 {
            warn!(tag = %tag, username, isbn, "no active loan");
            return Err(LibraryError::NoActiveLoan {
                username: username.to_string(),
                isbn: isbn.to_string(),
            });
        }

        let count = held - 1;
        if count == 0 {
            self.graph
                .remove_edge(&user.label, BORROWS, &book.label)
                .ack("close loan")?;
        } else {
            self.graph
                .set_edge(&Edge::new(&user.label, BORROWS, &book.label).with("count", count))
                .ack("decrement loan")?;
        }

        let quantity = prop_num::<u32>(&book, "quantity")? + 1;
        self.graph
            .merge_props(&book.label, &props("quantity", quantity))
            .ack("increment quantity")?;

        info!(tag = %tag, username, isbn, count, "checked in");
        Ok(Loan {
            username: username.to_string(),
            isbn: isbn.to_string(),
            count,
            quantity,
        })
    }

    fn user_stats(&self, _tag: Tag, username: &str) -> Result<UserStats> {
        let user = self.user_node(username)?;
        Ok(UserStats {
            username: username.to_string(),
            loans: self.borrowing_of(&user.label)?,
        })
    }

    fn book_stats(&self, _tag: Tag, isbn: &str) -> Result<BookStats> {
        let book = self.book_node(isbn)?;
        let scores = self
            .graph
            .edges(&book.label, Some(RATED), Direction::Incoming)?
            .iter()
            .filter_map(|e| e.u64_prop("score").and_then(|s| u8::try_from(s).ok()))
            .collect::<Vec<_>>();
        Ok(BookStats {
            isbn: isbn.to_string(),
            quantity: prop_num(&book, "quantity")?,
            borrowers: self.borrowers_of(&book.label)?.into_keys().collect(),
            ratings: RatingSummary::from_scores(scores),
        })
    }

    fn rate(&self, tag: Tag, username: &str, isbn: &str, score: Score) -> Result<()> {
        let user = self.user_node(username)?;
        let book = self.book_node(isbn)?;
        self.graph
            .set_edge(&Edge::new(&user.label, RATED, &book.label).with("score", score.get()))
            .ack("write rating")?;

        info!(tag = %tag, username, isbn, score = score.get(), "rated book");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_kv::MemoryStore;

    fn library() -> (MemoryStore, GraphLibrary) {
        let store = MemoryStore::new();
        (store.clone(), GraphLibrary::new(Box::new(store)))
    }

    fn book(title: &str, authors: &[&str], isbn: &str) -> NewBook {
        let authors = authors.iter().map(|a| a.to_string()).collect();
        NewBook::new(title, authors, isbn, 100, 1).unwrap()
    }

    #[test]
    fn test_authors_keep_order() {
        let (_, lib) = library();
        lib.add_book(Tag::Add, &book("Good Omens", &["Pratchett", "Gaiman"], "1"))
            .unwrap();
        let got = lib.get_book(Tag::Show, "1").unwrap();
        assert_eq!(got.authors, vec!["Pratchett", "Gaiman"]);
    }

    #[test]
    fn test_author_nodes_shared_and_pruned() {
        let (_, lib) = library();
        lib.add_book(Tag::Add, &book("A", &["Herbert"], "1")).unwrap();
        lib.add_book(Tag::Add, &book("B", &["Herbert", "Anderson"], "2"))
            .unwrap();

        lib.remove_book(Tag::Remove, "2").unwrap();
        assert!(lib.graph.get_node("author:Anderson").unwrap().is_none());
        assert!(lib.graph.get_node("author:Herbert").unwrap().is_some());

        lib.edit_book(Tag::Edit, "1", &BookEdit::Authors(vec!["Asimov".into()]))
            .unwrap();
        assert!(lib.graph.get_node("author:Herbert").unwrap().is_none());
        assert_eq!(lib.get_book(Tag::Show, "1").unwrap().authors, vec!["Asimov"]);
    }

    #[test]
    fn test_borrows_edge_carries_count() {
        let (_, lib) = library();
        let mut dune = book("Dune", &["Herbert"], "111");
        dune.quantity = 2;
        lib.add_book(Tag::Add, &dune).unwrap();
        lib.add_user(Tag::Add, &NewUser::new("Al", "al", 555).unwrap())
            .unwrap();

        lib.checkout(Tag::Action, "al", "111").unwrap();
        lib.checkout(Tag::Action, "al", "111").unwrap();
        let edge = lib
            .graph
            .get_edge("user:al", BORROWS, "book:111")
            .unwrap()
            .unwrap();
        assert_eq!(edge.u64_prop("count"), Some(2));

        lib.checkin(Tag::Action, "al", "111").unwrap();
        lib.checkin(Tag::Action, "al", "111").unwrap();
        assert!(lib.graph.get_edge("user:al", BORROWS, "book:111").unwrap().is_none());
    }

    #[test]
    fn test_labels_with_colons() {
        let (_, lib) = library();
        lib.add_book(Tag::Add, &book("Dune", &["Frank: Herbert"], "978:0441"))
            .unwrap();
        let found = lib
            .find_books(Tag::Search, &BookQuery::Authors(vec!["Frank: Herbert".into()]))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].isbn, "978:0441");
    }
}
