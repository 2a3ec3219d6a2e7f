//! Library management over interchangeable stores.
//!
//! Every backend implements [`Library`] on top of a [`shelf_kv::KVStore`]:
//!
//! - [`KvLibrary`]: hash records with secondary-index buckets.
//! - [`DocLibrary`]: one JSON document per book and per user.
//! - [`GraphLibrary`]: book, user and author nodes joined by edges.
//!
//! Use [`open`] to pick one at runtime.

pub mod doc;
pub mod error;
pub mod graph;
pub mod kv;
pub mod library;
pub mod model;
pub mod sort;


use shelf_kv::KVStore;

pub use doc::DocLibrary;
pub use error::{EntityKind, LibraryError, Result};
pub use graph::GraphLibrary;
pub use kv::KvLibrary;
pub use library::{Backend, Library};
pub use model::{
    Book, BookEdit, BookField, BookQuery, BookStats, Loan, NewBook, NewUser, RatingSummary, Score,
    Tag, User, UserEdit, UserField, UserQuery, UserStats,
};

/// Build the [`Library`] for `backend` over `store`.
pub fn open(backend: Backend, store: Box<dyn KVStore>) -> Box<dyn Library> {
    tracing::debug!(tag = %Tag::Init, backend = %backend, "opening library");
    match backend {
        Backend::Kv => Box::new(KvLibrary::new(store)),
        Backend::Doc => Box::new(DocLibrary::new(store)),
        Backend::Graph => Box::new(GraphLibrary::new(store)),
    }
}
