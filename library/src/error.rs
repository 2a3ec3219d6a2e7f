use std::fmt;

use thiserror::Error;

/// The two entity types a library tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Book,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Book => "book",
            EntityKind::User => "user",
        }
    }

    /// The natural key a caller addresses this kind by.
    pub fn key_field(&self) -> &'static str {
        match self {
            EntityKind::Book => "isbn",
            EntityKind::User => "username",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("{kind} with {} {key:?} already exists", kind.key_field())]
    AlreadyExists { kind: EntityKind, key: String },

    #[error("{kind} with {} {key:?} not found", kind.key_field())]
    NotFound { kind: EntityKind, key: String },

    #[error("book {isbn:?} is out of stock")]
    OutOfStock { isbn: String },

    #[error("user {username:?} has no active loan of book {isbn:?}")]
    NoActiveLoan { username: String, isbn: String },

    #[error("{kind} {key:?} still has {loans} copies on loan")]
    HasActiveReferences {
        kind: EntityKind,
        key: String,
        loans: u64,
    },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    /// A write was not acknowledged by the store; the operation stopped at
    /// `step` and later steps did not run.
    #[error("store did not acknowledge {step}: {reason}")]
    Unacknowledged { step: &'static str, reason: String },

    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;

impl LibraryError {
    pub fn not_found(kind: EntityKind, key: &str) -> Self {
        LibraryError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn already_exists(kind: EntityKind, key: &str) -> Self {
        LibraryError::AlreadyExists {
            kind,
            key: key.to_string(),
        }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        LibraryError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            LibraryError::AlreadyExists { .. } => "already_exists",
            LibraryError::NotFound { .. } => "not_found",
            LibraryError::OutOfStock { .. } => "out_of_stock",
            LibraryError::NoActiveLoan { .. } => "no_active_loan",
            LibraryError::HasActiveReferences { .. } => "has_active_references",
            LibraryError::InvalidField { .. } => "invalid_field",
            LibraryError::Unacknowledged { .. } => "unacknowledged",
            LibraryError::Backend(_) => "backend",
        }
    }
}

impl From<shelf_kv::KVError> for LibraryError {
    fn from(e: shelf_kv::KVError) -> Self {
        LibraryError::Backend(e.to_string())
    }
}

impl From<shelf_doc::DocError> for LibraryError {
    fn from(e: shelf_doc::DocError) -> Self {
        LibraryError::Backend(e.to_string())
    }
}

impl From<shelf_graph::GraphError> for LibraryError {
    fn from(e: shelf_graph::GraphError) -> Self {
        match e {
            shelf_graph::GraphError::InvalidLabel(label) => {
                LibraryError::invalid("value", format!("{label:?} contains a reserved character"))
            }
            other => LibraryError::Backend(other.to_string()),
        }
    }
}

/// Marks a write as one numbered step of a multi-step operation.
///
/// A failed write becomes [`LibraryError::Unacknowledged`] naming the step;
/// reads keep using `?` and surface as [`LibraryError::Backend`].
pub(crate) trait Ack<T> {
    fn ack(self, step: &'static str) -> Result<T>;
}

impl<T, E: fmt::Display> Ack<T> for std::result::Result<T, E> {
    fn ack(self, step: &'static str) -> Result<T> {
        self.map_err(|e| LibraryError::Unacknowledged {
            step,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_key() {
        let err = LibraryError::already_exists(EntityKind::Book, "111");
        assert_eq!(err.to_string(), "book with isbn \"111\" already exists");

        let err = LibraryError::not_found(EntityKind::User, "al");
        assert_eq!(err.to_string(), "user with username \"al\" not found");
    }

    #[test]
    fn test_ack_names_step() {
        let res: std::result::Result<(), String> = Err("disk full".into());
        let err = res.ack("decrement quantity").unwrap_err();
        assert!(matches!(err, LibraryError::Unacknowledged { step: "decrement quantity", .. }));
        assert_eq!(err.code(), "unacknowledged");
    }
}
