use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocError {
    #[error("doc: not found")]
    NotFound,

    #[error("doc: invalid field path {0:?}")]
    InvalidPath(String),

    #[error("doc: field {0:?} has the wrong type for this update")]
    TypeMismatch(String),

    #[error("doc: storage error: {0}")]
    Storage(String),

    #[error("doc: serialization error: {0}")]
    Serialization(String),
}

impl From<shelf_kv::KVError> for DocError {
    fn from(e: shelf_kv::KVError) -> Self {
        match e {
            shelf_kv::KVError::Serialization(msg) => DocError::Serialization(msg),
            other => DocError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DocError {
    fn from(e: serde_json::Error) -> Self {
        DocError::Serialization(e.to_string())
    }
}
