use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("graph: not found")]
    NotFound,

    #[error("graph: node {0:?} already exists")]
    AlreadyExists(String),

    #[error("graph: label contains separator: {0:?}")]
    InvalidLabel(String),

    #[error("graph: storage error: {0}")]
    Storage(String),

    #[error("graph: serialization error: {0}")]
    Serialization(String),
}

impl From<shelf_kv::KVError> for GraphError {
    fn from(e: shelf_kv::KVError) -> Self {
        GraphError::Storage(e.to_string())
    }
}
