pub mod error;
pub mod graph;
pub mod kvgraph;

pub use error::GraphError;
pub use graph::{Direction, Edge, Graph, Node, Props};
pub use kvgraph::{KVGraph, DEFAULT_SEPARATOR, UNIT_SEPARATOR};
