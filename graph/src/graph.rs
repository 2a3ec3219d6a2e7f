use std::collections::HashMap;

use serde_json::Value;

use crate::error::GraphError;

/// JSON-compatible property bag attached to nodes and edges.
pub type Props = HashMap<String, Value>;

/// Node is a vertex in the graph identified by a unique label.
///
/// Labels act as node keys: at most one node exists per label.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Unique identifier for this node.
    pub label: String,

    /// Arbitrary key-value properties.
    pub props: Props,
}

impl Node {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            props: Props::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }

    /// String property, if present and a string.
    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer property, if present and numeric.
    pub fn u64_prop(&self, key: &str) -> Option<u64> {
        self.props.get(key).and_then(Value::as_u64)
    }
}

/// Edge is a typed directed relationship between two nodes.
///
/// At most one edge exists per (from, kind, to); setting it again replaces
/// its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Source node label.
    pub from: String,

    /// Target node label.
    pub to: String,

    /// Relationship type (e.g. "BORROWS", "AUTHOR_OF").
    pub kind: String,

    /// Edge properties (e.g. a loan count).
    pub props: Props,
}

impl Edge {
    pub fn new(from: impl Into<String>, kind: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
            props: Props::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }

    pub fn u64_prop(&self, key: &str) -> Option<u64> {
        self.props.get(key).and_then(Value::as_u64)
    }
}

/// Which edges to follow from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// Graph is the interface for a property graph.
///
/// All implementations must be safe for concurrent use (Send + Sync).
pub trait Graph: Send + Sync {
    // --- Node operations ---

    /// Retrieve a node by label. Returns `None` if not present.
    fn get_node(&self, label: &str) -> Result<Option<Node>, GraphError>;

    /// Create a node. Fails with `GraphError::AlreadyExists` if the label
    /// is taken.
    fn create_node(&self, node: &Node) -> Result<(), GraphError>;

    /// Create a node only if the label is free. Returns whether it was
    /// created. Existing nodes are left untouched.
    fn merge_node(&self, node: &Node) -> Result<bool, GraphError>;

    /// Create or overwrite a node.
    fn set_node(&self, node: &Node) -> Result<(), GraphError>;

    /// Merge properties into an existing node. `Value::Null` removes a key.
    /// Returns `GraphError::NotFound` if the node does not exist.
    fn merge_props(&self, label: &str, props: &Props) -> Result<(), GraphError>;

    /// Remove a node and all its edges (both directions).
    fn delete_node(&self, label: &str) -> Result<(), GraphError>;

    /// List nodes whose label starts with `prefix`, ordered by label.
    fn list_nodes(&self, prefix: &str) -> Result<Vec<Node>, GraphError>;

    // --- Edge operations ---

    /// Retrieve an edge. Returns `None` if not present.
    fn get_edge(&self, from: &str, kind: &str, to: &str) -> Result<Option<Edge>, GraphError>;

    /// Create or replace an edge.
    fn set_edge(&self, edge: &Edge) -> Result<(), GraphError>;

    /// Remove an edge. No error if it does not exist.
    fn remove_edge(&self, from: &str, kind: &str, to: &str) -> Result<(), GraphError>;

    /// Edges touching `label` in the given direction, optionally restricted
    /// to one kind.
    fn edges(
        &self,
        label: &str,
        kind: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<Edge>, GraphError>;

    /// Labels of nodes directly connected to `label`, sorted and deduplicated.
    fn neighbors(
        &self,
        label: &str,
        kind: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<String>, GraphError> {
        let mut labels: Vec<String> = self
            .edges(label, kind, direction)?
            .into_iter()
            .map(|e| if e.from == label { e.to } else { e.from })
            .collect();
        labels.sort();
        labels.dedup();
        Ok(labels)
    }
}
