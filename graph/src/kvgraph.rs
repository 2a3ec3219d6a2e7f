use std::collections::HashMap;

use shelf_kv::{KVError, KVStore};

use crate::error::GraphError;
use crate::graph::{Direction, Edge, Graph, Node, Props};

/// Default KV key separator.
pub const DEFAULT_SEPARATOR: char = ':';

/// ASCII Unit Separator, for graphs whose labels are colon-namespaced.
pub const UNIT_SEPARATOR: char = '\x1F';

/// KV key layout (relative to the configured prefix):
///
/// ```text
/// {prefix}{sep}n{sep}{label}                    -> JSON-encoded node props
/// {prefix}{sep}e{sep}{from}{sep}{kind}{sep}{to}  -> JSON-encoded edge props
/// {prefix}{sep}ei{sep}{to}{sep}{kind}{sep}{from} -> empty (reverse index)
/// ```
///
/// Labels and kinds must not contain the separator. Use [`UNIT_SEPARATOR`]
/// to allow labels such as "book:9780441013593".
pub struct KVGraph {
    store: Box<dyn KVStore>,
    prefix: String,
    sep: char,
}

impl KVGraph {
    /// Create a new KVGraph using the given store and key prefix, with the
    /// default separator.
    pub fn new(store: Box<dyn KVStore>, prefix: &str) -> Self {
        Self::with_separator(store, prefix, DEFAULT_SEPARATOR)
    }

    /// Create a KVGraph with a custom separator.
    pub fn with_separator(store: Box<dyn KVStore>, prefix: &str, sep: char) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
            sep,
        }
    }

    /// Return the separator used by this graph.
    pub fn separator(&self) -> char {
        self.sep
    }

    /// The underlying store, for callers that keep side data (counters)
    /// next to the graph.
    pub fn store(&self) -> &dyn KVStore {
        self.store.as_ref()
    }

    fn validate_segments(&self, segs: &[&str]) -> Result<(), GraphError> {
        for s in segs {
            if s.contains(self.sep) {
                return Err(GraphError::InvalidLabel(s.to_string()));
            }
        }
        Ok(())
    }

    // --- key helpers ---

    fn node_key(&self, label: &str) -> String {
        format!("{}{s}n{s}{}", self.prefix, label, s = self.sep)
    }

    fn node_prefix(&self) -> String {
        format!("{}{s}n{s}", self.prefix, s = self.sep)
    }

    fn fwd_key(&self, from: &str, kind: &str, to: &str) -> String {
        format!("{}{s}e{s}{}{s}{}{s}{}", self.prefix, from, kind, to, s = self.sep)
    }

    fn fwd_prefix(&self, from: &str, kind: Option<&str>) -> String {
        match kind {
            Some(k) => format!("{}{s}e{s}{}{s}{}{s}", self.prefix, from, k, s = self.sep),
            None => format!("{}{s}e{s}{}{s}", self.prefix, from, s = self.sep),
        }
    }

    fn rev_key(&self, to: &str, kind: &str, from: &str) -> String {
        format!("{}{s}ei{s}{}{s}{}{s}{}", self.prefix, to, kind, from, s = self.sep)
    }

    fn rev_prefix(&self, to: &str, kind: Option<&str>) -> String {
        match kind {
            Some(k) => format!("{}{s}ei{s}{}{s}{}{s}", self.prefix, to, k, s = self.sep),
            None => format!("{}{s}ei{s}{}{s}", self.prefix, to, s = self.sep),
        }
    }

    /// Split the three trailing segments of an edge key after `marker`.
    fn parse_edge_key(&self, key: &str, marker: &str) -> Option<(String, String, String)> {
        let pfx = format!("{}{s}{}{s}", self.prefix, marker, s = self.sep);
        let rest = key.strip_prefix(&pfx)?;
        let mut parts = rest.splitn(3, self.sep);
        let a = parts.next()?.to_string();
        let kind = parts.next()?.to_string();
        let b = parts.next()?.to_string();
        if b.contains(self.sep) {
            return None;
        }
        Some((a, kind, b))
    }

    fn outgoing(&self, label: &str, kind: Option<&str>) -> Result<Vec<Edge>, GraphError> {
        let mut out = Vec::new();
        for (key, value) in self.store.scan(&self.fwd_prefix(label, kind)).map_err(map_kv_err)? {
            if let Some((from, kind, to)) = self.parse_edge_key(&key, "e") {
                out.push(Edge {
                    from,
                    to,
                    kind,
                    props: decode_props(&value)?,
                });
            }
        }
        Ok(out)
    }

    fn incoming(&self, label: &str, kind: Option<&str>) -> Result<Vec<Edge>, GraphError> {
        let mut out = Vec::new();
        for (key, _) in self.store.scan(&self.rev_prefix(label, kind)).map_err(map_kv_err)? {
            if let Some((to, kind, from)) = self.parse_edge_key(&key, "ei") {
                if let Some(edge) = self.get_edge(&from, &kind, &to)? {
                    out.push(edge);
                }
            }
        }
        Ok(out)
    }
}

fn map_kv_err(e: KVError) -> GraphError {
    GraphError::Storage(e.to_string())
}

fn decode_props(data: &[u8]) -> Result<Props, GraphError> {
    if data.is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_slice(data).map_err(|e| GraphError::Serialization(e.to_string()))
}

fn encode_props(props: &Props) -> Result<Vec<u8>, GraphError> {
    serde_json::to_vec(props).map_err(|e| GraphError::Serialization(e.to_string()))
}

impl Graph for KVGraph {
    fn get_node(&self, label: &str) -> Result<Option<Node>, GraphError> {
        self.validate_segments(&[label])?;
        match self.store.get(&self.node_key(label)).map_err(map_kv_err)? {
            Some(data) => Ok(Some(Node {
                label: label.to_string(),
                props: decode_props(&data)?,
            })),
            None => Ok(None),
        }
    }

    fn create_node(&self, node: &Node) -> Result<(), GraphError> {
        if self.merge_node(node)? {
            Ok(())
        } else {
            Err(GraphError::AlreadyExists(node.label.clone()))
        }
    }

    fn merge_node(&self, node: &Node) -> Result<bool, GraphError> {
        self.validate_segments(&[&node.label])?;
        let data = encode_props(&node.props)?;
        let mut created = false;
        self.store
            .update(&self.node_key(&node.label), &mut |cur| match cur {
                Some(existing) => Ok(Some(existing.to_vec())),
                None => {
                    created = true;
                    Ok(Some(data.clone()))
                }
            })
            .map_err(map_kv_err)?;
        Ok(created)
    }

    fn set_node(&self, node: &Node) -> Result<(), GraphError> {
        self.validate_segments(&[&node.label])?;
        let data = encode_props(&node.props)?;
        self.store
            .set(&self.node_key(&node.label), &data)
            .map_err(map_kv_err)
    }

    fn merge_props(&self, label: &str, props: &Props) -> Result<(), GraphError> {
        let mut node = self.get_node(label)?.ok_or(GraphError::NotFound)?;
        for (k, v) in props {
            if v.is_null() {
                node.props.remove(k);
            } else {
                node.props.insert(k.clone(), v.clone());
            }
        }
        self.set_node(&node)
    }

    fn delete_node(&self, label: &str) -> Result<(), GraphError> {
        self.validate_segments(&[label])?;

        let edges = self.edges(label, None, Direction::Both)?;
        let mut keys: Vec<String> = Vec::with_capacity(1 + edges.len() * 2);
        keys.push(self.node_key(label));
        for e in &edges {
            keys.push(self.fwd_key(&e.from, &e.kind, &e.to));
            keys.push(self.rev_key(&e.to, &e.kind, &e.from));
        }

        let key_refs: Vec<&str> = keys.iter().map(|s| s.as_str()).collect();
        self.store.batch_delete(&key_refs).map_err(map_kv_err)
    }

    fn list_nodes(&self, prefix: &str) -> Result<Vec<Node>, GraphError> {
        let kv_prefix = self.node_prefix();
        let entries = self
            .store
            .scan(&format!("{kv_prefix}{prefix}"))
            .map_err(map_kv_err)?;

        let mut result = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let Some(label) = key.strip_prefix(&kv_prefix) else {
                continue;
            };
            result.push(Node {
                label: label.to_string(),
                props: decode_props(&value)?,
            });
        }
        Ok(result)
    }

    fn get_edge(&self, from: &str, kind: &str, to: &str) -> Result<Option<Edge>, GraphError> {
        self.validate_segments(&[from, kind, to])?;
        match self.store.get(&self.fwd_key(from, kind, to)).map_err(map_kv_err)? {
            Some(data) => Ok(Some(Edge {
                from: from.to_string(),
                to: to.to_string(),
                kind: kind.to_string(),
                props: decode_props(&data)?,
            })),
            None => Ok(None),
        }
    }

    fn set_edge(&self, edge: &Edge) -> Result<(), GraphError> {
        self.validate_segments(&[&edge.from, &edge.kind, &edge.to])?;
        let fwd = self.fwd_key(&edge.from, &edge.kind, &edge.to);
        let rev = self.rev_key(&edge.to, &edge.kind, &edge.from);
        let data = encode_props(&edge.props)?;
        self.store
            .batch_set(&[(fwd.as_str(), data.as_slice()), (rev.as_str(), &[] as &[u8])])
            .map_err(map_kv_err)
    }

    fn remove_edge(&self, from: &str, kind: &str, to: &str) -> Result<(), GraphError> {
        self.validate_segments(&[from, kind, to])?;
        let fwd = self.fwd_key(from, kind, to);
        let rev = self.rev_key(to, kind, from);
        self.store
            .batch_delete(&[fwd.as_str(), rev.as_str()])
            .map_err(map_kv_err)
    }

    fn edges(
        &self,
        label: &str,
        kind: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<Edge>, GraphError> {
        self.validate_segments(&[label])?;
        if let Some(k) = kind {
            self.validate_segments(&[k])?;
        }

        match direction {
            Direction::Outgoing => self.outgoing(label, kind),
            Direction::Incoming => self.incoming(label, kind),
            Direction::Both => {
                let mut edges = self.outgoing(label, kind)?;
                // Self-loops are already captured by the outgoing scan.
                edges.extend(self.incoming(label, kind)?.into_iter().filter(|e| e.from != label));
                Ok(edges)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use shelf_kv::{MemoryStore, RedbStore};

    fn new_test_graph() -> KVGraph {
        KVGraph::with_separator(Box::new(MemoryStore::new()), "g", UNIT_SEPARATOR)
    }

    #[test]
    fn test_invalid_label_separator() {
        let g = KVGraph::new(Box::new(MemoryStore::new()), "g");

        assert!(matches!(g.get_node("book:1"), Err(GraphError::InvalidLabel(_))));
        assert!(matches!(
            g.create_node(&Node::new("book:1")),
            Err(GraphError::InvalidLabel(_))
        ));
        assert!(matches!(
            g.set_edge(&Edge::new("a", "KIND:SUB", "b")),
            Err(GraphError::InvalidLabel(_))
        ));
        assert!(matches!(
            g.edges("a:b", None, Direction::Both),
            Err(GraphError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_colon_labels_with_unit_separator() {
        let g = new_test_graph();
        g.create_node(&Node::new("book:111").with("title", "Dune")).unwrap();
        let got = g.get_node("book:111").unwrap().unwrap();
        assert_eq!(got.str_prop("title"), Some("Dune"));
    }

    #[test]
    fn test_create_node_is_unique() {
        let g = new_test_graph();
        g.create_node(&Node::new("user:al").with("name", "Al")).unwrap();
        let err = g
            .create_node(&Node::new("user:al").with("name", "Other"))
            .unwrap_err();
        assert!(matches!(err, GraphError::AlreadyExists(ref l) if l == "user:al"));

        // The original node is untouched.
        let got = g.get_node("user:al").unwrap().unwrap();
        assert_eq!(got.str_prop("name"), Some("Al"));
    }

    #[test]
    fn test_merge_node_keeps_existing() {
        let g = new_test_graph();
        assert!(g.merge_node(&Node::new("author:Herbert").with("n", 1)).unwrap());
        assert!(!g.merge_node(&Node::new("author:Herbert").with("n", 2)).unwrap());
        assert_eq!(g.get_node("author:Herbert").unwrap().unwrap().u64_prop("n"), Some(1));
    }

    #[test]
    fn test_merge_props() {
        let g = new_test_graph();
        g.set_node(&Node::new("X").with("a", "1").with("b", "2")).unwrap();

        let mut patch = Props::new();
        patch.insert("b".into(), json!("updated"));
        patch.insert("a".into(), Value::Null);
        patch.insert("c".into(), json!(3));
        g.merge_props("X", &patch).unwrap();

        let got = g.get_node("X").unwrap().unwrap();
        assert!(!got.props.contains_key("a"));
        assert_eq!(got.props["b"], json!("updated"));
        assert_eq!(got.u64_prop("c"), Some(3));
    }

    #[test]
    fn test_merge_props_not_found() {
        let g = new_test_graph();
        let result = g.merge_props("ghost", &Props::new());
        assert!(matches!(result, Err(GraphError::NotFound)));
    }

    #[test]
    fn test_list_nodes_by_prefix() {
        let g = new_test_graph();
        for label in ["book:2", "book:1", "user:al", "author:x"] {
            g.set_node(&Node::new(label)).unwrap();
        }
        let books: Vec<String> = g
            .list_nodes("book:")
            .unwrap()
            .into_iter()
            .map(|n| n.label)
            .collect();
        assert_eq!(books, vec!["book:1", "book:2"]);
        assert_eq!(g.list_nodes("").unwrap().len(), 4);
    }

    #[test]
    fn test_edge_props_round_trip() {
        let g = new_test_graph();
        g.set_edge(&Edge::new("user:al", "BORROWS", "book:111").with("count", 1))
            .unwrap();
        g.set_edge(&Edge::new("user:al", "BORROWS", "book:111").with("count", 2))
            .unwrap();

        let e = g.get_edge("user:al", "BORROWS", "book:111").unwrap().unwrap();
        assert_eq!(e.u64_prop("count"), Some(2));
        assert_eq!(g.edges("user:al", None, Direction::Outgoing).unwrap().len(), 1);
    }

    #[test]
    fn test_edges_by_direction_and_kind() {
        let g = new_test_graph();
        g.set_edge(&Edge::new("author:h", "AUTHOR_OF", "book:1")).unwrap();
        g.set_edge(&Edge::new("user:al", "BORROWS", "book:1").with("count", 1))
            .unwrap();
        g.set_edge(&Edge::new("user:al", "RATED", "book:1").with("score", 5))
            .unwrap();

        let incoming = g.edges("book:1", None, Direction::Incoming).unwrap();
        assert_eq!(incoming.len(), 3);

        let borrows = g.edges("book:1", Some("BORROWS"), Direction::Incoming).unwrap();
        assert_eq!(borrows.len(), 1);
        assert_eq!(borrows[0].from, "user:al");
        assert_eq!(borrows[0].u64_prop("count"), Some(1));

        assert!(g.edges("book:1", None, Direction::Outgoing).unwrap().is_empty());
        assert_eq!(
            g.neighbors("book:1", None, Direction::Both).unwrap(),
            vec!["author:h", "user:al"]
        );
    }

    #[test]
    fn test_self_loop_counted_once() {
        let g = new_test_graph();
        g.set_edge(&Edge::new("A", "self", "A")).unwrap();
        g.set_edge(&Edge::new("A", "knows", "B")).unwrap();
        assert_eq!(g.edges("A", None, Direction::Both).unwrap().len(), 2);
        assert_eq!(g.neighbors("A", None, Direction::Both).unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_remove_edge() {
        let g = new_test_graph();
        g.set_edge(&Edge::new("A", "knows", "B")).unwrap();
        g.remove_edge("A", "knows", "B").unwrap();
        assert!(g.get_edge("A", "knows", "B").unwrap().is_none());
        assert!(g.edges("B", None, Direction::Both).unwrap().is_empty());

        // Removing again is fine.
        g.remove_edge("A", "knows", "B").unwrap();
    }

    #[test]
    fn test_delete_node_detaches_edges() {
        let store = MemoryStore::new();
        let g = KVGraph::with_separator(Box::new(store.clone()), "g", UNIT_SEPARATOR);
        g.set_node(&Node::new("A")).unwrap();
        g.set_node(&Node::new("B")).unwrap();
        g.set_edge(&Edge::new("A", "knows", "B")).unwrap();
        g.set_edge(&Edge::new("B", "knows", "A")).unwrap();

        g.delete_node("A").unwrap();

        assert!(g.get_node("A").unwrap().is_none());
        assert!(g.edges("B", None, Direction::Both).unwrap().is_empty());
        assert_eq!(store.len(), 1, "only node B should remain");
    }

    #[test]
    fn test_redb_backed_graph() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("graph.redb")).unwrap();
        let g = KVGraph::with_separator(Box::new(store), "g", UNIT_SEPARATOR);
        g.create_node(&Node::new("book:1")).unwrap();
        g.set_edge(&Edge::new("user:1", "BORROWS", "book:1")).unwrap();
        assert_eq!(g.neighbors("book:1", Some("BORROWS"), Direction::Incoming).unwrap(), vec!["user:1"]);
    }
}
