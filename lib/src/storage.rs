//! Storage root layout and the graph index file.
//!
//! Everything lives under one root directory:
//!
//! ```text
//! <root>/graph.json          secondary index: node summaries + edge list
//! <root>/nodes/<uuid>/       authoritative per-node content (see `node`)
//! ```
//!
//! `graph.json` is a consistency cache. Reload reads its id set and then
//! trusts the per-node files; summaries stored in the index are never
//! deserialized back into nodes.

use crate::error::StorageError;
use crate::id::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The serialized topology index kept in `graph.json`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GraphIndex {
    /// Node summaries keyed by id, written for inspection and tooling
    pub nodes: HashMap<NodeId, serde_json::Value>,
    /// Parent-to-child edge list derived from each node's parents
    pub edges: Vec<GraphEdge>,
}

/// One directed edge in the index, parent to child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Parent node id
    #[serde(rename = "from")]
    pub source: NodeId,
    /// Child node id
    #[serde(rename = "to")]
    pub target: NodeId,
}

/// A storage root on the local filesystem
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Open (creating if needed) a storage root. A leading `~` in the path
    /// expands to `$HOME`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = expand_tilde(path.as_ref());
        std::fs::create_dir_all(root.join("nodes")).map_err(|source| StorageError::Write {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// The root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one node's content files
    pub fn node_dir(&self, id: NodeId) -> PathBuf {
        self.root.join("nodes").join(id.to_string())
    }

    /// Whether a node has content on disk
    pub fn node_exists(&self, id: NodeId) -> bool {
        self.node_dir(id).exists()
    }

    /// Write the graph index
    pub fn save_graph(&self, index: &GraphIndex) -> Result<(), StorageError> {
        let path = self.root.join("graph.json");
        let json = serde_json::to_string_pretty(index).map_err(|source| {
            StorageError::Malformed {
                path: path.clone(),
                source,
            }
        })?;
        write_file(&path, &json)
    }

    /// Read the graph index, empty when none has been written yet
    pub fn load_graph(&self) -> Result<GraphIndex, StorageError> {
        let path = self.root.join("graph.json");
        if !path.exists() {
            return Ok(GraphIndex::default());
        }
        let raw = read_file(&path)?;
        serde_json::from_str(&raw).map_err(|source| StorageError::Malformed { path, source })
    }
}

/// Write a file, mapping failures with the path attached
pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), StorageError> {
    std::fs::write(path, contents).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a file, mapping failures with the path attached
pub(crate) fn read_file(path: &Path) -> Result<String, StorageError> {
    std::fs::read_to_string(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        assert!(storage.root().join("nodes").is_dir());
    }

    #[test]
    fn test_graph_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();

        let parent = NodeId::new();
        let child = NodeId::new();
        let mut index = GraphIndex::default();
        index.nodes.insert(parent, serde_json::json!({"id": parent.to_string()}));
        index.edges.push(GraphEdge {
            source: parent,
            target: child,
        });

        storage.save_graph(&index).unwrap();
        let loaded = storage.load_graph().unwrap();
        assert!(loaded.nodes.contains_key(&parent));
        assert_eq!(loaded.edges, vec![GraphEdge { source: parent, target: child }]);
    }

    #[test]
    fn test_load_graph_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        let index = storage.load_graph().unwrap();
        assert!(index.nodes.is_empty());
        assert!(index.edges.is_empty());
    }

    #[test]
    fn test_node_exists() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        let id = NodeId::new();
        assert!(!storage.node_exists(id));
        std::fs::create_dir_all(storage.node_dir(id)).unwrap();
        assert!(storage.node_exists(id));
    }
}
