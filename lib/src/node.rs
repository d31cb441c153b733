//! The versioned unit of the graph.
//!
//! A [`Node`] owns its generation inputs, the generated plan/output/diff, an
//! optional evaluation score, and its links to parents and children. Nodes
//! persist as a directory of sibling files (`output.txt`, `plan.json`,
//! `diff.patch`, `meta.json`); `meta.json` plus siblings are authoritative,
//! the graph index is not.

use crate::diff::unified_diff;
use crate::id::NodeId;
use crate::plan::{self, Step};
use crate::storage::{self, Storage};
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a node improves on its parents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImprovementType {
    /// At most one parent: a root or an iterative refinement
    Standard,
    /// More than one parent: a synthesis of prior versions
    Synthetic,
}

/// A single versioned unit of generated content plus its plan and links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique identity, assigned at construction
    pub id: NodeId,
    /// Ordered parent identifiers; set at construction or edge-attach time
    pub parent_ids: Vec<NodeId>,
    /// The task this node was generated for
    pub user_prompt: String,
    /// System prompt override; empty means "use the configured template"
    pub system_prompt: String,
    /// Model override; empty means "use the configured default"
    pub model: String,
    /// Generated output text, empty until generation completes
    pub output: String,
    /// Generated plan steps, empty until generation completes
    pub plan: Vec<Step>,
    /// Unified diff against the parent(s), empty until computed
    pub diff: String,
    /// Evaluation score in [0, 1], absent until evaluated
    pub score: Option<f64>,
    /// Whether this node refines one parent or synthesizes several
    #[serde(rename = "type")]
    pub kind: ImprovementType,
    /// Children registered by the graph store; append-only, deduplicated
    pub children: Vec<NodeId>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Free-form key/value bag for caller extensions
    pub metadata: serde_json::Map<String, Value>,
}

impl Node {
    /// Create a node for a task
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            parent_ids: Vec::new(),
            user_prompt: user_prompt.into(),
            system_prompt: String::new(),
            model: String::new(),
            output: String::new(),
            plan: Vec::new(),
            diff: String::new(),
            score: None,
            kind: ImprovementType::Standard,
            children: Vec::new(),
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the parents. More than one parent makes the node synthetic,
    /// whatever kind was set before.
    pub fn with_parents(mut self, parent_ids: Vec<NodeId>) -> Self {
        if parent_ids.len() > 1 {
            self.kind = ImprovementType::Synthetic;
        }
        self.parent_ids = parent_ids;
        self
    }

    /// Register a child link. Idempotent: re-registering an existing child
    /// leaves the list unchanged.
    pub fn register_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Whether this node still needs its content generated
    pub fn needs_generation(&self) -> bool {
        self.output.is_empty() && !self.user_prompt.is_empty()
    }

    /// Render the plan as `"{order}. {text}"` lines
    pub fn plan_text(&self) -> String {
        plan::render_plan(&self.plan)
    }

    /// Text diff of this node's plan against another node's plan
    pub fn diff_plan(&self, other: &Node) -> String {
        unified_diff(&self.plan_text(), &other.plan_text())
    }

    /// Persist this node's content files under the storage root
    pub fn save(&self, storage: &Storage) -> Result<(), StorageError> {
        let dir = storage.node_dir(self.id);
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Write {
            path: dir.clone(),
            source,
        })?;

        storage::write_file(&dir.join("output.txt"), &self.output)?;
        let plan_json = serde_json::to_string_pretty(&self.plan).map_err(|source| {
            StorageError::Malformed {
                path: dir.join("plan.json"),
                source,
            }
        })?;
        storage::write_file(&dir.join("plan.json"), &plan_json)?;
        storage::write_file(&dir.join("diff.patch"), &self.diff)?;

        let meta = NodeMeta {
            id: self.id,
            parent_ids: self.parent_ids.clone(),
            user_prompt: self.user_prompt.clone(),
            system_prompt: self.system_prompt.clone(),
            model: self.model.clone(),
            score: self.score,
            kind: self.kind,
            children: self.children.clone(),
            created_at: self.created_at,
            metadata: self.metadata.clone(),
            plan: self.plan.clone(),
        };
        let meta_path = dir.join("meta.json");
        let meta_json =
            serde_json::to_string_pretty(&meta).map_err(|source| StorageError::Malformed {
                path: meta_path.clone(),
                source,
            })?;
        storage::write_file(&meta_path, &meta_json)
    }

    /// Load a node's content files from the storage root
    pub fn load(storage: &Storage, id: NodeId) -> Result<Self, StorageError> {
        let dir = storage.node_dir(id);
        let meta_path = dir.join("meta.json");
        let meta: NodeMeta = serde_json::from_str(&storage::read_file(&meta_path)?)
            .map_err(|source| StorageError::Malformed {
                path: meta_path,
                source,
            })?;

        // plan.json wins over the copy embedded in meta.json
        let plan_path = dir.join("plan.json");
        let plan = if plan_path.exists() {
            serde_json::from_str(&storage::read_file(&plan_path)?).unwrap_or_default()
        } else {
            meta.plan
        };

        Ok(Self {
            id: meta.id,
            parent_ids: meta.parent_ids,
            user_prompt: meta.user_prompt,
            system_prompt: meta.system_prompt,
            model: meta.model,
            output: storage::read_file(&dir.join("output.txt"))?,
            plan,
            diff: storage::read_file(&dir.join("diff.patch"))?,
            score: meta.score,
            kind: meta.kind,
            children: meta.children,
            created_at: meta.created_at,
            metadata: meta.metadata,
        })
    }
}

/// On-disk shape of `meta.json`. Output and diff live in sibling files.
#[derive(Debug, Serialize, Deserialize)]
struct NodeMeta {
    id: NodeId,
    parent_ids: Vec<NodeId>,
    user_prompt: String,
    system_prompt: String,
    model: String,
    score: Option<f64>,
    #[serde(rename = "type")]
    kind: ImprovementType,
    children: Vec<NodeId>,
    created_at: DateTime<Utc>,
    metadata: serde_json::Map<String, Value>,
    #[serde(default)]
    plan: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let node = Node::new("write a poem");
        assert_eq!(node.kind, ImprovementType::Standard);
        assert!(node.parent_ids.is_empty());
        assert!(node.output.is_empty());
        assert!(node.score.is_none());
        assert!(node.needs_generation());
    }

    #[test]
    fn test_multiple_parents_promote_to_synthetic() {
        let node = Node::new("combine").with_parents(vec![NodeId::new(), NodeId::new()]);
        assert_eq!(node.kind, ImprovementType::Synthetic);

        let node = Node::new("refine").with_parents(vec![NodeId::new()]);
        assert_eq!(node.kind, ImprovementType::Standard);
    }

    #[test]
    fn test_register_child_idempotent() {
        let mut node = Node::new("root");
        let child = NodeId::new();
        node.register_child(child);
        node.register_child(child);
        assert_eq!(node.children, vec![child]);
    }

    #[test]
    fn test_diff_plan_simple() {
        let mut a = Node::new("a");
        a.plan = vec![Step::new(1, "Outline"), Step::new(2, "Draft")];
        let mut b = Node::new("b");
        b.plan = vec![Step::new(1, "Outline"), Step::new(2, "Polish")];

        let diff = a.diff_plan(&b);
        assert!(diff.contains("-2. Draft"));
        assert!(diff.contains("+2. Polish"));
        assert_eq!(a.diff_plan(&a), "");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();

        let parent = NodeId::new();
        let child = NodeId::new();
        let mut node = Node::new("summarize the report")
            .with_system_prompt("be terse")
            .with_model("gpt-4o")
            .with_parents(vec![parent]);
        node.output = "A short summary.".to_string();
        node.plan = vec![Step::new(1, "Read"), Step::new(2, "Summarize")];
        node.diff = "--- A\n+++ B\n".to_string();
        node.score = Some(0.75);
        node.register_child(child);
        node.metadata
            .insert("source".to_string(), Value::String("unit-test".to_string()));

        node.save(&storage).unwrap();
        let loaded = Node::load(&storage, node.id).unwrap();

        assert_eq!(loaded.id, node.id);
        assert_eq!(loaded.parent_ids, vec![parent]);
        assert_eq!(loaded.user_prompt, "summarize the report");
        assert_eq!(loaded.system_prompt, "be terse");
        assert_eq!(loaded.model, "gpt-4o");
        assert_eq!(loaded.output, "A short summary.");
        assert_eq!(loaded.plan, node.plan);
        assert_eq!(loaded.diff, node.diff);
        assert_eq!(loaded.score, Some(0.75));
        assert_eq!(loaded.kind, ImprovementType::Standard);
        assert_eq!(loaded.children, vec![child]);
        assert_eq!(loaded.metadata, node.metadata);
    }

    #[test]
    fn test_load_missing_node_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        assert!(Node::load(&storage, NodeId::new()).is_err());
    }

    #[test]
    fn test_type_serializes_lowercase() {
        let node = Node::new("x");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "standard");
    }
}
