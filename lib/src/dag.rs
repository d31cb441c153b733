//! The graph store: node collection, topology, generation, diffs, persistence.
//!
//! The [`Dag`] owns every node. Edges are stored on the nodes themselves
//! (`parent_ids` forward, `children` inverse) and the two sides are kept
//! consistent synchronously on every mutation; child links are never computed
//! lazily. The graph is acyclic by construction: a node can only name
//! already-existing nodes as parents.

use crate::config::Config;
use crate::diff::unified_diff;
use crate::error::{GraphError, Result};
use crate::generate::Generator;
use crate::id::NodeId;
use crate::node::{ImprovementType, Node};
use crate::plan::Step;
use crate::storage::{GraphEdge, GraphIndex, Storage};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;

/// Separator between parent outputs, in prompts and in multi-parent diff
/// reference text
pub const PARENT_SEPARATOR: &str = "\n\n---\n\n";

/// The graph store owning the node collection and its topology
pub struct Dag {
    nodes: HashMap<NodeId, Node>,
    storage: Storage,
}

impl Dag {
    /// Open a graph against a storage root, reloading any persisted nodes.
    ///
    /// Ids listed in the graph index whose on-disk content is missing or
    /// unreadable are skipped with a warning; the index is a cache, the
    /// per-node files are authoritative.
    pub fn open(storage: Storage) -> Result<Self> {
        let index = storage.load_graph()?;
        let mut nodes = HashMap::new();
        for id in index.nodes.keys().copied() {
            if !storage.node_exists(id) {
                tracing::warn!(node = %id, "indexed node has no content on disk; skipping");
                continue;
            }
            match Node::load(&storage, id) {
                Ok(node) => {
                    nodes.insert(id, node);
                }
                Err(err) => {
                    tracing::warn!(node = %id, error = %err, "failed to load node; skipping");
                }
            }
        }
        tracing::info!(count = nodes.len(), "graph loaded");
        Ok(Self { nodes, storage })
    }

    /// The storage root backing this graph
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Number of nodes in the graph
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Iterate over all nodes, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Insert a node, registering it as a child on every parent already in
    /// the graph. Re-inserting the same id is idempotent.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        let parent_ids = node.parent_ids.clone();
        self.nodes.insert(id, node);
        for parent_id in parent_ids {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.register_child(id);
            }
        }
        id
    }

    /// Attach a child under one or more existing parents.
    ///
    /// Overwrites any parents set on the child before; more than one parent
    /// forces [`ImprovementType::Synthetic`] regardless of what construction
    /// chose.
    pub fn add_edge(&mut self, mut child: Node, parents: &[NodeId]) -> Result<NodeId> {
        if parents.is_empty() {
            return Err(GraphError::NoParents { child: child.id }.into());
        }
        for parent_id in parents {
            if !self.nodes.contains_key(parent_id) {
                return Err(GraphError::NodeNotFound(*parent_id).into());
            }
        }

        child.parent_ids = parents.to_vec();
        if parents.len() > 1 {
            child.kind = ImprovementType::Synthetic;
        }
        Ok(self.add_node(child))
    }

    /// Generate plan, steps, and output for one node, in place
    pub async fn generate_node(
        &mut self,
        id: NodeId,
        generator: &Generator,
        config: &Config,
    ) -> Result<()> {
        let inputs = self
            .generation_inputs(id, config)
            .ok_or(GraphError::NodeNotFound(id))?;
        let generated = generate_content(generator, inputs).await?;
        self.apply_generated(id, generated);
        Ok(())
    }

    /// Generate every node that still needs content, bounded by
    /// `concurrency.max_tasks` in-flight requests, then recompute diffs and
    /// persist the whole graph.
    ///
    /// Failed generations never cancel their siblings: all tasks run to
    /// completion, successful results are applied, and the first failure is
    /// returned afterwards.
    pub async fn generate_pending(&mut self, generator: &Generator, config: &Config) -> Result<()> {
        let pending_ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.needs_generation())
            .map(|node| node.id)
            .collect();
        let pending: Vec<GenerationInputs> = pending_ids
            .into_iter()
            .filter_map(|id| self.generation_inputs(id, config))
            .collect();

        let mut first_failure = None;
        if !pending.is_empty() {
            let max_tasks = config.concurrency.max_tasks.max(1);
            let results: Vec<(NodeId, Result<GeneratedContent>)> = stream::iter(pending)
                .map(|inputs| async move {
                    let id = inputs.id;
                    (id, generate_content(generator, inputs).await)
                })
                .buffer_unordered(max_tasks)
                .collect()
                .await;

            for (id, result) in results {
                match result {
                    Ok(generated) => self.apply_generated(id, generated),
                    Err(err) => {
                        tracing::warn!(node = %id, error = %err, "generation failed");
                        first_failure.get_or_insert(err);
                    }
                }
            }
        }

        self.compute_all_diffs();
        self.persist_all()?;
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Recompute the diff of every node against its parent(s).
    ///
    /// Not incremental: the whole graph is recomputed on each call. A
    /// single-parent node whose parent is missing keeps its previous diff; a
    /// multi-parent node diffs against whatever parents resolve.
    pub fn compute_all_diffs(&mut self) {
        let mut updates = Vec::new();
        for node in self.nodes.values() {
            if node.parent_ids.is_empty() {
                continue;
            }
            if let [parent_id] = node.parent_ids[..] {
                match self.nodes.get(&parent_id) {
                    Some(parent) => {
                        updates.push((node.id, unified_diff(&parent.output, &node.output)));
                    }
                    None => {
                        tracing::warn!(node = %node.id, parent = %parent_id, "parent missing; diff left unchanged");
                    }
                }
            } else {
                let combined = self.combined_parent_output(node);
                updates.push((node.id, unified_diff(&combined, &node.output)));
            }
        }
        for (id, diff) in updates {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.diff = diff;
            }
        }
    }

    /// Save every node and the graph index
    pub fn persist_all(&self) -> Result<()> {
        for node in self.nodes.values() {
            node.save(&self.storage)?;
        }
        self.save_graph()
    }

    /// Write the graph index (`graph.json`)
    pub fn save_graph(&self) -> Result<()> {
        let mut index = GraphIndex::default();
        for (id, node) in &self.nodes {
            index.nodes.insert(*id, serde_json::to_value(node)?);
            for parent_id in &node.parent_ids {
                index.edges.push(GraphEdge {
                    source: *parent_id,
                    target: *id,
                });
            }
        }
        self.storage.save_graph(&index)?;
        Ok(())
    }

    /// Snapshot everything a node's generation needs, so the backend calls
    /// can run without borrowing the graph.
    fn generation_inputs(&self, id: NodeId, config: &Config) -> Option<GenerationInputs> {
        let node = self.nodes.get(&id)?;
        let model = if node.model.is_empty() {
            config.models.default.clone()
        } else {
            node.model.clone()
        };
        let system_prompt = if node.system_prompt.is_empty() {
            config.system_prompt_template.clone()
        } else {
            node.system_prompt.clone()
        };

        let mut parent_outputs = Vec::new();
        for parent_id in &node.parent_ids {
            match self.nodes.get(parent_id) {
                Some(parent) => parent_outputs.push(parent.output.clone()),
                None => {
                    tracing::warn!(node = %id, parent = %parent_id, "parent missing; omitted from prompt");
                }
            }
        }

        Some(GenerationInputs {
            id,
            model,
            system_prompt,
            user_prompt: node.user_prompt.clone(),
            parent_outputs,
        })
    }

    fn apply_generated(&mut self, id: NodeId, generated: GeneratedContent) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.plan = generated.plan;
            node.output = generated.output;
            node.model = generated.model;
        }
    }

    fn combined_parent_output(&self, node: &Node) -> String {
        node.parent_ids
            .iter()
            .filter_map(|parent_id| self.nodes.get(parent_id))
            .map(|parent| parent.output.as_str())
            .collect::<Vec<_>>()
            .join(PARENT_SEPARATOR)
    }
}

/// Inputs snapshotted from the graph for one node's generation
struct GenerationInputs {
    id: NodeId,
    model: String,
    system_prompt: String,
    user_prompt: String,
    parent_outputs: Vec<String>,
}

/// Generated content to write back onto a node
struct GeneratedContent {
    plan: Vec<Step>,
    output: String,
    model: String,
}

/// Plan, steps, and output for one node: strictly sequential, each result
/// feeding the next call.
async fn generate_content(
    generator: &Generator,
    inputs: GenerationInputs,
) -> Result<GeneratedContent> {
    let plan_text = generator
        .plan(&inputs.model, &inputs.user_prompt, &inputs.system_prompt)
        .await?;
    let steps = generator
        .steps(&inputs.model, &plan_text, &inputs.system_prompt)
        .await?;

    let prompt = compose_prompt(&inputs.user_prompt, &inputs.parent_outputs);
    let output = generator
        .output(&inputs.model, &prompt, &inputs.system_prompt)
        .await?;

    Ok(GeneratedContent {
        plan: steps,
        output,
        model: inputs.model,
    })
}

/// Build the final generation prompt: parent outputs joined under a
/// "Previous version(s)" header when any resolve, the user prompt verbatim
/// otherwise.
fn compose_prompt(user_prompt: &str, parent_outputs: &[String]) -> String {
    if parent_outputs.is_empty() {
        return user_prompt.to_string();
    }
    format!(
        "Previous version(s):\n\n{}\n\nTask: {}",
        parent_outputs.join(PARENT_SEPARATOR),
        user_prompt
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn empty_dag() -> Dag {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        Dag::open(storage).unwrap()
    }

    #[test]
    fn test_add_node_links_existing_parents() {
        let mut dag = empty_dag();
        let parent_id = dag.add_node(Node::new("root"));
        let child = Node::new("child").with_parents(vec![parent_id]);
        let child_id = dag.add_node(child);

        assert_eq!(dag.get(parent_id).unwrap().children, vec![child_id]);
        assert_eq!(dag.get(child_id).unwrap().parent_ids, vec![parent_id]);
    }

    #[test]
    fn test_add_edge_single_parent_keeps_standard() {
        let mut dag = empty_dag();
        let parent_id = dag.add_node(Node::new("root"));
        let child_id = dag.add_edge(Node::new("refine"), &[parent_id]).unwrap();

        let child = dag.get(child_id).unwrap();
        assert_eq!(child.kind, ImprovementType::Standard);
        assert_eq!(child.parent_ids, vec![parent_id]);
        assert!(dag.get(parent_id).unwrap().children.contains(&child_id));
    }

    #[test]
    fn test_add_edge_multi_parent_forces_synthetic() {
        let mut dag = empty_dag();
        let p1 = dag.add_node(Node::new("a"));
        let p2 = dag.add_node(Node::new("b"));
        let child_id = dag.add_edge(Node::new("combine"), &[p1, p2]).unwrap();

        let child = dag.get(child_id).unwrap();
        assert_eq!(child.kind, ImprovementType::Synthetic);
        assert_eq!(child.parent_ids, vec![p1, p2]);
        assert!(dag.get(p1).unwrap().children.contains(&child_id));
        assert!(dag.get(p2).unwrap().children.contains(&child_id));
    }

    #[test]
    fn test_add_edge_unknown_parent_is_an_error() {
        let mut dag = empty_dag();
        let err = dag.add_edge(Node::new("orphan"), &[NodeId::new()]).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::NodeNotFound(_))));

        let err = dag.add_edge(Node::new("no parents"), &[]).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::NoParents { .. })));
    }

    #[test]
    fn test_readd_is_idempotent() {
        let mut dag = empty_dag();
        let parent_id = dag.add_node(Node::new("root"));
        let child = Node::new("child").with_parents(vec![parent_id]);
        let child_id = child.id;

        dag.add_node(child.clone());
        dag.add_node(child);
        assert_eq!(dag.get(parent_id).unwrap().children, vec![child_id]);
        assert_eq!(dag.len(), 2);
    }

    #[test]
    fn test_compute_diffs_single_parent() {
        let mut dag = empty_dag();
        let mut parent = Node::new("root");
        parent.output = "Hello!".to_string();
        let parent_id = dag.add_node(parent);

        let mut child = Node::new("refine");
        child.output = "Hello there!".to_string();
        let child_id = dag.add_edge(child, &[parent_id]).unwrap();

        dag.compute_all_diffs();
        let diff = &dag.get(child_id).unwrap().diff;
        assert!(diff.contains("-Hello!"));
        assert!(diff.contains("+Hello there!"));
        assert_eq!(dag.get(parent_id).unwrap().diff, "");
    }

    #[test]
    fn test_compute_diffs_multi_parent_uses_separator() {
        let mut dag = empty_dag();
        let mut p1 = Node::new("a");
        p1.output = "A".to_string();
        let mut p2 = Node::new("b");
        p2.output = "B".to_string();
        let p1 = dag.add_node(p1);
        let p2 = dag.add_node(p2);

        let mut synth = Node::new("combine");
        synth.output = "AB".to_string();
        let synth_id = dag.add_edge(synth, &[p1, p2]).unwrap();

        dag.compute_all_diffs();
        let expected = unified_diff(&format!("A{}B", PARENT_SEPARATOR), "AB");
        assert_eq!(dag.get(synth_id).unwrap().diff, expected);
    }

    #[test]
    fn test_compute_diffs_skips_dangling_single_parent() {
        let mut dag = empty_dag();
        let mut child = Node::new("orphaned");
        child.output = "text".to_string();
        child.parent_ids = vec![NodeId::new()];
        child.diff = "previous".to_string();
        let child_id = dag.add_node(child);

        dag.compute_all_diffs();
        assert_eq!(dag.get(child_id).unwrap().diff, "previous");
    }

    #[test]
    fn test_compute_diffs_multi_parent_skips_dangling() {
        let mut dag = empty_dag();
        let mut p1 = Node::new("a");
        p1.output = "A".to_string();
        let p1 = dag.add_node(p1);

        let mut synth = Node::new("combine");
        synth.output = "AB".to_string();
        synth.parent_ids = vec![p1, NodeId::new()];
        synth.kind = ImprovementType::Synthetic;
        let synth_id = dag.add_node(synth);

        dag.compute_all_diffs();
        // only the resolvable parent contributes to the reference text
        assert_eq!(dag.get(synth_id).unwrap().diff, unified_diff("A", "AB"));
    }

    #[test]
    fn test_persist_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        let mut dag = Dag::open(storage).unwrap();

        let mut parent = Node::new("root");
        parent.output = "one".to_string();
        let parent_id = dag.add_node(parent);
        let mut child = Node::new("refine");
        child.output = "two".to_string();
        let child_id = dag.add_edge(child, &[parent_id]).unwrap();
        dag.compute_all_diffs();
        dag.persist_all().unwrap();

        let reloaded = Dag::open(Storage::new(dir.path()).unwrap()).unwrap();
        assert_eq!(reloaded.len(), 2);
        let parent = reloaded.get(parent_id).unwrap();
        let child = reloaded.get(child_id).unwrap();
        assert_eq!(parent.children, vec![child_id]);
        assert_eq!(child.parent_ids, vec![parent_id]);
        assert!(!child.diff.is_empty());
    }

    #[test]
    fn test_reload_skips_missing_content() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        let mut dag = Dag::open(storage).unwrap();

        let kept = dag.add_node(Node::new("kept"));
        let dropped = dag.add_node(Node::new("dropped"));
        dag.persist_all().unwrap();

        // simulate lost content for one indexed node
        std::fs::remove_dir_all(dag.storage().node_dir(dropped)).unwrap();

        let reloaded = Dag::open(Storage::new(dir.path()).unwrap()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get(kept).is_some());
        assert!(reloaded.get(dropped).is_none());
    }

    #[test]
    fn test_compose_prompt() {
        assert_eq!(compose_prompt("Say hi", &[]), "Say hi");

        let outputs = vec!["one".to_string(), "two".to_string()];
        assert_eq!(
            compose_prompt("Say hi", &outputs),
            "Previous version(s):\n\none\n\n---\n\ntwo\n\nTask: Say hi"
        );
    }
}
