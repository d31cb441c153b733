//! Facade over the graph store.
//!
//! An [`Engine`] owns the configuration, the provider-backed generator, and
//! the graph, and exposes the whole workflow: create a root, refine it,
//! synthesize several versions, evaluate, and compare plans. Model and
//! system-prompt defaults resolve from configuration here, so callers only
//! pass overrides.

use crate::config::{Config, PlanComparison};
use crate::dag::Dag;
use crate::error::{Error, GraphError, Result};
use crate::generate::Generator;
use crate::id::NodeId;
use crate::llm::LlmProvider;
use crate::node::Node;
use crate::storage::Storage;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Task used when a synthesis caller does not supply one
const DEFAULT_SYNTHESIS_PROMPT: &str = "Combine the best insights from all versions";

/// The orchestration facade over a graph of generated versions
pub struct Engine {
    config: Config,
    dag: Dag,
    generator: Generator,
}

impl Engine {
    /// Build an engine from configuration and a provider. Opens (or creates)
    /// the storage root named by `storage.path` and reloads any persisted
    /// graph.
    pub fn new(config: Config, provider: Arc<dyn LlmProvider>) -> Result<Self> {
        let storage = Storage::new(&config.storage.path)?;
        Self::with_storage(config, provider, storage)
    }

    /// Build an engine against an explicit storage root, ignoring
    /// `storage.path`
    pub fn with_storage(
        config: Config,
        provider: Arc<dyn LlmProvider>,
        storage: Storage,
    ) -> Result<Self> {
        let dag = Dag::open(storage)?;
        let generator = Generator::new(provider, config.models.clone());
        Ok(Self {
            config,
            dag,
            generator,
        })
    }

    /// The graph owned by this engine
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// The configuration this engine was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.dag.get(id)
    }

    /// Create and generate a root node for a task
    pub async fn create_root(
        &mut self,
        user_prompt: &str,
        model: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<NodeId> {
        let node = self.build_node(user_prompt, model, system_prompt);
        let id = self.dag.add_node(node);
        tracing::info!(node = %id, "root node created");

        self.dag.generate_node(id, &self.generator, &self.config).await?;
        self.persist(id)?;
        Ok(id)
    }

    /// Create and generate a refinement of one existing node
    pub async fn refine(
        &mut self,
        parent: NodeId,
        user_prompt: &str,
        model: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<NodeId> {
        let node = self.build_node(user_prompt, model, system_prompt);
        let id = self.dag.add_edge(node, &[parent])?;
        tracing::info!(node = %id, parent = %parent, "refinement created");

        self.dag.generate_node(id, &self.generator, &self.config).await?;
        self.dag.compute_all_diffs();
        self.persist(id)?;
        Ok(id)
    }

    /// Create and generate a synthesis of several existing nodes
    pub async fn synthesize(
        &mut self,
        parents: &[NodeId],
        user_prompt: Option<&str>,
        model: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<NodeId> {
        let user_prompt = user_prompt.unwrap_or(DEFAULT_SYNTHESIS_PROMPT);
        let node = self.build_node(user_prompt, model, system_prompt);
        let id = self.dag.add_edge(node, parents)?;
        tracing::info!(node = %id, parents = parents.len(), "synthesis created");

        self.dag.generate_node(id, &self.generator, &self.config).await?;
        self.dag.compute_all_diffs();
        self.persist(id)?;
        Ok(id)
    }

    /// Generate every node still missing content, then recompute diffs and
    /// persist the graph
    pub async fn generate_pending(&mut self) -> Result<()> {
        self.dag.generate_pending(&self.generator, &self.config).await
    }

    /// Score one node's output on a 0..1 scale. An unparseable reply leaves
    /// the score unset rather than failing.
    pub async fn evaluate_node(&mut self, id: NodeId, eval_model: Option<&str>) -> Result<()> {
        let output = self
            .dag
            .get(id)
            .ok_or(GraphError::NodeNotFound(id))?
            .output
            .clone();
        let model = eval_model.unwrap_or_else(|| self.generator.default_model()).to_string();

        let score = self.generator.score(&model, &output).await?;
        if let Some(node) = self.dag.get_mut(id) {
            node.score = score;
        }
        if let Some(node) = self.dag.get(id) {
            node.save(self.dag.storage())?;
        }
        Ok(())
    }

    /// Score many nodes with bounded concurrency.
    ///
    /// At most `concurrency.max_tasks` requests are in flight at once, with
    /// no ordering guarantee between completions. A failed evaluation never
    /// cancels its siblings; every successful score is applied and saved,
    /// and the first failure is returned afterwards.
    pub async fn evaluate_all(&mut self, ids: &[NodeId], eval_model: Option<&str>) -> Result<()> {
        let model = eval_model.unwrap_or_else(|| self.generator.default_model()).to_string();
        let jobs: Vec<(NodeId, String)> = ids
            .iter()
            .filter_map(|id| {
                let node = self.dag.get(*id);
                if node.is_none() {
                    tracing::warn!(node = %id, "not in graph; skipping evaluation");
                }
                node.map(|n| (*id, n.output.clone()))
            })
            .collect();

        let max_tasks = self.config.concurrency.max_tasks.max(1);
        let generator = &self.generator;
        let model = &model;
        let results: Vec<(NodeId, _)> = stream::iter(jobs)
            .map(|(id, output)| async move { (id, generator.score(model, &output).await) })
            .buffer_unordered(max_tasks)
            .collect()
            .await;

        let mut first_failure: Option<Error> = None;
        for (id, result) in results {
            match result {
                Ok(score) => {
                    if let Some(node) = self.dag.get_mut(id) {
                        node.score = score;
                    }
                    if let Some(node) = self.dag.get(id) {
                        node.save(self.dag.storage())?;
                    }
                }
                Err(err) => {
                    tracing::warn!(node = %id, error = %err, "evaluation failed");
                    first_failure.get_or_insert(err.into());
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Compare two nodes' plans using the configured mode: a deterministic
    /// text diff in simple mode, a backend analysis in semantic mode
    pub async fn compare_plans(&self, a: NodeId, b: NodeId) -> Result<String> {
        let node_a = self.dag.get(a).ok_or(GraphError::NodeNotFound(a))?;
        let node_b = self.dag.get(b).ok_or(GraphError::NodeNotFound(b))?;

        match self.config.diff.plan_comparison {
            PlanComparison::Simple => Ok(node_a.diff_plan(node_b)),
            PlanComparison::Semantic => {
                let analysis = self
                    .generator
                    .compare_plans(self.generator.default_model(), &node_a.plan, &node_b.plan)
                    .await?;
                Ok(analysis)
            }
        }
    }

    fn build_node(
        &self,
        user_prompt: &str,
        model: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Node {
        let model = model
            .map(str::to_string)
            .unwrap_or_else(|| self.config.models.default.clone());
        let system_prompt = system_prompt
            .map(str::to_string)
            .unwrap_or_else(|| self.config.system_prompt_template.clone());
        Node::new(user_prompt)
            .with_model(model)
            .with_system_prompt(system_prompt)
    }

    /// Save one node's content plus the graph index. The node's parents are
    /// saved too: attaching the edge changed their child lists, and meta.json
    /// is what reload trusts.
    fn persist(&self, id: NodeId) -> Result<()> {
        if let Some(node) = self.dag.get(id) {
            node.save(self.dag.storage())?;
            for parent_id in &node.parent_ids {
                if let Some(parent) = self.dag.get(*parent_id) {
                    parent.save(self.dag.storage())?;
                }
            }
        }
        self.dag.save_graph()
    }
}
