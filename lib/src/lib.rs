//! # Lineage
//!
//! A Rust library for iteratively refining and synthesizing LLM-generated
//! text over a versioned directed acyclic graph.
//!
//! ## Core Concepts
//!
//! - **Node**: a versioned unit of generated content, its plan, and its links
//! - **Standard refinement**: a node improving exactly one parent
//! - **Synthesis**: a node combining more than one parent
//! - **Dag**: the graph store owning nodes, topology, diffs, and persistence
//! - **Engine**: the facade exposing create/refine/synthesize/evaluate
//!
//! ## Example
//!
//! ```rust,ignore
//! use lineage::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> lineage::Result<()> {
//!     let config = Config::default();
//!     let provider = Arc::new(OpenAiProvider::from_env()?);
//!     let mut engine = Engine::new(config, provider)?;
//!
//!     let root = engine.create_root("Write a haiku about rivers", None, None).await?;
//!     let refined = engine.refine(root, "Make it more vivid", None, None).await?;
//!     println!("{}", engine.node(refined).unwrap().diff);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod id;
pub mod error;
pub mod config;
pub mod plan;
pub mod diff;
pub mod llm;
pub mod generate;
pub mod node;
pub mod storage;
pub mod dag;
pub mod engine;

pub use error::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dag::Dag;
    pub use crate::diff::unified_diff;
    pub use crate::engine::Engine;
    pub use crate::error::{Error, Result};
    pub use crate::id::NodeId;
    pub use crate::llm::openai::OpenAiProvider;
    pub use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};
    pub use crate::node::{ImprovementType, Node};
    pub use crate::plan::Step;
    pub use crate::storage::Storage;
}
