//! Demonstration workflow: create a root, refine it two ways, compare the
//! plans, synthesize both refinements, and evaluate everything.
//!
//! Run with: cargo run --bin lineage -- --user-prompt "Write a haiku"
//! (Make sure OPENAI_API_KEY is set, directly or via a .env file.)

use anyhow::Context;
use clap::{Parser, ValueEnum};
use lineage::config::{Config, PlanComparison};
use lineage::diff::colorize;
use lineage::engine::Engine;
use lineage::id::NodeId;
use lineage::llm::openai::OpenAiProvider;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lineage",
    about = "Iterative refinement and synthesis of LLM outputs",
    after_help = "The demo creates a root from your prompt, refines it twice, \
                  compares the plans, synthesizes both refinements, and scores \
                  every node."
)]
struct Cli {
    /// The initial prompt for content generation
    #[arg(long)]
    user_prompt: String,

    /// System prompt for the model (configured template when omitted)
    #[arg(long)]
    system_prompt: Option<String>,

    /// Configuration file (defaults to ~/.config/lineage/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage root for the graph (overrides the configured path)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Log filter, e.g. "info" or "lineage=debug"
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Colorize diff output (overrides the configured setting)
    #[arg(long, value_name = "BOOL")]
    colorize: Option<bool>,

    /// Plan comparison mode (overrides the configured mode)
    #[arg(long, value_enum)]
    plan_comparison: Option<ComparisonMode>,

    /// Model to use for every node in the demo
    #[arg(long)]
    model: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ComparisonMode {
    /// Text diff of the rendered step lists
    Simple,
    /// Free-text analysis from the generation backend
    Semantic,
}

impl From<ComparisonMode> for PlanComparison {
    fn from(mode: ComparisonMode) -> Self {
        match mode {
            ComparisonMode::Simple => PlanComparison::Simple,
            ComparisonMode::Semantic => PlanComparison::Semantic,
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config/lineage/config.toml"))
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match cli.config.clone().or_else(default_config_path) {
        Some(path) => Config::load_or_default(path)?,
        None => Config::default(),
    };
    if let Some(path) = &cli.path {
        config.storage.path = path.clone();
    }
    if let Some(colorize) = cli.colorize {
        config.diff.colorize = colorize;
    }
    if let Some(mode) = cli.plan_comparison {
        config.diff.plan_comparison = mode.into();
    }
    Ok(config)
}

fn print_node(engine: &Engine, label: &str, id: NodeId) {
    let Some(node) = engine.node(id) else {
        return;
    };
    println!("{} ({}):", label, node.id);
    println!("  Plan steps: {}", node.plan.len());
    println!("  Output: {}", node.output);
    match node.score {
        Some(score) => println!("  Score: {:.2}\n", score),
        None => println!("  Score: unset\n"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config(&cli)?;

    let mut provider =
        OpenAiProvider::from_env().context("OPENAI_API_KEY must be set (directly or in .env)")?;
    if let Some(base_url) = config
        .model(&config.models.default)
        .and_then(|m| m.base_url.clone())
    {
        provider = provider.with_base_url(base_url);
    }

    let mut engine = Engine::new(config, Arc::new(provider))?;
    info!("engine initialized");

    info!("creating root node from user prompt");
    let root = engine
        .create_root(&cli.user_prompt, cli.model.as_deref(), cli.system_prompt.as_deref())
        .await?;
    info!(node = %root, "root node created");

    info!("creating refinement of root node");
    let refined = engine
        .refine(
            root,
            "Make this more concise and impactful.",
            cli.model.as_deref(),
            None,
        )
        .await?;

    info!("creating alternative refinement");
    let alt_refined = engine
        .refine(
            root,
            "Make this more detailed and technical.",
            cli.model.as_deref(),
            None,
        )
        .await?;

    info!("comparing plans between the two refinements");
    let plan_diff = engine.compare_plans(refined, alt_refined).await?;

    info!("synthesizing both refinements");
    let synthesized = engine
        .synthesize(
            &[refined, alt_refined],
            Some("Combine the clarity of the first with the depth of the second."),
            cli.model.as_deref(),
            None,
        )
        .await?;

    info!("evaluating all nodes");
    engine
        .evaluate_all(&[root, refined, alt_refined, synthesized], None)
        .await?;

    println!("\n{}", "=".repeat(80));
    println!("LINEAGE WORKFLOW SUMMARY");
    println!("{}", "=".repeat(80));
    println!("\nOriginal prompt: {}\n", cli.user_prompt);

    print_node(&engine, "Root node", root);
    print_node(&engine, "Refined node", refined);
    print_node(&engine, "Alternative refined node", alt_refined);

    println!("Plan comparison:");
    if engine.config().diff.colorize {
        println!("{}\n", colorize(&plan_diff));
    } else {
        println!("{}\n", plan_diff);
    }

    print_node(&engine, "Synthesized node", synthesized);

    println!("{}", "=".repeat(80));
    println!("Graph stored at: {}", engine.dag().storage().root().display());
    println!("{}", "=".repeat(80));
    Ok(())
}
