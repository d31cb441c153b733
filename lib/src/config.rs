//! Configuration for models, concurrency, storage, and diffing.
//!
//! Configuration is an explicit, immutable value constructed once and passed
//! into [`crate::engine::Engine`] and [`crate::dag::Dag`]. A TOML file may
//! override any subset of the built-in defaults; unknown models fall back to
//! empty sampling options.

use crate::error::ConfigError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Built-in model registry, used when the config file does not override an entry.
static DEFAULT_REGISTRY: Lazy<HashMap<String, ModelConfig>> = Lazy::new(|| {
    let mut registry = HashMap::new();
    registry.insert(
        "gpt-4o".to_string(),
        ModelConfig {
            provider: "openai".to_string(),
            base_url: None,
            options: ModelOptions {
                temperature: Some(0.2),
                top_p: Some(0.9),
                top_k: None,
                max_tokens: Some(2048),
            },
        },
    );
    registry.insert(
        "gpt-4".to_string(),
        ModelConfig {
            provider: "openai".to_string(),
            base_url: None,
            options: ModelOptions {
                temperature: Some(0.2),
                top_p: Some(0.9),
                top_k: None,
                max_tokens: Some(2048),
            },
        },
    );
    registry.insert(
        "claude-3-5-sonnet-20240620".to_string(),
        ModelConfig {
            provider: "anthropic".to_string(),
            base_url: Some("https://api.anthropic.com/v1".to_string()),
            options: ModelOptions {
                temperature: Some(0.3),
                top_p: Some(0.95),
                top_k: None,
                max_tokens: Some(2048),
            },
        },
    );
    registry.insert(
        "gemini-1.5-pro".to_string(),
        ModelConfig {
            provider: "google".to_string(),
            base_url: Some(
                "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            ),
            options: ModelOptions {
                temperature: Some(0.4),
                top_p: Some(0.9),
                top_k: None,
                max_tokens: Some(2048),
            },
        },
    );
    registry
});

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model selection and registry
    pub models: ModelsConfig,
    /// Concurrency limits
    pub concurrency: ConcurrencyConfig,
    /// Storage location
    pub storage: StorageConfig,
    /// Diff rendering and plan comparison
    pub diff: DiffConfig,
    /// System prompt applied when a node carries none
    pub system_prompt_template: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models: ModelsConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            storage: StorageConfig::default(),
            diff: DiffConfig::default(),
            system_prompt_template: "You are an expert editor.".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, layered over the defaults.
    ///
    /// Registry entries present in the defaults but absent from the file are
    /// kept, so a file only overriding `models.default` still resolves the
    /// built-in models.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        for (name, model) in DEFAULT_REGISTRY.iter() {
            config
                .models
                .registry
                .entry(name.clone())
                .or_insert_with(|| model.clone());
        }
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Look up a model in the registry
    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.registry.get(name)
    }

    /// Resolve sampling options for a model, empty when the model is unknown
    pub fn options_for(&self, name: &str) -> ModelOptions {
        self.models.options_for(name)
    }
}

/// Model selection and registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model used when a node does not name one
    pub default: String,
    /// Per-model provider and sampling options
    pub registry: HashMap<String, ModelConfig>,
}

impl ModelsConfig {
    /// Resolve sampling options for a model, empty when the model is unknown
    pub fn options_for(&self, name: &str) -> ModelOptions {
        self.registry
            .get(name)
            .map(|m| m.options.clone())
            .unwrap_or_default()
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: "gpt-4o".to_string(),
            registry: DEFAULT_REGISTRY.clone(),
        }
    }
}

/// A registry entry for a single model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name (e.g. "openai", "anthropic")
    pub provider: String,
    /// Endpoint override for the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Sampling options passed through to the provider
    #[serde(default)]
    pub options: ModelOptions,
}

/// Sampling options for a model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff
    pub top_k: Option<u32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,
}

/// Concurrency limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum in-flight generation requests during a batch sweep
    pub max_tasks: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_tasks: 8 }
    }
}

/// Storage location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the graph; a leading `~` expands to `$HOME`
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.config/lineage"),
        }
    }
}

/// Diff rendering and plan comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Apply ANSI colors when rendering diffs in the CLI
    pub colorize: bool,
    /// How plans are compared
    pub plan_comparison: PlanComparison,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            colorize: true,
            plan_comparison: PlanComparison::Simple,
        }
    }
}

/// Plan comparison mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanComparison {
    /// Text diff of the rendered step lists
    Simple,
    /// Free-text analysis from the generation backend
    Semantic,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.models.default, "gpt-4o");
        assert_eq!(config.concurrency.max_tasks, 8);
        assert!(config.diff.colorize);
        assert_eq!(config.diff.plan_comparison, PlanComparison::Simple);
        assert!(config.models.registry.contains_key("gpt-4o"));
    }

    #[test]
    fn test_options_for_unknown_model() {
        let config = Config::default();
        let options = config.options_for("no-such-model");
        assert!(options.temperature.is_none());
        assert!(options.max_tokens.is_none());
    }

    #[test]
    fn test_load_overrides_keep_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[models]\ndefault = \"gpt-4\"\n\n[concurrency]\nmax_tasks = 2\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.models.default, "gpt-4");
        assert_eq!(config.concurrency.max_tasks, 2);
        // built-in registry entries survive a partial override
        assert!(config.models.registry.contains_key("gpt-4o"));
        assert_eq!(config.system_prompt_template, "You are an expert editor.");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.models.default, "gpt-4o");
    }
}
