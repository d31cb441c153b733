//! Error types for the library.
//!
//! Uses thiserror for ergonomic error definition.

use crate::id::NodeId;
use std::path::PathBuf;

/// Main error type for the library
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Graph-related error
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Storage-related error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// LLM provider errors
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// API error from provider
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the provider
        status: u16,
        /// Error body returned by the provider
        message: String,
    },

    /// Network/connection error
    #[error("Network error: {0}")]
    Network(String),

    /// Response parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The response carried no usable text content
    #[error("Empty completion from model {model}")]
    EmptyCompletion {
        /// Model that produced the empty response
        model: String,
    },
}

/// Graph-specific errors
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A referenced node is not present in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// An edge operation received no parents
    #[error("Edge for {child} has no parents")]
    NoParents {
        /// Child the edge was being attached to
        child: NodeId,
    },
}

/// Storage-specific errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to read a file under the storage root
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that could not be read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Failed to write a file under the storage root
    #[error("Failed to write {path}: {source}")]
    Write {
        /// File that could not be written
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A file under the storage root did not parse
    #[error("Malformed data in {path}: {source}")]
    Malformed {
        /// File that did not parse
        path: PathBuf,
        /// Underlying deserialization error
        source: serde_json::Error,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// Configuration file that could not be read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The configuration file did not parse as TOML
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// Configuration file that did not parse
        path: PathBuf,
        /// Underlying TOML error
        source: toml::de::Error,
    },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for LLM operations
pub type LlmResult<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Graph(GraphError::NodeNotFound(NodeId::nil()));
        assert!(err.to_string().contains("Node not found"));
    }

    #[test]
    fn test_error_conversion() {
        let llm_err = LlmError::Network("connection refused".to_string());
        let err: Error = llm_err.into();
        assert!(matches!(err, Error::Llm(_)));
    }
}
