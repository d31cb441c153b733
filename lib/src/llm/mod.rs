//! Generation backend clients.
//!
//! This module is a leaf: nothing in it knows about nodes or the graph. The
//! [`LlmProvider`] trait is the seam the rest of the crate generates text
//! through, and [`openai`] implements it over an OpenAI-compatible HTTP API.

pub mod openai;

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seam between the graph engine and a generation backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion request to completion and return the response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Short provider name, used in logs
    fn name(&self) -> &str;

    /// Whether the provider has the credentials it needs
    fn is_ready(&self) -> bool;
}

/// Role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions
    System,
    /// Message from the user
    User,
    /// Message from the model
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the sender
    pub role: Role,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One completion call: a model, its messages, and sampling options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier, resolved against the registry by the caller
    pub model: String,
    /// Conversation so far, system prompt included
    pub messages: Vec<ChatMessage>,
    /// Cap on generated tokens; provider default when unset
    pub max_tokens: Option<usize>,
    /// Sampling temperature, clamped to 0.0..=1.0
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff; ignored by providers without it
    pub top_k: Option<u32>,
}

impl CompletionRequest {
    /// Request against a model with no messages or sampling options yet
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
        }
    }

    /// Append a message to the conversation
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Cap the number of generated tokens
    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the sampling temperature, clamped to 0.0..=1.0
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp.clamp(0.0, 1.0));
        self
    }

    /// Set the nucleus sampling threshold
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// What came back from a completion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Provider-assigned response id
    pub id: String,
    /// Model that actually served the request
    pub model: String,
    /// Generated text
    pub content: String,
    /// Tokens consumed and produced
    pub usage: TokenUsage,
}

/// Token counts for one completion
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub input_tokens: usize,
    /// Tokens generated
    pub output_tokens: usize,
}

impl TokenUsage {
    /// Prompt plus generated tokens
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}
