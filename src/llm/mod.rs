//! LLM collaborator.
//!
//! The agent only needs one capability: given a system directive and the
//! conversation so far, return the model's next piece of text. The concrete
//! client is created once at startup and shared behind `Arc<dyn LlmClient>`.

mod openrouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openrouter::OpenRouterClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling options for one completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    /// Sequences at which the model must stop generating
    pub stop: Vec<String>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: Option<String>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to LLM endpoint failed: {0}")]
    Transport(String),

    #[error("LLM endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode LLM response: {0}")]
    Decode(String),

    #[error("LLM returned an empty response")]
    Empty,

    #[error("LLM call timed out after {0} seconds")]
    Timeout(u64),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatResponse, LlmError>;
}
