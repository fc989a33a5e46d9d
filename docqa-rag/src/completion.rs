//! Completion service trait for chat-style text generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The author of a chat [`Message`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation.
    System,
    /// The requesting party.
    User,
    /// The model.
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Who wrote the message.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl Message {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Sampling parameters for a completion call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CompletionOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
}

impl CompletionOptions {
    /// Create options with the given temperature and token limit.
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self { temperature, max_tokens }
    }
}

/// A service that generates text from a list of chat messages.
///
/// Output is untrusted free text. Callers that need structure parse it
/// themselves and decide how to degrade when it is malformed.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Generate a reply to `messages`.
    async fn complete(&self, messages: &[Message], options: CompletionOptions) -> Result<String>;
}

/// The system prompt shared by the pipeline's auxiliary completion calls.
pub(crate) const ASSISTANT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
