use crate::error::JotaError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A role-tagged message as the provider sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            name: None,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            name: None,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            name: None,
            content: content.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Events emitted during streaming LLM responses.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    Done,
    Error(String),
}

/// The LLM client trait. Implementations provide batched and streaming chat.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Model id this client sends requests for.
    fn model(&self) -> &str;

    /// Request `n` completions in a single provider call.
    async fn generate_multiple(
        &self,
        messages: &[Message],
        stop: &[&str],
        n: usize,
        max_tokens: Option<u32>,
    ) -> Result<Vec<String>, JotaError>;

    /// Stream a single completion as text fragments.
    async fn generate_stream(
        &self,
        messages: &[Message],
        stop: &[&str],
        max_tokens: Option<u32>,
    ) -> Result<futures::channel::mpsc::UnboundedReceiver<StreamEvent>, JotaError>;

    async fn generate(
        &self,
        messages: &[Message],
        stop: &[&str],
        max_tokens: Option<u32>,
    ) -> Result<String, JotaError> {
        self.generate_multiple(messages, stop, 1, max_tokens)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| JotaError::Llm("No response from API".into()))
    }
}
