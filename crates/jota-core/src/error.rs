use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JotaError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("History error: {0}")]
    History(String),

    #[error("{0}")]
    Other(String),
}

/// Error body returned by an OpenAI-compatible provider.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProviderError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(ref code) => write!(f, "{} {}: {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl JotaError {
    pub fn history(message: impl Into<String>) -> Self {
        Self::History(message.into())
    }

    /// Provider code, when the failure came from the provider's error body.
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            Self::Provider(err) => err.code.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, JotaError>;
