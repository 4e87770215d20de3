pub mod agent;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod llm;
pub mod sql;

// Re-export key types
pub use agent::{
    AgentEvent, AgentReply, Category, ClassificationAgent, ConversationalAgent, HintRouter, Hinter,
};
pub use config::Settings;
pub use context::{ChatMessage, HintMessage, History, HistoryEntry, HistoryView, SystemPromptBuilder};
pub use error::{JotaError, Result};
pub use llm::{LlmClient, Message, OpenAIClient, Role, StreamEvent, UsageLedger};
pub use sql::{EnhancementStep, SqlExecutor, SqlHinter, SqlResult, SqliteExecutor};
