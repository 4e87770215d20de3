mod history;
pub mod system_prompt;

pub use history::{ChatMessage, HintMessage, History, HistoryEntry, HistoryView, MessageId, PendingReply};
pub use system_prompt::{ChatMode, SystemPromptBuilder};
