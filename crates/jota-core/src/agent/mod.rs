mod classifier;
mod core;
mod router;

pub use classifier::{Category, ClassificationAgent};
pub use core::{AgentEvent, AgentReply, ConversationalAgent};
pub use router::{HintRouter, Hinter};
