mod traits;
mod openai;
pub mod usage;

pub use traits::*;
pub use openai::OpenAIClient;
pub use usage::{Pricing, TokenCounter, Usage, UsageLedger};
