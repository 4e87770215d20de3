mod executor;
mod hinter;
pub mod parse;
pub mod prompt;

pub use executor::{SqlExecutor, SqlOutcome, SqlResult, SqliteExecutor};
pub use hinter::{render_result, select_result, EnhancementStep, SqlHinter};
