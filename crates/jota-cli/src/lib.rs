// Library interface for jota-cli, so integration tests can reach the
// command parser. main.rs declares the same file, hence the path attribute.

#[path = "commands.rs"]
pub mod commands;

pub use commands::{handle_command, CommandResult};
