/// Result of processing a chat-loop command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Display a message to the user.
    Message(String),
    /// Quit the chat loop.
    Quit,
    /// Print the conversation transcript.
    ShowHistory,
    /// Print token usage and estimated cost.
    ShowUsage,
    /// Not a command - send to the assistant.
    NotACommand,
}

pub fn handle_command(input: &str) -> CommandResult {
    let input = input.trim();
    let cmd = input.split_whitespace().next().unwrap_or("");

    match cmd {
        "quit" | "/quit" | "/exit" | "/q" if input == cmd => CommandResult::Quit,
        "hist" | "/hist" | "/history" if input == cmd => CommandResult::ShowHistory,
        "/usage" | "/cost" => CommandResult::ShowUsage,
        "/help" | "/h" => show_help(),
        "/version" => CommandResult::Message(format!("Jota CLI v{}", env!("CARGO_PKG_VERSION"))),
        _ => {
            if input.starts_with('/') {
                CommandResult::Message(format!("Unknown command: {cmd}. Type /help for commands."))
            } else {
                CommandResult::NotACommand
            }
        }
    }
}

fn show_help() -> CommandResult {
    let help_text = "\
Jota CLI commands

  hist, /history        Show the conversation transcript
  /usage, /cost         Show token usage and estimated cost
  /version              Show version information
  /help, /h             Show this help message
  quit, /quit, /q       Quit

Anything else is sent to the assistant.";

    CommandResult::Message(help_text.into())
}
