//! Slash command parsing for the chat application.
//!
//! This module recognizes the few commands that control the session instead of being sent to
//! the model.  Anything that is not exactly one of these commands is a message, including
//! unrecognized text that happens to start with `/`.

/// A parsed chat command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    /// Clear the saved conversation back to the system turn.
    Reset,

    /// Display help information.
    Help,

    /// Display session statistics.
    Stats,

    /// Exit the chat application.
    Quit,
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the trimmed input is a command (case-insensitively), or
/// `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use ollama_chat::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
/// assert_eq!(parse_command("/RESET"), Some(ChatCommand::Reset));
/// assert!(parse_command("/usr/bin is on my PATH").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let command = input.trim().to_lowercase();
    match command.as_str() {
        "/reset" => Some(ChatCommand::Reset),
        "/help" | "/?" => Some(ChatCommand::Help),
        "/stats" => Some(ChatCommand::Stats),
        "/exit" | "/quit" | "/q" => Some(ChatCommand::Quit),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /reset                 Clear the saved conversation
  /stats                 Show session statistics
  /help                  Show this help message
  /exit                  Exit the chat"#
}
