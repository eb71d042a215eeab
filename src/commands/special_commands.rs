//! Built-in command parser for the interactive loop
//!
//! Built-in commands are matched by their exact leading token, which is
//! case-insensitive. Anything else is left to the dispatcher, which tries
//! the plugin registry before falling back to free-form chat.

use thiserror::Error;

/// Tokens that end the session
pub const EXIT_COMMANDS: [&str; 3] = ["/quit", "/exit", "/bye"];

/// Built-in command tokens
pub const BUILTIN_COMMANDS: [&str; 11] = [
    "/help", "/list", "/new", "/open", "/rename", "/delete", "/ingest", "/zip", "/load",
    "/search", "/restart",
];

/// Whether `token` is reserved by the loop itself
pub fn is_builtin_command(token: &str) -> bool {
    let token = token.to_lowercase();
    EXIT_COMMANDS.contains(&token.as_str()) || BUILTIN_COMMANDS.contains(&token.as_str())
}

/// Errors that can occur when parsing built-in commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Command requires an argument but none was provided
    #[error("Usage: {usage}")]
    MissingArgument { command: String, usage: String },

    /// Command was given an argument it cannot use
    #[error("Invalid argument for {command}: {arg}\n\nUsage: {usage}")]
    InvalidArgument {
        command: String,
        arg: String,
        usage: String,
    },
}

/// Built-in commands of the interactive loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// End the session (`/quit`, `/exit`, `/bye`)
    Exit,
    /// Show commands and plugins
    Help,
    /// List conversations
    List,
    /// Start a new conversation
    New,
    /// Open a conversation by listing number
    Open(usize),
    /// Rename a conversation by listing number
    Rename { index: usize, name: String },
    /// Delete a conversation by listing number
    Delete(usize),
    /// Add a file or directory to the active index
    Ingest(String),
    /// Archive the active conversation
    Zip,
    /// Restore a conversation archive
    Load(String),
    /// Search the web
    Search(String),
    /// Reload configuration and plugins
    Restart,
    /// Not a built-in command
    None,
}

/// Split a line into its leading token and the trimmed remainder
pub fn split_leading_token(input: &str) -> (&str, &str) {
    let trimmed = input.trim();
    match trimmed.find(char::is_whitespace) {
        Some(end) => (&trimmed[..end], trimmed[end..].trim()),
        None => (trimmed, ""),
    }
}

fn parse_index(command: &str, arg: &str, usage: &str) -> Result<usize, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        });
    }
    arg.parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| CommandError::InvalidArgument {
            command: command.to_string(),
            arg: arg.to_string(),
            usage: usage.to_string(),
        })
}

fn require(command: &str, rest: &str, usage: &str) -> Result<String, CommandError> {
    if rest.is_empty() {
        return Err(CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        });
    }
    Ok(rest.to_string())
}

/// Parse a user input line into a built-in command
///
/// # Errors
///
/// Returns [`CommandError`] when a built-in command is missing an argument
/// or given one it cannot use.
///
/// # Examples
///
/// ```
/// use aeon::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/open 2").unwrap(), SpecialCommand::Open(2));
/// assert_eq!(parse_special_command("/BYE").unwrap(), SpecialCommand::Exit);
/// assert_eq!(parse_special_command("/image a fox").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/open").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let (token, rest) = split_leading_token(input);
    let token = token.to_lowercase();

    if EXIT_COMMANDS.contains(&token.as_str()) {
        return Ok(SpecialCommand::Exit);
    }

    match token.as_str() {
        "/help" => Ok(SpecialCommand::Help),
        "/list" => Ok(SpecialCommand::List),
        "/new" => Ok(SpecialCommand::New),
        "/zip" => Ok(SpecialCommand::Zip),
        "/restart" => Ok(SpecialCommand::Restart),
        "/open" => parse_index("/open", rest, "/open <NUMBER>").map(SpecialCommand::Open),
        "/delete" => parse_index("/delete", rest, "/delete <NUMBER>").map(SpecialCommand::Delete),
        "/rename" => {
            let usage = "/rename <NUMBER> <NEW_NAME>";
            let (number, name) = split_leading_token(rest);
            if name.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "/rename".to_string(),
                    usage: usage.to_string(),
                });
            }
            let index = parse_index("/rename", number, usage)?;
            Ok(SpecialCommand::Rename {
                index,
                name: name.to_string(),
            })
        }
        "/ingest" => require("/ingest", rest, "/ingest <PATH>").map(SpecialCommand::Ingest),
        "/load" => require("/load", rest, "/load <PATH_TO_ZIP>").map(SpecialCommand::Load),
        "/search" => require("/search", rest, "/search <TERMS>").map(SpecialCommand::Search),
        _ => Ok(SpecialCommand::None),
    }
}

/// Help lines for the built-in commands
pub fn builtin_help() -> Vec<&'static str> {
    vec![
        "'/help' Show this screen.",
        "'/new' Create a new chat.",
        "'/list' List all chats.",
        "'/open <NUMBER>' Open chat.",
        "'/load <PATH>/<FILE>.zip' Load ZIP backup.",
        "'/rename <NUMBER> <NEW_NAME>' Rename chat by number.",
        "'/delete <NUMBER>' Delete selected chat.",
        "'/zip' Backup contents to a timestamped zip file.",
        "'/ingest <PATH> | <PATH><.json, .txt, .md>' Add documents to RAG.",
        "'/search <TERMS>' Make a web search.",
        "'/restart' Reload configuration and plugins.",
        "'/quit', '/exit' or '/bye' to end the chat.",
    ]
}
