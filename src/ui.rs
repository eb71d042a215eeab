//! Tagged terminal output
//!
//! User-facing lines are prefixed with a short colored tag such as `[INFO]`
//! or `[AEON]`. Diagnostics go through `tracing` instead.

use colored::Colorize;

/// Kind of a terminal message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Startup and session binding
    Boot,
    /// General information
    Info,
    /// Command help lines
    Command,
    /// Hints
    Note,
    /// Failures
    Error,
    /// Assistant answers
    Aeon,
    /// Completed operations
    Success,
    /// Non-fatal problems
    Warning,
    /// Plugin listing
    Plugin,
    /// Replayed history
    Chat,
    /// Provenance of an answer
    Source,
    /// Waiting for the model
    Think,
}

impl Tag {
    /// Plain label without color
    pub fn label(&self) -> &'static str {
        match self {
            Self::Boot => "[BOOT]",
            Self::Info => "[INFO]",
            Self::Command => "[CMMD]",
            Self::Note => "[NOTE]",
            Self::Error => "[ERRR]",
            Self::Aeon => "[AEON]:",
            Self::Success => "[SUCS]:",
            Self::Warning => "[WARN]",
            Self::Plugin => "[PLUG]",
            Self::Chat => "[CHAT]",
            Self::Source => "[SOURCE]:",
            Self::Think => "[...]:",
        }
    }

    /// Label rendered with its terminal color
    pub fn colored_tag(&self) -> String {
        let label = self.label();
        match self {
            Self::Boot => label.bright_yellow().bold().to_string(),
            Self::Info => label.blue().bold().to_string(),
            Self::Command | Self::Success | Self::Source => label.green().bold().to_string(),
            Self::Note | Self::Warning | Self::Plugin | Self::Chat => {
                label.yellow().bold().to_string()
            }
            Self::Error => label.bright_red().bold().to_string(),
            Self::Aeon | Self::Think => label.red().to_string(),
        }
    }
}

/// Render one tagged line
pub fn format_message(tag: Tag, message: &str) -> String {
    format!("{} {}", tag.colored_tag(), message)
}

/// Print one tagged line to stdout
pub fn print(tag: Tag, message: &str) {
    println!("{}", format_message(tag, message));
}

/// Print a `[BOOT]` line
pub fn boot(message: &str) {
    print(Tag::Boot, message);
}

/// Print an `[INFO]` line
pub fn info(message: &str) {
    print(Tag::Info, message);
}

/// Print a `[CMMD]` line
pub fn command(message: &str) {
    print(Tag::Command, message);
}

/// Print a `[NOTE]` line
pub fn note(message: &str) {
    print(Tag::Note, message);
}

/// Print an `[ERRR]` line
pub fn error(message: &str) {
    print(Tag::Error, message);
}

/// Print an `[AEON]` line
pub fn aeon(message: &str) {
    print(Tag::Aeon, message);
}

/// Print a `[SUCS]` line
pub fn success(message: &str) {
    print(Tag::Success, message);
}

/// Print a `[WARN]` line
pub fn warning(message: &str) {
    print(Tag::Warning, message);
}

/// Print a `[PLUG]` line
pub fn plugin(message: &str) {
    print(Tag::Plugin, message);
}

/// Print a `[CHAT]` line
pub fn chat(message: &str) {
    print(Tag::Chat, message);
}

/// Print a `[SOURCE]` line
pub fn source(message: &str) {
    print(Tag::Source, message);
}

/// Print a `[...]` line while waiting on the model
pub fn think(message: &str) {
    print(Tag::Think, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(Tag::Error.label(), "[ERRR]");
        assert_eq!(Tag::Aeon.label(), "[AEON]:");
        assert_eq!(Tag::Source.label(), "[SOURCE]:");
    }

    #[test]
    fn test_format_message_contains_label_and_text() {
        let line = format_message(Tag::Info, "Loaded 3 plugins");
        assert!(line.contains("INFO"));
        assert!(line.ends_with("Loaded 3 plugins"));
    }

    #[test]
    fn test_think_line_uses_waiting_label() {
        let line = format_message(Tag::Think, "Thinking...");
        assert!(line.contains("[...]:"));
        assert!(line.ends_with("Thinking..."));
    }
}
