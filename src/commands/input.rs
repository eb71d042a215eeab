//! Line input for the interactive loop

use crate::error::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::VecDeque;

/// Source of user input lines
///
/// `Ok(None)` means the user closed the input (Ctrl-C, Ctrl-D or end of
/// script).
pub trait LineReader {
    /// Show `prompt` and read one line
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Terminal input with line editing and history
pub struct RustylineReader {
    editor: DefaultEditor,
}

impl RustylineReader {
    /// Create a reader on the controlling terminal
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineReader for RustylineReader {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    self.editor.add_history_entry(trimmed)?;
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                Ok(None)
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                Ok(None)
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                Err(err.into())
            }
        }
    }
}

/// Pre-recorded input, for driving the loop without a terminal
#[derive(Debug, Clone, Default)]
pub struct ScriptedReader {
    lines: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedReader {
    /// Reader that yields `lines` in order, then end of input
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    /// Prompts shown so far
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Lines not consumed yet
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl LineReader for ScriptedReader {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_reader_yields_lines_then_eof() {
        let mut reader = ScriptedReader::new(["one", "two"]);
        assert_eq!(reader.read_line("> ").unwrap().as_deref(), Some("one"));
        assert_eq!(reader.read_line("> ").unwrap().as_deref(), Some("two"));
        assert_eq!(reader.read_line("> ").unwrap(), None);
        assert_eq!(reader.prompts().len(), 3);
    }
}
