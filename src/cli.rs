//! Command-line interface definition for AEON
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for the interactive chat, the HTTP variant, and
//! read-only listings of plugins and sessions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AEON - Local conversational assistant
///
/// Chat with a local language model over isolated, persisted sessions,
/// each with its own retrieval memory, extended by command plugins.
#[derive(Parser, Debug, Clone)]
#[command(name = "aeon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yml")]
    pub config: Option<String>,

    /// Override the conversation memory root
    #[arg(long)]
    pub memory_dir: Option<PathBuf>,

    /// Override the plugin root
    #[arg(long)]
    pub plugins_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute (defaults to `chat`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for AEON
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Start the interactive chat with startup session selection
    Chat,

    /// Serve the HTTP variant
    Serve {
        /// Socket address to bind, overriding `web.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List discovered plugins and the reasons any were skipped
    Plugins,

    /// List stored conversation sessions
    Sessions,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run, `chat` when none was given
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Chat)
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config.yml".to_string()),
            memory_dir: None,
            plugins_dir: None,
            verbose: false,
            json_logs: false,
            command: None,
        }
    }
}
