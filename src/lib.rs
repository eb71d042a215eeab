//! AEON - Local conversational assistant library
//!
//! This library provides the core functionality for AEON: isolated, persisted
//! conversation sessions, each bound to its own retrieval index, extended by
//! command plugins discovered on disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `storage`: Session directories and history files under the memory root
//! - `backup`: Zip archives of sessions and their validated restore
//! - `plugins`: Plugin discovery, executable units and invocation
//! - `rag`: Collaborator traits, default adapters and document ingestion
//! - `session`: Creating, opening and re-binding sessions
//! - `commands`: The interactive loop and its built-in commands
//! - `web`: The HTTP variant
//! - `config`, `error`, `cli`, `ui`: Configuration, errors, CLI and terminal output
//!
//! # Example
//!
//! ```no_run
//! use aeon::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yml", &Default::default())?;
//!     config.validate()?;
//!
//!     // Session usage would go here
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod plugins;
pub mod rag;
pub mod session;
pub mod storage;
pub mod ui;
pub mod web;

// Re-export commonly used types
pub use backup::BackupManager;
pub use config::Config;
pub use error::{AeonError, Result};
pub use plugins::{PluginInvoker, PluginRegistry};
pub use session::{SessionContext, SessionManager};
pub use storage::ConversationStore;

#[cfg(test)]
pub mod test_utils;
