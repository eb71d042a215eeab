//! Error types for AEON
//!
//! This module defines the error taxonomy used throughout the application,
//! using `thiserror` for ergonomic error handling. Fallible functions return
//! [`Result`], an `anyhow` alias, and callers that need to branch on the kind
//! of failure use `downcast_ref::<AeonError>()`.

use thiserror::Error;

/// Main error type for AEON operations
///
/// Variants are grouped by the unit of work they belong to: configuration,
/// session resolution, plugins, ingestion, backups and the RAG collaborators.
#[derive(Error, Debug)]
pub enum AeonError {
    /// Missing or malformed global or plugin configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A freshly generated session id already exists under the memory root
    #[error("Session id collision: {0}")]
    Collision(String),

    /// A session index, id or file could not be resolved
    #[error("Not found: {0}")]
    NotFound(String),

    /// The target name of a rename already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation targets the currently active session
    #[error("Cannot modify the active conversation: {0}")]
    ActiveSession(String),

    /// A session name that cannot be used as a directory name
    #[error("Invalid session name: {0}")]
    InvalidName(String),

    /// Plugin invoked with fewer arguments than its parameter schema declares
    #[error("Usage: {command} {parameters}")]
    Usage {
        /// The plugin's invocation command
        command: String,
        /// The declared parameter string, shown verbatim
        parameters: String,
    },

    /// The plugin's executable unit could not be resolved or loaded
    #[error("Plugin load error: {0}")]
    PluginLoad(String),

    /// The plugin failed while executing
    #[error("Plugin execution error: {0}")]
    PluginExecution(String),

    /// Archive or restore failures
    #[error("Backup error: {0}")]
    Backup(String),

    /// Document loading failures
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Embedding, retrieval or generation failures
    #[error("RAG error: {0}")]
    Rag(String),

    /// Web search provider failures
    #[error("Search error: {0}")]
    Search(String),

    /// History file read/write failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Zip archive errors
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Result type alias for AEON operations
///
/// Uses `anyhow::Error` so that context can be attached at I/O boundaries
/// while the typed [`AeonError`] stays recoverable through downcasting.
pub type Result<T> = anyhow::Result<T>;

/// Returns the [`AeonError`] at the root of an `anyhow` chain, if any
pub fn as_aeon_error(err: &anyhow::Error) -> Option<&AeonError> {
    err.chain().find_map(|cause| cause.downcast_ref::<AeonError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = AeonError::Config("missing llm.model".to_string());
        assert_eq!(error.to_string(), "Configuration error: missing llm.model");
    }

    #[test]
    fn test_usage_error_display_carries_parameters() {
        let error = AeonError::Usage {
            command: "/image".to_string(),
            parameters: "<WIDTH> <PROMPT>".to_string(),
        };
        assert_eq!(error.to_string(), "Usage: /image <WIDTH> <PROMPT>");
    }

    #[test]
    fn test_conflict_error_display() {
        let error = AeonError::Conflict("greeting".to_string());
        assert_eq!(error.to_string(), "Conflict: greeting");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: AeonError = io_error.into();
        assert!(matches!(error, AeonError::Io(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: AeonError = yaml_error.into();
        assert!(matches!(error, AeonError::Yaml(_)));
    }

    #[test]
    fn test_as_aeon_error_finds_wrapped_variant() {
        let err = anyhow::Error::from(AeonError::NotFound("conversation 9".to_string()))
            .context("while opening");
        assert!(matches!(as_aeon_error(&err), Some(AeonError::NotFound(_))));
    }

    #[test]
    fn test_as_aeon_error_none_for_foreign_error() {
        let err = anyhow::anyhow!("plain failure");
        assert!(as_aeon_error(&err).is_none());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AeonError>();
    }
}
