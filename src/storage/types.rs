use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Subdirectory holding the session's vector index
pub const DB_DIR: &str = "db";

/// Subdirectory receiving artifacts generated by plugins
pub const OUTPUTS_DIR: &str = "outputs";

/// One exchange in a conversation history file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// What the user typed
    pub user: String,
    /// What AEON answered
    pub aeon: String,
    /// Provenance labels such as retrieved document sources
    #[serde(rename = "source", default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl ChatTurn {
    /// Create a turn without provenance
    pub fn new(user: impl Into<String>, aeon: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            aeon: aeon.into(),
            sources: Vec::new(),
        }
    }

    /// Attach provenance labels
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }
}

/// A conversation session on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSession {
    /// Directory name under the memory root
    pub id: String,
    /// Directory exclusively owned by this session
    pub memory_path: PathBuf,
    /// JSON history file inside `memory_path`
    pub history_file: PathBuf,
}

impl ConversationSession {
    /// Vector index directory
    pub fn db_dir(&self) -> PathBuf {
        self.memory_path.join(DB_DIR)
    }

    /// Generated artifacts directory
    pub fn outputs_dir(&self) -> PathBuf {
        self.memory_path.join(OUTPUTS_DIR)
    }

    /// Configuration snapshot path
    pub fn config_path(&self) -> PathBuf {
        self.memory_path.join(crate::config::SESSION_CONFIG_FILE)
    }

    /// File name of the history file
    pub fn history_filename(&self) -> String {
        self.history_file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.json", self.id))
    }

    /// Whether `path` lies inside this session's directory
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.memory_path)
    }
}

/// Entry of a numbered session listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// 1-based position in the listing
    pub index: usize,
    /// Session id (directory name)
    pub id: String,
    /// Session directory
    #[serde(skip)]
    pub path: PathBuf,
}

/// Result of reading a history file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedHistory {
    /// Turns in file order
    pub turns: Vec<ChatTurn>,
    /// Set when the file existed but could not be used
    pub warning: Option<String>,
}
