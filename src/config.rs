//! Configuration management for AEON
//!
//! This module handles loading, parsing, validating, and persisting
//! configuration from files, environment variables, and CLI overrides.
//!
//! The same [`Config`] type serves two roles: the global configuration read
//! at startup, and the per-session snapshot written to `<session>/config.yml`
//! when a conversation is created. Reopening a session reads its snapshot so
//! the conversation keeps behaving as it did when it was created.

use crate::error::{AeonError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the configuration snapshot inside a session directory
pub const SESSION_CONFIG_FILE: &str = "config.yml";

/// Main configuration structure for AEON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Language model settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding model and chunking settings
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    /// Retrieval behaviour
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Filesystem layout
    #[serde(default)]
    pub paths: PathsConfig,
    /// Plugin loading
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Web search provider
    #[serde(default)]
    pub search: SearchConfig,
    /// HTTP variant
    #[serde(default)]
    pub web: WebConfig,
}

/// Language model configuration (Ollama-compatible server)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-k sampling
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Context window passed to the server
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,

    /// Persona prepended to every prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f32 {
    0.9
}

fn default_num_ctx() -> u32 {
    4096
}

fn default_system_prompt() -> String {
    "You are AEON, a helpful and concise local assistant.".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_llm_model(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            num_ctx: default_num_ctx(),
            system_prompt: default_system_prompt(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Embedding provider: "ollama" or "hash" (offline, deterministic)
    #[serde(default = "default_embeddings_provider")]
    pub provider: String,

    /// Server host for the "ollama" provider
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Embedding model name
    #[serde(default = "default_embeddings_model")]
    pub model: String,

    /// Vector size for the "hash" provider
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_embeddings_provider() -> String {
    "ollama".to_string()
}

fn default_embeddings_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    100
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: default_embeddings_provider(),
            host: default_ollama_host(),
            model: default_embeddings_model(),
            dimensions: default_dimensions(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per query
    #[serde(default = "default_retrieval_top_k")]
    pub top_k: usize,

    /// Add every chat turn to the session's vector store
    #[serde(default = "default_persist_turns")]
    pub persist_turns: bool,
}

fn default_retrieval_top_k() -> usize {
    4
}

fn default_persist_turns() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_retrieval_top_k(),
            persist_turns: default_persist_turns(),
        }
    }
}

/// Filesystem layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root holding one directory per conversation
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,

    /// Documents ingested into every new or reopened session
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Generated artifacts and backups
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Root holding one directory per plugin
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,
}

fn default_memory_dir() -> PathBuf {
    PathBuf::from("data/chats")
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("data/input")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/output")
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("plugins")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            memory_dir: default_memory_dir(),
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            plugins_dir: default_plugins_dir(),
        }
    }
}

impl PathsConfig {
    /// Directory that receives `/zip` archives
    pub fn backup_dir(&self) -> PathBuf {
        self.output_dir.join("backup")
    }
}

/// Plugin loading configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Plugin directory names to load; `None` loads every plugin directory
    #[serde(default)]
    pub load: Option<Vec<String>>,

    /// Wall-clock limit for subprocess plugins
    #[serde(default = "default_plugin_timeout")]
    pub timeout_seconds: u64,
}

fn default_plugin_timeout() -> u64 {
    300
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            load: None,
            timeout_seconds: default_plugin_timeout(),
        }
    }
}

/// Web search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// DuckDuckGo-compatible instant answer endpoint
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Results requested from the provider
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Results whose bodies are summarised and ingested
    #[serde(default = "default_context_results")]
    pub context_results: usize,
}

fn default_search_endpoint() -> String {
    "https://api.duckduckgo.com/".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_context_results() -> usize {
    3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            max_results: default_max_results(),
            context_results: default_context_results(),
        }
    }
}

/// HTTP variant configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebConfig {
    /// Socket address the server binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:4303".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Read a configuration file (global config or a session snapshot)
    ///
    /// # Errors
    ///
    /// Returns [`AeonError::Config`] if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AeonError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_yaml::from_str(&contents).map_err(|e| {
            AeonError::Config(format!(
                "Failed to parse config {}: {}",
                path.display(),
                e
            ))
            .into()
        })
    }

    /// Write this configuration as YAML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(host) = std::env::var("AEON_LLM_HOST") {
            self.llm.host = host;
        }

        if let Ok(model) = std::env::var("AEON_LLM_MODEL") {
            self.llm.model = model;
        }

        if let Ok(provider) = std::env::var("AEON_EMBEDDINGS_PROVIDER") {
            self.embeddings.provider = provider;
        }

        if let Ok(model) = std::env::var("AEON_EMBEDDINGS_MODEL") {
            self.embeddings.model = model;
        }

        if let Ok(dir) = std::env::var("AEON_MEMORY_DIR") {
            self.paths.memory_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("AEON_PLUGINS_DIR") {
            self.paths.plugins_dir = PathBuf::from(dir);
        }

        if let Ok(bind) = std::env::var("AEON_WEB_BIND") {
            self.web.bind = bind;
        }

        if let Ok(top_k) = std::env::var("AEON_RETRIEVAL_TOP_K") {
            if let Ok(value) = top_k.parse() {
                self.retrieval.top_k = value;
            } else {
                tracing::warn!("Invalid AEON_RETRIEVAL_TOP_K: {}", top_k);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(dir) = &cli.memory_dir {
            self.paths.memory_dir = dir.clone();
        }
        if let Some(dir) = &cli.plugins_dir {
            self.paths.plugins_dir = dir.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`AeonError::Config`] describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(AeonError::Config("llm.model cannot be empty".to_string()).into());
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AeonError::Config(
                "llm.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.llm.timeout_seconds == 0 {
            return Err(AeonError::Config(
                "llm.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        let valid_providers = ["ollama", "hash"];
        if !valid_providers.contains(&self.embeddings.provider.as_str()) {
            return Err(AeonError::Config(format!(
                "Invalid embeddings provider: {}. Must be one of: {}",
                self.embeddings.provider,
                valid_providers.join(", ")
            ))
            .into());
        }

        if self.embeddings.provider == "hash" && self.embeddings.dimensions == 0 {
            return Err(AeonError::Config(
                "embeddings.dimensions must be greater than 0".to_string(),
            )
            .into());
        }

        if self.embeddings.chunk_size == 0 {
            return Err(AeonError::Config(
                "embeddings.chunk_size must be greater than 0".to_string(),
            )
            .into());
        }

        if self.embeddings.chunk_overlap >= self.embeddings.chunk_size {
            return Err(AeonError::Config(
                "embeddings.chunk_overlap must be smaller than chunk_size".to_string(),
            )
            .into());
        }

        if self.retrieval.top_k == 0 {
            return Err(
                AeonError::Config("retrieval.top_k must be greater than 0".to_string()).into(),
            );
        }

        if self.plugins.timeout_seconds == 0 {
            return Err(AeonError::Config(
                "plugins.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.search.max_results == 0 {
            return Err(AeonError::Config(
                "search.max_results must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            retrieval: RetrievalConfig::default(),
            paths: PathsConfig::default(),
            plugins: PluginsConfig::default(),
            search: SearchConfig::default(),
            web: WebConfig::default(),
        }
    }
}
