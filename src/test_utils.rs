//! Test utilities for AEON
//!
//! This module provides common test utilities: temporary directories, a
//! configuration rooted in one, plugin manifests, and an offline
//! collaborator factory.

use crate::config::Config;
use crate::error::Result;
use crate::rag::{
    Embeddings, HashEmbeddings, LanguageModel, RagBinding, RagFactory, SearchHit, SearchProvider,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Examples
///
/// ```ignore
/// let dir = temp_dir();
/// let path = dir.path();
/// ```
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Configuration whose paths all live inside `dir`
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.memory_dir = dir.path().join("chats");
    config.paths.input_dir = dir.path().join("input");
    config.paths.output_dir = dir.path().join("output");
    config.paths.plugins_dir = dir.path().join("plugins");
    config.embeddings.provider = "hash".to_string();
    config.embeddings.dimensions = 64;
    config
}

/// Write `<plugins_dir>/<name>/config.yml` with `yaml` as its contents
///
/// # Panics
///
/// Panics if the directory or file cannot be written
pub fn write_plugin(plugins_dir: &Path, name: &str, yaml: &str) -> PathBuf {
    let dir = plugins_dir.join(name);
    std::fs::create_dir_all(&dir).expect("Failed to create plugin directory");
    std::fs::write(dir.join(crate::plugins::MANIFEST_FILE), yaml)
        .expect("Failed to write plugin manifest");
    dir
}

/// Language model answering every prompt with the same text
pub struct EchoModel(pub String);

#[async_trait]
impl LanguageModel for EchoModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Search provider that never finds anything
pub struct NoSearch;

#[async_trait]
impl SearchProvider for NoSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

/// Factory binding hash embeddings and [`EchoModel`]
pub struct OfflineFactory;

#[async_trait]
impl RagFactory for OfflineFactory {
    async fn bind(&self, config: &Config, db_dir: &Path) -> Result<RagBinding> {
        let embeddings: Arc<dyn Embeddings> = Arc::new(HashEmbeddings::new(64));
        RagBinding::assemble(
            config,
            db_dir,
            embeddings,
            Arc::new(EchoModel("offline answer".to_string())),
            Arc::new(NoSearch),
        )
        .await
    }
}
