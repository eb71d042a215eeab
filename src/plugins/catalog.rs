//! Plugin capability and the compiled-in catalog

use super::invoker::ExecutionContext;
use super::PluginDescriptor;
use crate::error::{AeonError, Result};
use crate::rag::ingest_path;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// What a plugin hands back to the invoker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PluginOutput {
    /// Message with optional provenance and generated file
    Structured {
        /// Text shown to the user
        #[serde(default)]
        message: Option<String>,
        /// Provenance label
        #[serde(default)]
        source: Option<String>,
        /// Generated file
        #[serde(default)]
        filepath: Option<PathBuf>,
    },
    /// Plain text
    Text(String),
}

impl PluginOutput {
    /// Plain text output
    pub fn text(message: impl Into<String>) -> Self {
        PluginOutput::Text(message.into())
    }
}

/// The capability every plugin implements
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Check arguments before anything runs
    fn validate(&self, _args: &[String]) -> Result<()> {
        Ok(())
    }

    /// Run with validated arguments
    ///
    /// `Ok(None)` means the plugin completed without output.
    async fn execute(&self, args: &[String], context: &ExecutionContext)
        -> Result<Option<PluginOutput>>;
}

/// Builds a plugin from its descriptor
pub type PluginConstructor =
    Arc<dyn Fn(&PluginDescriptor) -> Result<Arc<dyn Plugin>> + Send + Sync>;

/// Registry of compiled-in plugins keyed by name
#[derive(Clone, Default)]
pub struct PluginCatalog {
    constructors: HashMap<String, PluginConstructor>,
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("PluginCatalog").field("plugins", &names).finish()
    }
}

impl PluginCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the bundled plugins
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.register("hello", |_| Ok(Arc::new(HelloPlugin) as Arc<dyn Plugin>));
        catalog.register("hello-world", |_| Ok(Arc::new(HelloPlugin) as Arc<dyn Plugin>));
        catalog.register("knowledge", |descriptor| {
            Ok(Arc::new(KnowledgePlugin::new(descriptor)?) as Arc<dyn Plugin>)
        });
        catalog
    }

    /// Register a constructor under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&PluginDescriptor) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    /// Whether `name` is in the catalog
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Instantiate the plugin `name` for `descriptor`
    ///
    /// # Errors
    ///
    /// Returns [`AeonError::PluginLoad`] if no plugin is registered under
    /// `name` or its constructor fails.
    pub fn construct(&self, name: &str, descriptor: &PluginDescriptor) -> Result<Arc<dyn Plugin>> {
        let constructor = self.constructors.get(name).ok_or_else(|| {
            AeonError::PluginLoad(format!("no compiled-in plugin named '{}'", name))
        })?;
        constructor(descriptor)
            .map_err(|e| AeonError::PluginLoad(format!("{}: {}", name, e)).into())
    }
}

/// Echoes its argument
#[derive(Debug, Clone, Copy)]
pub struct HelloPlugin;

#[async_trait]
impl Plugin for HelloPlugin {
    fn validate(&self, args: &[String]) -> Result<()> {
        if args.iter().all(|a| a.trim().is_empty()) {
            return Err(AeonError::PluginExecution("a prompt is required".to_string()).into());
        }
        Ok(())
    }

    async fn execute(
        &self,
        args: &[String],
        _context: &ExecutionContext,
    ) -> Result<Option<PluginOutput>> {
        Ok(Some(PluginOutput::text(format!(
            "Hello, you said: {}",
            args.join(" ")
        ))))
    }
}

/// Ingests the plugin's model directory into the session index
#[derive(Debug, Clone)]
pub struct KnowledgePlugin {
    plugin_name: String,
    source: PathBuf,
}

impl KnowledgePlugin {
    /// Create the plugin over `descriptor.model_path`
    ///
    /// # Errors
    ///
    /// Fails when the manifest declares no `model_path`.
    pub fn new(descriptor: &PluginDescriptor) -> Result<Self> {
        let source = descriptor.model_path.clone().ok_or_else(|| {
            AeonError::PluginLoad("knowledge plugins need a 'model_path'".to_string())
        })?;
        Ok(Self {
            plugin_name: descriptor.plugin_name.clone(),
            source,
        })
    }
}

#[async_trait]
impl Plugin for KnowledgePlugin {
    async fn execute(
        &self,
        _args: &[String],
        context: &ExecutionContext,
    ) -> Result<Option<PluginOutput>> {
        let report = ingest_path(
            &self.source,
            context.vector_store.as_ref(),
            context.splitter.as_ref(),
            context.embeddings.as_ref(),
        )
        .await?;
        Ok(Some(PluginOutput::Structured {
            message: Some(report.summary()),
            source: Some(format!("Plugin: {}", self.plugin_name)),
            filepath: None,
        }))
    }
}
