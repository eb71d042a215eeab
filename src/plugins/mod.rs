//! Plugin discovery and registry
//!
//! Every plugin lives in its own directory under the plugins root and
//! describes itself with a `config.yml` manifest holding an `aeon_plugin`
//! block. The registry reads the manifests, validates them and indexes the
//! resulting [`PluginDescriptor`]s by invocation command. Loading never
//! fails as a whole: a broken plugin is skipped and the reason recorded.

pub mod catalog;
pub mod invoker;
pub mod subprocess;

pub use catalog::{Plugin, PluginCatalog, PluginOutput};
pub use invoker::{split_args, ExecutionContext, PluginInvoker, PluginResult};
pub use subprocess::SubprocessPlugin;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Manifest file name inside a plugin directory
pub const MANIFEST_FILE: &str = "config.yml";

/// Top-level manifest key holding the plugin block
pub const MANIFEST_BLOCK: &str = "aeon_plugin";

/// How a plugin's output should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Generated file is shown as an image
    TextImage,
    /// Generated file is shown as an audio player
    TextAudio,
    /// Text only
    #[default]
    Plain,
}

impl OutputKind {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("text-image") => OutputKind::TextImage,
            Some("text-audio") => OutputKind::TextAudio,
            _ => OutputKind::Plain,
        }
    }
}

/// Subprocess entry point of an `exec` plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSpec {
    /// Program to run
    pub program: String,
    /// Arguments passed before the JSON request is written to stdin
    #[serde(default)]
    pub args: Vec<String>,
}

/// Where a plugin's code comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutableUnit {
    /// A plugin compiled into the [`PluginCatalog`]
    Builtin(String),
    /// A program speaking the JSON request/response protocol
    Exec(ExecSpec),
}

#[derive(Debug, Default, Deserialize)]
struct PluginManifest {
    command: Option<String>,
    plugin_name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    parameters: Option<String>,
    desc: Option<String>,
    model_path: Option<String>,
    builtin: Option<String>,
    exec: Option<ExecSpec>,
}

/// A validated plugin manifest
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Plugin directory name, also the cache namespace
    pub dir_name: String,
    /// Invocation command, lowercase
    pub command: String,
    /// Display name
    pub plugin_name: String,
    /// One-line description for `/help`
    pub description: String,
    /// Whitespace-delimited parameter schema
    pub parameters: Option<String>,
    /// Output rendering
    pub output_kind: OutputKind,
    /// Model location resolved against `plugin_dir`
    pub model_path: Option<PathBuf>,
    /// Plugin directory
    pub plugin_dir: PathBuf,
    /// Code to run
    pub unit: ExecutableUnit,
    /// The raw `aeon_plugin` block
    pub config: serde_yaml::Value,
}

impl PluginDescriptor {
    /// Declared parameter names
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters
            .as_deref()
            .map(|p| p.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.parameter_names().len()
    }

    /// Parameter string for usage messages
    pub fn parameter_string(&self) -> String {
        self.parameter_names().join(" ")
    }

    /// Namespaced identifier of the loaded unit
    pub fn cache_key(&self) -> String {
        format!("plugin.{}", self.dir_name)
    }

    /// Read and validate the manifest in `plugin_dir`
    ///
    /// # Errors
    ///
    /// Returns a human readable reason when the plugin must be skipped.
    pub fn from_dir(plugin_dir: &Path) -> std::result::Result<Self, String> {
        let dir_name = plugin_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if !plugin_dir.is_dir() {
            return Err("plugin directory not found".to_string());
        }
        let manifest_path = plugin_dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(format!("{} not found", MANIFEST_FILE));
        }

        let raw = std::fs::read_to_string(&manifest_path)
            .map_err(|e| format!("failed to read {}: {}", MANIFEST_FILE, e))?;
        let document: serde_yaml::Value = serde_yaml::from_str(&raw)
            .map_err(|e| format!("invalid YAML in {}: {}", MANIFEST_FILE, e))?;
        let block = document
            .get(MANIFEST_BLOCK)
            .filter(|b| b.is_mapping())
            .cloned()
            .ok_or_else(|| format!("missing '{}' block", MANIFEST_BLOCK))?;
        let manifest: PluginManifest = serde_yaml::from_value(block.clone())
            .map_err(|e| format!("invalid '{}' block: {}", MANIFEST_BLOCK, e))?;

        let command = manifest
            .command
            .as_deref()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "missing 'command'".to_string())?;
        if command.contains(char::is_whitespace) {
            return Err(format!("command '{}' contains whitespace", command));
        }

        let unit = match (manifest.builtin, manifest.exec) {
            (Some(_), Some(_)) => return Err("both 'builtin' and 'exec' are set".to_string()),
            (Some(name), None) => ExecutableUnit::Builtin(name),
            (None, Some(exec)) => ExecutableUnit::Exec(exec),
            (None, None) => ExecutableUnit::Builtin(dir_name.clone()),
        };

        let model_path = manifest.model_path.map(|p| plugin_dir.join(p));

        Ok(Self {
            plugin_name: manifest.plugin_name.unwrap_or_else(|| dir_name.clone()),
            dir_name,
            command,
            description: manifest.desc.unwrap_or_default(),
            parameters: manifest.parameters.filter(|p| !p.trim().is_empty()),
            output_kind: OutputKind::parse(manifest.kind.as_deref()),
            model_path,
            plugin_dir: plugin_dir.to_path_buf(),
            unit,
            config: block,
        })
    }
}

/// A plugin that was not registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPlugin {
    /// Plugin directory name
    pub name: String,
    /// Why it was skipped
    pub reason: String,
}

/// Command-indexed plugin registry
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<PluginDescriptor>>,
    order: Vec<String>,
    skipped: Vec<SkippedPlugin>,
    warnings: Vec<String>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load plugins from `plugins_dir`
    ///
    /// With `names` set only those subdirectories are read, in the given
    /// order; otherwise every non-hidden subdirectory is read in name order.
    /// When two plugins claim the same command the first one wins.
    pub fn load(plugins_dir: &Path, names: Option<&[String]>) -> Self {
        let mut registry = Self::new();

        let names: Vec<String> = match names {
            Some(names) => names.to_vec(),
            None => discover(plugins_dir),
        };
        if names.is_empty() {
            tracing::info!(dir = %plugins_dir.display(), "No plugins to load");
        }

        for name in names {
            match PluginDescriptor::from_dir(&plugins_dir.join(&name)) {
                Ok(descriptor) => registry.register(descriptor),
                Err(reason) => registry.skip(&name, reason),
            }
        }

        tracing::info!(
            loaded = registry.len(),
            skipped = registry.skipped.len(),
            "Plugins loaded"
        );
        registry
    }

    /// Register a descriptor unless its command is already taken
    pub fn register(&mut self, descriptor: PluginDescriptor) {
        if crate::commands::special_commands::is_builtin_command(&descriptor.command) {
            let reason = format!("command '{}' shadows a built-in command", descriptor.command);
            self.skip(&descriptor.dir_name, reason);
            return;
        }
        if let Some(existing) = self.plugins.get(&descriptor.command) {
            let reason = format!(
                "command '{}' already registered by '{}'",
                descriptor.command, existing.dir_name
            );
            self.skip(&descriptor.dir_name, reason);
            return;
        }

        if let Some(model_path) = &descriptor.model_path {
            if !model_path.exists() {
                let warning = format!(
                    "Plugin '{}': model path not found: {}",
                    descriptor.plugin_name,
                    model_path.display()
                );
                tracing::warn!("{}", warning);
                self.warnings.push(warning);
            }
        }

        tracing::debug!(
            plugin = %descriptor.plugin_name,
            command = %descriptor.command,
            "Registered plugin"
        );
        self.order.push(descriptor.command.clone());
        self.plugins
            .insert(descriptor.command.clone(), Arc::new(descriptor));
    }

    fn skip(&mut self, name: &str, reason: String) {
        tracing::warn!(plugin = %name, "Skipping plugin: {}", reason);
        self.skipped.push(SkippedPlugin {
            name: name.to_string(),
            reason,
        });
    }

    /// Look up a plugin by invocation command, case-insensitively
    pub fn get(&self, command: &str) -> Option<Arc<PluginDescriptor>> {
        self.plugins.get(&command.to_lowercase()).cloned()
    }

    /// Registered plugins in load order
    pub fn list(&self) -> Vec<Arc<PluginDescriptor>> {
        self.order
            .iter()
            .filter_map(|command| self.plugins.get(command).cloned())
            .collect()
    }

    /// Plugins rejected during loading
    pub fn skipped(&self) -> &[SkippedPlugin] {
        &self.skipped
    }

    /// Non-fatal registration warnings
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is registered
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

fn discover(plugins_dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(plugins_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::info!(dir = %plugins_dir.display(), "Plugins directory not readable: {}", e);
            return Vec::new();
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !name.starts_with(crate::storage::RESERVED_PREFIX))
        .collect();
    names.sort();
    names
}
