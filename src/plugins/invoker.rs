//! Plugin invocation
//!
//! The invoker validates arguments against the descriptor's parameter
//! schema, loads the executable unit once per process, runs it on its own
//! task and normalises whatever comes back into a [`PluginResult`]. Every
//! failure past argument validation is reported as
//! [`AeonError::PluginExecution`] so a misbehaving plugin never takes the
//! dispatcher down with it.

use super::catalog::{Plugin, PluginCatalog, PluginOutput};
use super::subprocess::SubprocessPlugin;
use super::{ExecutableUnit, OutputKind, PluginDescriptor};
use crate::config::PluginsConfig;
use crate::error::{AeonError, Result};
use crate::rag::{Embeddings, RagBinding, TextSplitter, VectorStore};
use crate::storage::ConversationSession;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything a plugin may use during one invocation
#[derive(Clone)]
pub struct ExecutionContext {
    /// Invocation command
    pub command: String,
    /// Validated positional arguments
    pub args: Vec<String>,
    /// Where generated files go
    pub output_dir: PathBuf,
    /// Active session directory
    pub memory_path: PathBuf,
    /// Active session id
    pub conversation_id: String,
    /// History file name of the active session
    pub conversation_filename: String,
    /// The plugin's own directory
    pub plugin_dir: PathBuf,
    /// Raw manifest block
    pub plugin_config: serde_yaml::Value,
    /// Resolved model location
    pub model_path: Option<PathBuf>,
    /// Active session's vector index
    pub vector_store: Arc<dyn VectorStore>,
    /// Active session's text splitter
    pub splitter: Arc<dyn TextSplitter>,
    /// Active session's embedding model
    pub embeddings: Arc<dyn Embeddings>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("conversation_id", &self.conversation_id)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl ExecutionContext {
    /// Build the context for running `descriptor` in `session`
    pub fn new(
        descriptor: &PluginDescriptor,
        args: Vec<String>,
        session: &ConversationSession,
        binding: &RagBinding,
    ) -> Self {
        Self {
            command: descriptor.command.clone(),
            args,
            output_dir: session.outputs_dir(),
            memory_path: session.memory_path.clone(),
            conversation_id: session.id.clone(),
            conversation_filename: session.history_filename(),
            plugin_dir: descriptor.plugin_dir.clone(),
            plugin_config: descriptor.config.clone(),
            model_path: descriptor.model_path.clone(),
            vector_store: binding.vector_store.clone(),
            splitter: binding.splitter.clone(),
            embeddings: binding.embeddings.clone(),
        }
    }
}

/// Normalised plugin answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginResult {
    /// Text to show and record, including any media reference
    pub message: String,
    /// Provenance label for the history turn
    pub source: String,
    /// Servable reference of the generated file, if linked
    pub file_url: Option<String>,
}

/// Split `raw` into at most `n` whitespace-separated tokens
///
/// The last token absorbs the remainder of the line. Returns fewer than `n`
/// tokens when the input runs out.
pub fn split_args(raw: &str, n: usize) -> Vec<String> {
    let mut args = Vec::with_capacity(n);
    let mut rest = raw.trim();
    while !rest.is_empty() && args.len() < n {
        if args.len() + 1 == n {
            args.push(rest.to_string());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                args.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            None => {
                args.push(rest.to_string());
                rest = "";
            }
        }
    }
    args
}

/// Validate `raw_args` against the descriptor's parameter schema
///
/// Plugins without declared parameters receive the whole remainder as a
/// single argument, or none when it is blank.
///
/// # Errors
///
/// Returns [`AeonError::Usage`] when fewer arguments than declared are given.
pub fn parse_arguments(descriptor: &PluginDescriptor, raw_args: &str) -> Result<Vec<String>> {
    let arity = descriptor.arity();
    if arity == 0 {
        let trimmed = raw_args.trim();
        return Ok(if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        });
    }

    let args = split_args(raw_args, arity);
    if args.len() < arity {
        return Err(AeonError::Usage {
            command: descriptor.command.clone(),
            parameters: descriptor.parameter_string(),
        }
        .into());
    }
    Ok(args)
}

/// Loads and runs plugins
pub struct PluginInvoker {
    catalog: PluginCatalog,
    timeout: Duration,
    loaded: Mutex<HashMap<String, Arc<dyn Plugin>>>,
}

impl std::fmt::Debug for PluginInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInvoker")
            .field("catalog", &self.catalog)
            .field("timeout", &self.timeout)
            .field("loaded", &self.loaded_count())
            .finish()
    }
}

impl PluginInvoker {
    /// Create an invoker over `catalog`
    ///
    /// `timeout` bounds subprocess plugins.
    pub fn new(catalog: PluginCatalog, timeout: Duration) -> Self {
        Self {
            catalog,
            timeout,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Invoker with the bundled catalog and the configured timeout
    pub fn from_config(config: &PluginsConfig) -> Self {
        Self::new(
            PluginCatalog::with_defaults(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// Number of executable units loaded so far
    pub fn loaded_count(&self) -> usize {
        self.lock().len()
    }

    /// Forget every loaded unit
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Plugin>>> {
        self.loaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resolve(&self, descriptor: &PluginDescriptor) -> Result<Arc<dyn Plugin>> {
        let key = descriptor.cache_key();
        if let Some(plugin) = self.lock().get(&key) {
            return Ok(plugin.clone());
        }

        let plugin: Arc<dyn Plugin> = match &descriptor.unit {
            ExecutableUnit::Builtin(name) => self.catalog.construct(name, descriptor)?,
            ExecutableUnit::Exec(spec) => {
                Arc::new(SubprocessPlugin::new(descriptor, spec, self.timeout)?)
            }
        };
        tracing::info!(plugin = %descriptor.plugin_name, key = %key, "Loaded plugin");

        Ok(self.lock().entry(key).or_insert(plugin).clone())
    }

    /// Run `descriptor` with `raw_args` in the active session
    ///
    /// # Errors
    ///
    /// - [`AeonError::Usage`] when arguments are missing; nothing runs
    /// - [`AeonError::PluginLoad`] when the executable unit cannot be loaded
    /// - [`AeonError::PluginExecution`] when the plugin fails or panics
    pub async fn invoke(
        &self,
        descriptor: &PluginDescriptor,
        raw_args: &str,
        session: &ConversationSession,
        binding: &RagBinding,
    ) -> Result<PluginResult> {
        let args = parse_arguments(descriptor, raw_args)?;
        let plugin = self.resolve(descriptor)?;

        if let Err(e) = plugin.validate(&args) {
            return Err(execution_error(descriptor, e));
        }

        let context = ExecutionContext::new(descriptor, args, session, binding);
        tokio::fs::create_dir_all(&context.output_dir).await?;

        tracing::info!(
            plugin = %descriptor.plugin_name,
            session = %session.id,
            "Invoking plugin"
        );
        let task = tokio::spawn(async move { plugin.execute(&context.args, &context).await });
        let output = match task.await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(execution_error(descriptor, e)),
            Err(join_error) => {
                tracing::error!(plugin = %descriptor.plugin_name, "Plugin task failed: {}", join_error);
                return Err(AeonError::PluginExecution(format!(
                    "{} crashed: {}",
                    descriptor.plugin_name, join_error
                ))
                .into());
            }
        };

        Ok(render_output(
            descriptor,
            output,
            &session.memory_path,
            &session.id,
        ))
    }
}

fn execution_error(descriptor: &PluginDescriptor, error: anyhow::Error) -> anyhow::Error {
    tracing::error!(plugin = %descriptor.plugin_name, "Plugin failed: {}", error);
    match error.downcast::<AeonError>() {
        Ok(AeonError::PluginExecution(message)) => {
            AeonError::PluginExecution(format!("{}: {}", descriptor.plugin_name, message)).into()
        }
        Ok(other) => AeonError::PluginExecution(format!("{}: {}", descriptor.plugin_name, other))
            .into(),
        Err(other) => AeonError::PluginExecution(format!("{}: {}", descriptor.plugin_name, other))
            .into(),
    }
}

/// Turn raw plugin output into what the user sees
pub fn render_output(
    descriptor: &PluginDescriptor,
    output: Option<PluginOutput>,
    memory_path: &Path,
    conversation_id: &str,
) -> PluginResult {
    let default_source = format!("Plugin: {}", descriptor.plugin_name);
    let no_output = || PluginResult {
        message: format!(
            "Plugin '{}' executed successfully but returned no output.",
            descriptor.command
        ),
        source: default_source.clone(),
        file_url: None,
    };

    match output {
        None => no_output(),
        Some(PluginOutput::Text(text)) if text.trim().is_empty() => no_output(),
        Some(PluginOutput::Text(text)) => PluginResult {
            message: text,
            source: default_source.clone(),
            file_url: None,
        },
        Some(PluginOutput::Structured {
            message,
            source,
            filepath,
        }) => {
            let mut message = message.unwrap_or_else(|| {
                format!(
                    "Plugin {} executed but returned no message.",
                    descriptor.command
                )
            });
            let file_url = filepath.and_then(|path| {
                let url = servable_reference(memory_path, conversation_id, &path);
                if url.is_none() {
                    tracing::warn!(
                        plugin = %descriptor.plugin_name,
                        path = %path.display(),
                        "Plugin returned a file outside the session directory"
                    );
                }
                url
            });
            if let Some(url) = &file_url {
                match descriptor.output_kind {
                    OutputKind::TextImage => {
                        message.push_str(&format!("\n\n![Generated File]({})", url))
                    }
                    OutputKind::TextAudio => message.push_str(&format!(
                        "\n\n<audio controls><source src='{}' type='audio/wav'></audio>",
                        url
                    )),
                    OutputKind::Plain => {}
                }
            }
            PluginResult {
                message,
                source: source.unwrap_or(default_source),
                file_url,
            }
        }
    }
}

/// `/serve_from_memory/<relative path>?conv_id=<id>` for files inside `memory_path`
pub fn servable_reference(memory_path: &Path, conversation_id: &str, path: &Path) -> Option<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        memory_path.join(path)
    };
    if absolute
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }
    let relative = absolute.strip_prefix(memory_path).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!(
        "/serve_from_memory/{}?conv_id={}",
        parts.join("/"),
        conversation_id
    ))
}
