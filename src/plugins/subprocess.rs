//! Subprocess plugins
//!
//! An `exec` plugin is an external program. Each invocation spawns it in the
//! plugin directory, writes one JSON request to its stdin and waits for it to
//! exit. Stdout is read as a JSON `{message, source, filepath}` object, or as
//! plain text when it is not one.
//!
//! # Request
//!
//! ```json
//! {"command": "/image", "args": ["a red fox"], "output_dir": "...",
//!  "memory_path": "...", "conversation_id": "4f2a1", "conversation_filename":
//!  "4f2a1.json", "plugin_dir": "...", "plugin_config": {...}}
//! ```

use super::catalog::{Plugin, PluginOutput};
use super::invoker::ExecutionContext;
use super::{ExecSpec, PluginDescriptor};
use crate::error::{AeonError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Serialize)]
struct SubprocessRequest<'a> {
    command: &'a str,
    args: &'a [String],
    output_dir: &'a Path,
    memory_path: &'a Path,
    conversation_id: &'a str,
    conversation_filename: &'a str,
    plugin_dir: &'a Path,
    plugin_config: serde_json::Value,
}

/// Plugin backed by an external program
#[derive(Debug, Clone)]
pub struct SubprocessPlugin {
    plugin_name: String,
    program: PathBuf,
    args: Vec<String>,
    plugin_dir: PathBuf,
    timeout: Duration,
}

impl SubprocessPlugin {
    /// Resolve the program of `spec` for `descriptor`
    ///
    /// A relative program containing a path separator is resolved against the
    /// plugin directory and must exist. A bare name is looked up on `PATH`
    /// when spawned.
    ///
    /// # Errors
    ///
    /// Returns [`AeonError::PluginLoad`] if a path-like program is missing.
    pub fn new(descriptor: &PluginDescriptor, spec: &ExecSpec, timeout: Duration) -> Result<Self> {
        let program = resolve_program(&descriptor.plugin_dir, &spec.program)?;
        Ok(Self {
            plugin_name: descriptor.plugin_name.clone(),
            program,
            args: spec.args.clone(),
            plugin_dir: descriptor.plugin_dir.clone(),
            timeout,
        })
    }

    /// Resolved program
    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, request: Vec<u8>) -> Result<std::process::Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.plugin_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            AeonError::PluginExecution(format!(
                "failed to spawn `{}`: {}",
                self.program.display(),
                e
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AeonError::PluginExecution("child stdin unavailable".into()))?;
        if let Err(e) = stdin.write_all(&request).await {
            // the program may exit without reading its request
            tracing::debug!(plugin = %self.plugin_name, "Failed to write plugin request: {}", e);
        }
        drop(stdin);

        child.wait_with_output().await.map_err(|e| {
            AeonError::PluginExecution(format!("failed to wait for plugin: {}", e)).into()
        })
    }
}

fn resolve_program(plugin_dir: &Path, program: &str) -> Result<PathBuf> {
    let path = PathBuf::from(program);
    let path_like = program.contains('/') || program.contains(std::path::MAIN_SEPARATOR);
    if !path_like {
        return Ok(path);
    }
    let resolved = if path.is_absolute() {
        path
    } else {
        plugin_dir.join(path)
    };
    if !resolved.is_file() {
        return Err(AeonError::PluginLoad(format!(
            "program not found: {}",
            resolved.display()
        ))
        .into());
    }
    Ok(resolved)
}

/// Interpret a plugin's stdout
pub fn parse_stdout(stdout: &str) -> Option<PluginOutput> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        if let Ok(output @ PluginOutput::Structured { .. }) = serde_json::from_str(trimmed) {
            return Some(output);
        }
    }
    Some(PluginOutput::Text(trimmed.to_string()))
}

#[async_trait]
impl Plugin for SubprocessPlugin {
    async fn execute(
        &self,
        args: &[String],
        context: &ExecutionContext,
    ) -> Result<Option<PluginOutput>> {
        let plugin_config = serde_json::to_value(&context.plugin_config)?;
        let request = serde_json::to_vec(&SubprocessRequest {
            command: &context.command,
            args,
            output_dir: &context.output_dir,
            memory_path: &context.memory_path,
            conversation_id: &context.conversation_id,
            conversation_filename: &context.conversation_filename,
            plugin_dir: &context.plugin_dir,
            plugin_config,
        })?;

        tracing::debug!(
            plugin = %self.plugin_name,
            program = %self.program.display(),
            "Spawning plugin process"
        );
        let output = tokio::time::timeout(self.timeout, self.run(request))
            .await
            .map_err(|_| {
                AeonError::PluginExecution(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(AeonError::PluginExecution(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            ))
            .into());
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(plugin = %self.plugin_name, "plugin stderr: {}", stderr.trim());
        }

        Ok(parse_stdout(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stdout_json_object() {
        let output = parse_stdout("{\"message\": \"ok\", \"source\": \"demo\"}\n").unwrap();
        assert_eq!(
            output,
            PluginOutput::Structured {
                message: Some("ok".to_string()),
                source: Some("demo".to_string()),
                filepath: None,
            }
        );
    }

    #[test]
    fn test_parse_stdout_plain_text_and_empty() {
        assert_eq!(parse_stdout("hello\n"), Some(PluginOutput::text("hello")));
        assert_eq!(parse_stdout("{not json"), Some(PluginOutput::text("{not json")));
        assert_eq!(parse_stdout("  \n"), None);
    }

    #[test]
    fn test_resolve_program_against_plugin_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("run.sh"), "#!/bin/sh\n").unwrap();
        assert_eq!(
            resolve_program(dir.path(), "./run.sh").unwrap(),
            dir.path().join("./run.sh")
        );
        assert_eq!(resolve_program(dir.path(), "python3").unwrap(), PathBuf::from("python3"));

        let err = resolve_program(dir.path(), "bin/missing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AeonError>(),
            Some(AeonError::PluginLoad(_))
        ));
    }
}
