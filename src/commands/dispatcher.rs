//! The interactive command loop
//!
//! Each input line is routed, in order, to: an exit token, a built-in
//! command, a plugin claiming the leading token, or the active session's
//! RAG chain. Every handler reports its own failures and returns control to
//! the loop; only an exit token or a restart request leaves it.

use super::input::LineReader;
use super::special_commands::{
    builtin_help, parse_special_command, split_leading_token, SpecialCommand,
};
use crate::backup::BackupManager;
use crate::config::Config;
use crate::error::{as_aeon_error, AeonError, Result};
use crate::plugins::{PluginInvoker, PluginRegistry};
use crate::rag::IngestReport;
use crate::session::{SessionContext, SessionManager};
use crate::ui;
use colored::Colorize;
use std::path::Path;

/// What the loop should do after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    /// Read the next line
    Continue,
    /// Leave the loop
    Exit,
    /// Reload configuration and plugins, then continue
    Restart,
}

/// Routes input lines for one active session
pub struct CommandDispatcher {
    manager: SessionManager,
    registry: PluginRegistry,
    invoker: PluginInvoker,
    backups: BackupManager,
    context: SessionContext,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("session", &self.context.id())
            .field("plugins", &self.registry.len())
            .finish()
    }
}

impl CommandDispatcher {
    /// Create a dispatcher with `context` active
    pub fn new(
        manager: SessionManager,
        registry: PluginRegistry,
        invoker: PluginInvoker,
        backups: BackupManager,
        context: SessionContext,
    ) -> Self {
        Self {
            manager,
            registry,
            invoker,
            backups,
            context,
        }
    }

    /// The active session
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// The session manager
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// The loaded plugins
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Colored input prompt naming the active session
    pub fn prompt(&self) -> String {
        format!(
            "{}{}{} ",
            "[".bright_green(),
            self.context.id().bright_yellow(),
            "@>>>>]:".bright_green()
        )
    }

    /// Read and handle lines until exit, restart or end of input
    pub async fn run(&mut self, reader: &mut dyn LineReader) -> Result<LoopControl> {
        loop {
            let prompt = self.prompt();
            let line = match reader.read_line(&prompt)? {
                Some(line) => line,
                None => return Ok(LoopControl::Exit),
            };
            match self.handle_line(&line, reader).await {
                LoopControl::Continue => {}
                other => return Ok(other),
            }
        }
    }

    /// Reload plugins and re-bind the active session under `config`
    ///
    /// Nothing is replaced unless the session re-binds.
    pub async fn reload(&mut self, config: Config) -> Result<()> {
        let id = self.context.id().to_string();
        let registry =
            PluginRegistry::load(&config.paths.plugins_dir, config.plugins.load.as_deref());
        let invoker = PluginInvoker::from_config(&config.plugins);
        let backups = BackupManager::new(
            self.manager.store().root().to_path_buf(),
            config.paths.backup_dir(),
        );
        let context = self.manager.restart(config, &id).await?;

        self.registry = registry;
        self.invoker = invoker;
        self.backups = backups;
        self.context = context;
        ui::success(&format!(
            "AEON restarted with {} plugin(s).",
            self.registry.len()
        ));
        show_notes(&self.context);
        Ok(())
    }

    /// Handle one input line
    pub async fn handle_line(&mut self, line: &str, reader: &mut dyn LineReader) -> LoopControl {
        let line = line.trim();
        if line.is_empty() {
            return LoopControl::Continue;
        }

        let command = match parse_special_command(line) {
            Ok(command) => command,
            Err(e) => {
                ui::error(&e.to_string());
                return LoopControl::Continue;
            }
        };
        tracing::debug!(session = %self.context.id(), ?command, "Dispatching input");

        let outcome = match command {
            SpecialCommand::Exit => return LoopControl::Exit,
            SpecialCommand::Restart => {
                ui::info("Restarting AEON...");
                return LoopControl::Restart;
            }
            SpecialCommand::Help => {
                self.show_help();
                Ok(())
            }
            SpecialCommand::List => self.list(),
            SpecialCommand::New => self.new_session().await,
            SpecialCommand::Open(index) => self.open(index).await,
            SpecialCommand::Rename { index, name } => self.rename(index, &name).await,
            SpecialCommand::Delete(index) => self.delete(index, reader),
            SpecialCommand::Ingest(path) => self.ingest(&path).await,
            SpecialCommand::Zip => self.zip(),
            SpecialCommand::Load(path) => self.load(&path).await,
            SpecialCommand::Search(query) => self.search(line, &query).await,
            SpecialCommand::None => self.route(line).await,
        };

        if let Err(e) = outcome {
            report_error(&e);
        }
        LoopControl::Continue
    }

    /// Print built-in commands and loaded plugins
    pub fn show_help(&self) {
        println!("Commands to use:");
        for line in builtin_help() {
            ui::command(line);
        }
        ui::info("PLUGINS:");
        for plugin in self.registry.list() {
            ui::plugin(&format!(
                "'{} {}' {}",
                plugin.command,
                plugin.parameter_string(),
                plugin.description
            ));
        }
    }

    fn list(&mut self) -> Result<()> {
        let sessions = self.manager.list()?;
        ui::info("Available conversations:");
        if sessions.is_empty() {
            ui::note("No conversations found.");
        }
        for summary in &sessions {
            let marker = if summary.id == self.context.id() {
                " (active)"
            } else {
                ""
            };
            ui::info(&format!("[{}] {}{}", summary.index, summary.id, marker));
        }
        ui::info("To open conversation type: /open <NUMBER>");
        Ok(())
    }

    /// Take a listing first if none was shown yet
    fn ensure_snapshot(&mut self) -> Result<()> {
        if self.manager.store().snapshot().is_empty() {
            self.manager.list()?;
        }
        Ok(())
    }

    async fn new_session(&mut self) -> Result<()> {
        ui::boot("Starting a new conversation...");
        self.context = self.manager.new_session().await?;
        show_notes(&self.context);
        if let Some(report) = &self.context.startup_ingest {
            show_ingest_report(report);
        }
        ui::success(&format!("New conversation started: {}", self.context.id()));
        Ok(())
    }

    async fn open(&mut self, index: usize) -> Result<()> {
        self.ensure_snapshot()?;
        let id = self.manager.store().resolve(index)?.id.clone();
        ui::boot(&format!("Opening conversation: {}", id));
        self.context = self.manager.open_session(index).await?;
        show_notes(&self.context);
        ui::success(&format!(
            "Successfully loaded conversation from '{}' ({} turns).",
            id,
            self.context.history.len()
        ));
        Ok(())
    }

    async fn rename(&mut self, index: usize, name: &str) -> Result<()> {
        self.ensure_snapshot()?;
        let old = self.manager.store().resolve(index)?.id.clone();
        let renamed = self
            .manager
            .rename(index, name, Some(&mut self.context))
            .await?;
        ui::info(&format!(
            "Chat '{}' successfully renamed to '{}'.",
            old, renamed.id
        ));
        Ok(())
    }

    fn delete(&mut self, index: usize, reader: &mut dyn LineReader) -> Result<()> {
        self.ensure_snapshot()?;
        let active = self.context.id().to_string();
        let deleted = self.manager.delete(index, Some(&active), |summary| {
            ui::note(&format!(
                "Are you sure you want to permanently delete '{}' and all its contents? (y/n)",
                summary.id
            ));
            match reader.read_line("") {
                Ok(Some(answer)) => answer.trim().eq_ignore_ascii_case("y"),
                _ => false,
            }
        })?;
        match deleted {
            Some(summary) => {
                ui::success(&format!(
                    "Conversation '{}' successfully deleted.",
                    summary.id
                ));
                // numbering changed
                self.manager.list()?;
            }
            None => ui::info("Deletion cancelled."),
        }
        Ok(())
    }

    async fn ingest(&mut self, path: &str) -> Result<()> {
        ui::info(&format!("Ingesting documents from: {}", path));
        let report = self.context.ingest(Path::new(path)).await?;
        show_ingest_report(&report);
        Ok(())
    }

    fn zip(&self) -> Result<()> {
        ui::info("Zipping memory folder contents...");
        let archive = self.backups.zip(&self.context.session)?;
        ui::info(&format!(
            "Conversation successfully zipped to {}.",
            archive.display()
        ));
        Ok(())
    }

    async fn load(&mut self, path: &str) -> Result<()> {
        let restored = self.backups.restore(Path::new(path))?;
        if restored.replaced {
            ui::note(&format!("Replaced existing conversation '{}'.", restored.id));
        }
        ui::success(&format!("Backup restored as conversation '{}'.", restored.id));
        if restored.id == self.context.id() {
            self.context = self.manager.open_by_id(&restored.id).await?;
        }
        self.manager.list()?;
        Ok(())
    }

    async fn search(&mut self, line: &str, query: &str) -> Result<()> {
        ui::info(&format!("Searching the web for: '{}'...", query));
        let reply = self
            .context
            .web_search(self.manager.store(), line, query)
            .await?;
        ui::aeon(&reply.answer);
        if !reply.sources.is_empty() {
            ui::source(&reply.sources.join(", "));
        }
        Ok(())
    }

    async fn route(&mut self, line: &str) -> Result<()> {
        let (token, rest) = split_leading_token(line);
        if let Some(descriptor) = self.registry.get(token) {
            let result = self
                .context
                .run_plugin(self.manager.store(), &self.invoker, &descriptor, line, rest)
                .await?;
            ui::aeon(&result.message);
            ui::source(&result.source);
            return Ok(());
        }

        ui::think("Thinking...");
        let reply = self.context.chat(self.manager.store(), line).await?;
        ui::aeon(&reply.answer);
        if !reply.sources.is_empty() {
            ui::source(&reply.sources.join(", "));
        }
        Ok(())
    }
}

fn report_error(error: &anyhow::Error) {
    match as_aeon_error(error) {
        Some(AeonError::NotFound(_)) => {
            ui::error(&error.to_string());
            ui::info("Use /list to see available conversations.");
        }
        Some(AeonError::ActiveSession(_)) => {
            ui::error("Cannot delete the current active conversation.");
        }
        Some(AeonError::Usage { .. }) => ui::error(&error.to_string()),
        _ => {
            tracing::debug!("Command failed: {:?}", error);
            ui::error(&error.to_string());
        }
    }
}

fn show_notes(context: &SessionContext) {
    for note in &context.notes {
        ui::note(note);
    }
}

fn show_ingest_report(report: &IngestReport) {
    if report.failed > 0 {
        for error in &report.errors {
            ui::warning(error);
        }
    }
    ui::success(&report.summary());
    if let Some(size) = report.vector_size {
        ui::info(&format!("Verified embedding vector size: {}", size));
    }
}
