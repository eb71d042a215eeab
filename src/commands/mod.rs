/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `chat`: startup session selection and the interactive loop
- `sessions`: table of stored conversations
- `plugins`: table of discovered plugins

The loop itself lives in [`dispatcher`]; built-in command parsing lives in
[`special_commands`].
*/

pub mod dispatcher;
pub mod input;
pub mod plugins;
pub mod sessions;
pub mod special_commands;

pub use dispatcher::{CommandDispatcher, LoopControl};
pub use input::{LineReader, RustylineReader, ScriptedReader};

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Shows the startup prompt, binds the chosen session and runs the
    //! dispatcher. A restart request reloads the configuration and plugins
    //! and continues with the same session.

    use super::*;
    use crate::backup::BackupManager;
    use crate::config::Config;
    use crate::error::{AeonError, Result};
    use crate::plugins::{PluginInvoker, PluginRegistry};
    use crate::rag::{DefaultRagFactory, RagFactory};
    use crate::session::{SessionContext, SessionManager};
    use crate::storage::ConversationStore;
    use crate::ui;
    use colored::Colorize;
    use std::path::Path;
    use std::sync::Arc;

    /// A parsed answer to the startup prompt
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StartupChoice {
        /// Start a new conversation
        New,
        /// Open the conversation with this listing number
        Open(usize),
        /// Restore an archive, then ask again
        Load(String),
        /// Anything else
        Invalid(String),
    }

    /// Interpret the startup answer given `count` listed conversations
    ///
    /// An empty answer and `count + 1` both start a new conversation.
    pub fn parse_startup_choice(input: &str, count: usize) -> StartupChoice {
        let input = input.trim();
        if input.is_empty() {
            return StartupChoice::New;
        }
        let (token, rest) = special_commands::split_leading_token(input);
        if token.eq_ignore_ascii_case("/load") {
            return if rest.is_empty() {
                StartupChoice::Invalid(input.to_string())
            } else {
                StartupChoice::Load(rest.to_string())
            };
        }
        match input.parse::<usize>() {
            Ok(n) if (1..=count).contains(&n) => StartupChoice::Open(n),
            Ok(n) if n == count + 1 => StartupChoice::New,
            _ => StartupChoice::Invalid(input.to_string()),
        }
    }

    /// Ask which session to start with and bind it
    ///
    /// Returns `Ok(None)` if the input is closed before a choice is made.
    ///
    /// # Errors
    ///
    /// An invalid choice is an error; the caller exits non-zero.
    pub async fn select_session(
        manager: &mut SessionManager,
        backups: &BackupManager,
        reader: &mut dyn LineReader,
    ) -> Result<Option<SessionContext>> {
        loop {
            ui::info("Welcome to AEON.");
            ui::info("Please choose an option:");
            let sessions = manager.list()?;
            if sessions.is_empty() {
                ui::note("No previous conversations found.");
                ui::command("[1] Start a new conversation or press <ENTER>.");
            } else {
                ui::info("Existing conversations:");
                for summary in &sessions {
                    ui::chat(&format!("[{}] {}", summary.index, summary.id));
                }
                ui::command(&format!("[{}] New conversation.", sessions.len() + 1));
                ui::note("To rename a conversation, type: /rename <NUMBER> <NEW_NAME>");
            }
            ui::note("To open a backup file, type: /load <PATH_TO_ZIP>");

            let prompt = format!("{} ", "[OPTN]:".bright_green());
            let answer = match reader.read_line(&prompt)? {
                Some(answer) => answer,
                None => return Ok(None),
            };

            let trimmed = answer.trim();
            if special_commands::split_leading_token(trimmed)
                .0
                .eq_ignore_ascii_case("/rename")
            {
                match special_commands::parse_special_command(trimmed) {
                    Ok(special_commands::SpecialCommand::Rename { index, name }) => {
                        match manager.rename(index, &name, None).await {
                            Ok(renamed) => ui::info(&format!("Renamed to '{}'.", renamed.id)),
                            Err(e) => ui::error(&e.to_string()),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => ui::error(&e.to_string()),
                }
                continue;
            }

            match parse_startup_choice(trimmed, sessions.len()) {
                StartupChoice::New => {
                    ui::boot("Starting a new conversation...");
                    let context = manager.new_session().await?;
                    ui::success(&format!("New conversation started: {}", context.id()));
                    return Ok(Some(context));
                }
                StartupChoice::Open(index) => {
                    ui::boot(&format!("Opening conversation: {}", sessions[index - 1].id));
                    let context = manager.open_session(index).await?;
                    ui::success(&format!(
                        "Successfully loaded conversation from '{}'.",
                        context.id()
                    ));
                    return Ok(Some(context));
                }
                StartupChoice::Load(path) => {
                    match backups.restore(Path::new(&path)) {
                        Ok(restored) => {
                            ui::success(&format!("Backup restored as '{}'.", restored.id))
                        }
                        Err(e) => {
                            ui::error(&e.to_string());
                            ui::error("Unzipping failed. Please try again.");
                        }
                    }
                    continue;
                }
                StartupChoice::Invalid(input) => {
                    if input.parse::<usize>().is_ok() {
                        ui::error("Invalid choice. Exiting.");
                    } else {
                        ui::error("Invalid input. Please enter a number.");
                    }
                    return Err(AeonError::NotFound(format!("startup choice '{}'", input)).into());
                }
            }
        }
    }

    /// Drive the dispatcher, reloading on restart requests
    ///
    /// `reload` produces the configuration used after `/restart`. A failed
    /// restart is reported and the loop goes on with the previous state.
    pub async fn supervise<F>(
        dispatcher: &mut CommandDispatcher,
        reader: &mut dyn LineReader,
        mut reload: F,
    ) -> Result<()>
    where
        F: FnMut() -> Result<Config>,
    {
        loop {
            match dispatcher.run(reader).await? {
                LoopControl::Restart => {
                    let outcome = match reload().and_then(|config| {
                        config.validate()?;
                        Ok(config)
                    }) {
                        Ok(config) => dispatcher.reload(config).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = outcome {
                        tracing::warn!("Restart failed: {:#}", e);
                        ui::error(&format!("Restart failed: {:#}", e));
                        ui::note("Continuing with the previous configuration.");
                    }
                }
                LoopControl::Exit | LoopControl::Continue => return Ok(()),
            }
        }
    }

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `reload` - Re-reads the configuration on `/restart`
    pub async fn run_chat<F>(config: Config, reload: F) -> Result<()>
    where
        F: FnMut() -> Result<Config>,
    {
        let mut reader = RustylineReader::new()?;
        run_chat_with(config, Arc::new(DefaultRagFactory), &mut reader, reload).await
    }

    /// [`run_chat`] over any collaborator factory and input source
    pub async fn run_chat_with<F>(
        config: Config,
        factory: Arc<dyn RagFactory>,
        reader: &mut dyn LineReader,
        reload: F,
    ) -> Result<()>
    where
        F: FnMut() -> Result<Config>,
    {
        let store = ConversationStore::new(&config.paths.memory_dir)?;
        let backups = BackupManager::new(&config.paths.memory_dir, config.paths.backup_dir());
        let registry =
            PluginRegistry::load(&config.paths.plugins_dir, config.plugins.load.as_deref());
        for warning in registry.warnings() {
            ui::warning(warning);
        }
        let invoker = PluginInvoker::from_config(&config.plugins);
        let mut manager = SessionManager::new(store, config, factory);

        let context = match select_session(&mut manager, &backups, reader).await? {
            Some(context) => context,
            None => return Ok(()),
        };
        for note in &context.notes {
            ui::note(note);
        }

        let mut dispatcher = CommandDispatcher::new(manager, registry, invoker, backups, context);
        dispatcher.show_help();
        supervise(&mut dispatcher, reader, reload).await?;

        println!("Goodbye!");
        Ok(())
    }

}
