//! Session lifecycle
//!
//! [`SessionManager`] creates and opens sessions and binds a fresh set of
//! RAG collaborators to each one. The resulting [`SessionContext`] carries
//! everything a front-end needs to talk to that session: its directory, its
//! configuration snapshot, its collaborators and its history.

use crate::config::Config;
use crate::error::{AeonError, Result};
use crate::plugins::{PluginDescriptor, PluginInvoker, PluginResult};
use crate::rag::{
    ingest_documents, ingest_path, persist_turn, Document, IngestReport, RagBinding, RagFactory,
};
use crate::storage::{ChatTurn, ConversationSession, ConversationStore, SessionSummary};
use std::path::Path;
use std::sync::Arc;

/// Reply given when a search yields nothing
pub const NO_SEARCH_RESULTS: &str = "No relevant search results found.";

/// Reply given when search results could not be added to the index
pub const SEARCH_INGEST_FAILED: &str = "I found search results, but encountered an error \
ingesting them into my knowledge base. Please check the logs for details.";

const SUMMARY_TEMPLATE: &str = "{system}
Your responses should be in plain, natural language ONLY, without special formatting or prefixes. \
Summarize the provided CONTEXT concisely and clearly. Focus on extracting the most relevant \
information related to the QUESTION. Do NOT introduce outside knowledge. Provide ONLY the summary.

CONTEXT:
{context}

QUESTION:
Summarize the contents about {query}

RESPONSE:";

/// An assistant answer and its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Text shown to the user
    pub answer: String,
    /// Provenance labels recorded with the turn
    pub sources: Vec<String>,
}

/// A bound, active session
pub struct SessionContext {
    /// The session on disk
    pub session: ConversationSession,
    /// The session's configuration snapshot
    pub config: Config,
    /// Collaborators bound to the session's index
    pub binding: RagBinding,
    /// Turns recorded so far
    pub history: Vec<ChatTurn>,
    /// Non-fatal notes collected while opening
    pub notes: Vec<String>,
    /// Result of ingesting the input directory, if it ran
    pub startup_ingest: Option<IngestReport>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.session.id)
            .field("turns", &self.history.len())
            .field("binding", &self.binding)
            .finish()
    }
}

impl SessionContext {
    /// Session id
    pub fn id(&self) -> &str {
        &self.session.id
    }

    /// Record a turn in the history file and, if enabled, the index
    ///
    /// Returns a note when the existing history file was unreadable.
    pub async fn record_turn(
        &mut self,
        store: &ConversationStore,
        turn: ChatTurn,
    ) -> Result<Option<String>> {
        let warning = store.append_turn(&self.session, turn.clone())?;
        if self.config.retrieval.persist_turns {
            if let Err(e) =
                persist_turn(self.binding.vector_store.as_ref(), &turn.user, &turn.aeon).await
            {
                tracing::warn!(session = %self.session.id, "Failed to index turn: {}", e);
            }
        }
        self.history.push(turn);
        Ok(warning)
    }

    /// Answer `question` from the session's index and record the turn
    pub async fn chat(&mut self, store: &ConversationStore, question: &str) -> Result<Reply> {
        let answer = self.binding.chain.invoke(question).await?;
        let reply = Reply {
            sources: answer.source_labels(),
            answer: answer.answer,
        };
        self.record_turn(
            store,
            ChatTurn::new(question, reply.answer.clone()).with_sources(reply.sources.clone()),
        )
        .await?;
        Ok(reply)
    }

    /// Ingest a file or directory into the session's index
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        ingest_path(
            path,
            self.binding.vector_store.as_ref(),
            self.binding.splitter.as_ref(),
            self.binding.embeddings.as_ref(),
        )
        .await
    }

    /// Search the web, index the top results and summarise them
    ///
    /// `line` is what the user typed and is recorded as the turn's prompt.
    pub async fn web_search(
        &mut self,
        store: &ConversationStore,
        line: &str,
        query: &str,
    ) -> Result<Reply> {
        let search = &self.config.search;
        let hits = self
            .binding
            .search
            .search(query, search.max_results)
            .await?;

        let reply = if hits.is_empty() {
            Reply {
                answer: NO_SEARCH_RESULTS.to_string(),
                sources: Vec::new(),
            }
        } else {
            let context = hits
                .iter()
                .take(search.context_results)
                .map(|hit| hit.body.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let report = ingest_documents(
                &[Document::new(context.clone(), "web_search")],
                self.binding.vector_store.as_ref(),
                self.binding.splitter.as_ref(),
                self.binding.embeddings.as_ref(),
            )
            .await;
            tracing::info!(
                session = %self.session.id,
                hits = hits.len(),
                "{}",
                report.summary()
            );

            if report.total > 0 && report.succeeded == 0 {
                Reply {
                    answer: SEARCH_INGEST_FAILED.to_string(),
                    sources: Vec::new(),
                }
            } else {
                let prompt = SUMMARY_TEMPLATE
                    .replace("{system}", &self.config.llm.system_prompt)
                    .replace("{context}", &context)
                    .replace("{query}", query);
                Reply {
                    answer: self.binding.llm.generate(&prompt).await?,
                    sources: vec![format!("web_search: {} results", hits.len())],
                }
            }
        };

        self.record_turn(
            store,
            ChatTurn::new(line, reply.answer.clone()).with_sources(reply.sources.clone()),
        )
        .await?;
        Ok(reply)
    }

    /// Run a plugin and record its answer
    pub async fn run_plugin(
        &mut self,
        store: &ConversationStore,
        invoker: &PluginInvoker,
        descriptor: &PluginDescriptor,
        line: &str,
        raw_args: &str,
    ) -> Result<PluginResult> {
        let result = invoker
            .invoke(descriptor, raw_args, &self.session, &self.binding)
            .await?;
        self.record_turn(
            store,
            ChatTurn::new(line, result.message.clone()).with_sources(vec![result.source.clone()]),
        )
        .await?;
        Ok(result)
    }
}

/// Creates, opens and re-binds sessions
#[derive(Clone)]
pub struct SessionManager {
    store: ConversationStore,
    config: Config,
    factory: Arc<dyn RagFactory>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.store)
            .finish()
    }
}

impl SessionManager {
    /// Create a manager over `store` using the global `config`
    pub fn new(store: ConversationStore, config: Config, factory: Arc<dyn RagFactory>) -> Self {
        Self {
            store,
            config,
            factory,
        }
    }

    /// The session repository
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// The session repository, mutably
    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    /// The global configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the global configuration used for new sessions
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Scan the memory root and refresh the numbered listing
    pub fn list(&mut self) -> Result<Vec<SessionSummary>> {
        Ok(self.store.list()?.to_vec())
    }

    /// Create a session, snapshot the global config and bind a fresh index
    ///
    /// Documents in the configured input directory are ingested into it.
    pub async fn new_session(&mut self) -> Result<SessionContext> {
        let session = self.store.create()?;
        let config = self.config.clone();
        config.save(session.config_path())?;
        tracing::info!(session = %session.id, "Starting a new conversation");

        self.bind(session, config, Vec::new(), Vec::new()).await
    }

    /// Open the session at `index` of the last listing
    pub async fn open_session(&mut self, index: usize) -> Result<SessionContext> {
        let id = self.store.resolve(index)?.id.clone();
        self.open_by_id(&id).await
    }

    /// Open a session by id over its existing index
    pub async fn open_by_id(&self, id: &str) -> Result<SessionContext> {
        let session = self.store.session(id)?;
        let mut notes = Vec::new();

        let config = match Config::from_file(session.config_path()) {
            Ok(config) => match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    notes.push(format!(
                        "Configuration snapshot of '{}' is invalid ({}); using the global configuration",
                        id, e
                    ));
                    self.config.clone()
                }
            },
            Err(e) => {
                if session.config_path().exists() {
                    notes.push(format!(
                        "Configuration snapshot of '{}' is unreadable ({}); using the global configuration",
                        id, e
                    ));
                }
                self.config.clone()
            }
        };

        let loaded = self.store.load_history(&session)?;
        notes.extend(loaded.warning);
        tracing::info!(session = %id, turns = loaded.turns.len(), "Opening conversation");

        self.bind(session, config, loaded.turns, notes).await
    }

    async fn bind(
        &self,
        session: ConversationSession,
        config: Config,
        history: Vec<ChatTurn>,
        mut notes: Vec<String>,
    ) -> Result<SessionContext> {
        std::fs::create_dir_all(session.db_dir())?;
        let binding = self
            .factory
            .bind(&config, &session.db_dir())
            .await
            .map_err(|e| AeonError::Rag(format!("Failed to bind '{}': {}", session.id, e)))?;

        let input_dir = config.paths.input_dir.clone();
        let startup_ingest = if input_dir.is_dir() {
            let report = ingest_path(
                &input_dir,
                binding.vector_store.as_ref(),
                binding.splitter.as_ref(),
                binding.embeddings.as_ref(),
            )
            .await?;
            tracing::info!(session = %session.id, "{}", report.summary());
            Some(report)
        } else {
            tracing::debug!(dir = %input_dir.display(), "No input directory to ingest");
            notes.push(format!(
                "Input directory '{}' not found; starting without documents",
                input_dir.display()
            ));
            None
        };

        Ok(SessionContext {
            session,
            config,
            binding,
            history,
            notes,
            startup_ingest,
        })
    }

    /// Rename the session at `index`
    ///
    /// When it is the `active` session, the context is re-bound to the
    /// renamed directory.
    pub async fn rename(
        &mut self,
        index: usize,
        new_name: &str,
        active: Option<&mut SessionContext>,
    ) -> Result<ConversationSession> {
        let old_id = self.store.resolve(index)?.id.clone();
        let renamed = self.store.rename(index, new_name)?;
        if let Some(context) = active {
            if context.session.id == old_id {
                *context = self.open_by_id(&renamed.id).await?;
            }
        }
        Ok(renamed)
    }

    /// Delete the session at `index` after `confirm` approves it
    pub fn delete<F>(
        &mut self,
        index: usize,
        active_id: Option<&str>,
        confirm: F,
    ) -> Result<Option<SessionSummary>>
    where
        F: FnOnce(&SessionSummary) -> bool,
    {
        self.store.delete(index, active_id, confirm)
    }

    /// Rebuild the context of `id` after a configuration reload
    pub async fn restart(&mut self, config: Config, id: &str) -> Result<SessionContext> {
        let previous = std::mem::replace(&mut self.config, config);
        match self.open_by_id(id).await {
            Ok(context) => Ok(context),
            Err(e) => {
                self.config = previous;
                Err(e)
            }
        }
    }
}
