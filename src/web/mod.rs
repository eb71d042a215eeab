//! HTTP variant
//!
//! Serves the same session, plugin and backup operations as the interactive
//! loop over JSON. Each bound session lives behind its own mutex in the
//! router state, so requests for one session run one at a time while other
//! sessions proceed. The map of bindings is only locked to look up a slot;
//! binding a session happens outside it.

pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::build_router;

use crate::backup::BackupManager;
use crate::config::Config;
use crate::error::Result;
use crate::plugins::{PluginInvoker, PluginRegistry};
use crate::rag::RagFactory;
use crate::session::{SessionContext, SessionManager};
use crate::storage::ConversationStore;
use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard};

/// A bound session shared between requests
pub type SharedContext = Arc<Mutex<SessionContext>>;

/// Filled once the session has been bound
type Slot = Arc<OnceCell<SharedContext>>;

/// Router state
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle; locked for listing, creating, renaming and deleting
    pub manager: Arc<Mutex<SessionManager>>,
    /// Read and append access to history files
    pub store: Arc<ConversationStore>,
    /// Plugins loaded at startup
    pub registry: Arc<PluginRegistry>,
    /// Shared executable-unit cache
    pub invoker: Arc<PluginInvoker>,
    /// Archive and restore
    pub backups: Arc<BackupManager>,
    contexts: Arc<Mutex<HashMap<String, Slot>>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .field("plugins", &self.registry.len())
            .finish()
    }
}

impl AppState {
    /// Build the state for `config`
    pub fn new(config: Config, factory: Arc<dyn RagFactory>) -> Result<Self> {
        let store = ConversationStore::new(&config.paths.memory_dir)?;
        let turns = ConversationStore::new(&config.paths.memory_dir)?;
        let backups = BackupManager::new(&config.paths.memory_dir, config.paths.backup_dir());
        let registry =
            PluginRegistry::load(&config.paths.plugins_dir, config.plugins.load.as_deref());
        for warning in registry.warnings() {
            tracing::warn!("{}", warning);
        }
        let invoker = PluginInvoker::from_config(&config.plugins);

        Ok(Self {
            manager: Arc::new(Mutex::new(SessionManager::new(store, config, factory))),
            store: Arc::new(turns),
            registry: Arc::new(registry),
            invoker: Arc::new(invoker),
            backups: Arc::new(backups),
            contexts: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The context bound to `id`, binding it on first use
    ///
    /// Concurrent first requests for one id share a single bind.
    pub async fn context(&self, id: &str) -> Result<SharedContext> {
        let slot = self
            .contexts
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone();

        let bound = slot
            .get_or_try_init(|| async {
                let binder = self.binder().await;
                let context = binder.open_by_id(id).await?;
                Ok::<_, anyhow::Error>(Arc::new(Mutex::new(context)))
            })
            .await;

        match bound {
            Ok(context) => Ok(context.clone()),
            Err(e) => {
                let mut contexts = self.contexts.lock().await;
                let stale = contexts
                    .get(id)
                    .is_some_and(|s| Arc::ptr_eq(s, &slot) && s.get().is_none());
                if stale {
                    contexts.remove(id);
                }
                Err(e)
            }
        }
    }

    /// A copy of the session manager for work that must not hold its lock
    pub async fn binder(&self) -> SessionManager {
        self.manager.lock().await.clone()
    }

    /// Keep `context` bound under its id
    pub async fn insert(&self, context: SessionContext) -> SharedContext {
        let id = context.id().to_string();
        let context = Arc::new(Mutex::new(context));
        let slot = Arc::new(OnceCell::new_with(Some(context.clone())));
        self.contexts.lock().await.insert(id, slot);
        context
    }

    /// Drop the binding of `id`; returns whether there was one
    pub async fn forget(&self, id: &str) -> bool {
        self.contexts.lock().await.remove(id).is_some()
    }

    /// Drop the binding of `id` and wait until no request is using it
    ///
    /// Requests still holding the old context stay blocked until the
    /// returned guard is dropped.
    pub async fn detach(&self, id: &str) -> Option<OwnedMutexGuard<SessionContext>> {
        let slot = self.contexts.lock().await.remove(id)?;
        let context = slot.get()?.clone();
        Some(context.lock_owned().await)
    }

    /// Ids with a live binding
    pub async fn bound(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .contexts
            .lock()
            .await
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Serve the router on `bind` until the process stops
    pub async fn serve(self, bind: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("Failed to bind {}", bind))?;
        tracing::info!("AEON listening on http://{}", bind);
        axum::serve(listener, build_router(self)).await?;
        Ok(())
    }
}
