//! Integration tests for the session lifecycle
//!
//! Covers creating, chatting in, re-opening, renaming and deleting sessions
//! through the session manager, with offline collaborators.

mod common;

use aeon::error::{as_aeon_error, AeonError};
use aeon::session::{SessionManager, NO_SEARCH_RESULTS};
use aeon::storage::ConversationStore;
use common::{test_config, TestFactory};
use std::sync::Arc;
use tempfile::TempDir;

fn manager_with(dir: &TempDir, factory: TestFactory) -> SessionManager {
    let config = test_config(dir);
    let store = ConversationStore::new(&config.paths.memory_dir).expect("store");
    SessionManager::new(store, config, Arc::new(factory))
}

#[tokio::test]
async fn test_chat_turns_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let mut manager = manager_with(&dir, TestFactory::new("Paris."));

    let mut context = manager.new_session().await.unwrap();
    let reply = context
        .chat(manager.store(), "What is the capital of France?")
        .await
        .unwrap();
    assert_eq!(reply.answer, "Paris.");
    let id = context.id().to_string();
    drop(context);

    let reopened = manager.open_by_id(&id).await.unwrap();
    assert_eq!(reopened.history.len(), 1);
    assert_eq!(reopened.history[0].user, "What is the capital of France?");
    assert_eq!(reopened.history[0].aeon, "Paris.");
    assert!(reopened.session.config_path().is_file());
}

#[tokio::test]
async fn test_input_directory_is_ingested_on_start() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("input/nested")).unwrap();
    std::fs::write(dir.path().join("input/a.md"), "# Tides\nThe moon drives tides.").unwrap();
    std::fs::write(
        dir.path().join("input/nested/b.json"),
        r#"{"topic": "orbits", "facts": ["elliptic", "periodic"]}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("input/skip.bin"), "ignored").unwrap();

    let mut manager = manager_with(&dir, TestFactory::new("ok"));
    let context = manager.new_session().await.unwrap();
    let report = context.startup_ingest.clone().unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.succeeded, 2);
    assert_eq!(context.binding.vector_store.len(), 2);

    // re-opening ingests the same files without duplicating chunks
    let id = context.id().to_string();
    drop(context);
    let reopened = manager.open_by_id(&id).await.unwrap();
    assert_eq!(reopened.binding.vector_store.len(), 2);
}

#[tokio::test]
async fn test_rename_active_session_rebinds() {
    let dir = TempDir::new().unwrap();
    let mut manager = manager_with(&dir, TestFactory::new("hello"));

    let mut context = manager.new_session().await.unwrap();
    context.chat(manager.store(), "hi").await.unwrap();
    manager.list().unwrap();

    let renamed = manager
        .rename(1, "travel_notes", Some(&mut context))
        .await
        .unwrap();
    assert_eq!(renamed.id, "travel_notes");
    assert_eq!(context.id(), "travel_notes");
    assert_eq!(context.history.len(), 1);
    assert!(context.session.history_file.ends_with("travel_notes.json"));
}

#[tokio::test]
async fn test_rename_to_existing_name_conflicts() {
    let dir = TempDir::new().unwrap();
    let mut manager = manager_with(&dir, TestFactory::new("hello"));
    manager.new_session().await.unwrap();
    manager.store_mut().create_with(|| "2024-01-01T00:00:00".to_string()).unwrap();
    let sessions = manager.list().unwrap();
    assert_eq!(sessions.len(), 2);

    let err = manager
        .rename(1, &sessions[1].id, None)
        .await
        .unwrap_err();
    assert!(matches!(as_aeon_error(&err), Some(AeonError::Conflict(_))));
}

#[tokio::test]
async fn test_delete_refuses_active_session() {
    let dir = TempDir::new().unwrap();
    let mut manager = manager_with(&dir, TestFactory::new("hello"));
    let active = manager.new_session().await.unwrap();
    let other = manager.new_session().await.unwrap();
    let sessions = manager.list().unwrap();

    let active_index = sessions
        .iter()
        .find(|s| s.id == active.id())
        .map(|s| s.index)
        .unwrap();
    let other_index = sessions
        .iter()
        .find(|s| s.id == other.id())
        .map(|s| s.index)
        .unwrap();

    let err = manager
        .delete(active_index, Some(active.id()), |_| true)
        .unwrap_err();
    assert!(matches!(
        as_aeon_error(&err),
        Some(AeonError::ActiveSession(_))
    ));

    let declined = manager
        .delete(other_index, Some(active.id()), |_| false)
        .unwrap();
    assert!(declined.is_none());
    assert!(other.session.memory_path.exists());

    let deleted = manager
        .delete(other_index, Some(active.id()), |_| true)
        .unwrap();
    assert_eq!(deleted.unwrap().id, other.id());
    assert!(!other.session.memory_path.exists());
}

#[tokio::test]
async fn test_web_search_summarises_and_records_source() {
    let dir = TempDir::new().unwrap();
    let factory = TestFactory::with_hits(
        "Rust is a systems language.",
        &["Rust is fast.", "Rust is memory safe.", "Rust has cargo."],
    );
    let llm = factory.llm.clone();
    let mut manager = manager_with(&dir, factory);

    let mut context = manager.new_session().await.unwrap();
    let before = context.binding.vector_store.len();
    let reply = context
        .web_search(manager.store(), "/search rust language", "rust language")
        .await
        .unwrap();

    assert_eq!(reply.answer, "Rust is a systems language.");
    assert_eq!(reply.sources, vec!["web_search: 3 results".to_string()]);
    assert!(context.binding.vector_store.len() > before);
    assert!(llm
        .prompts()
        .iter()
        .any(|p| p.contains("Summarize the contents about rust language")));

    let history = manager.store().load_history(&context.session).unwrap();
    assert_eq!(history.turns.last().unwrap().user, "/search rust language");
    assert_eq!(
        history.turns.last().unwrap().sources,
        vec!["web_search: 3 results".to_string()]
    );
}

#[tokio::test]
async fn test_web_search_without_hits() {
    let dir = TempDir::new().unwrap();
    let mut manager = manager_with(&dir, TestFactory::new("unused"));
    let mut context = manager.new_session().await.unwrap();
    let reply = context
        .web_search(manager.store(), "/search nothing", "nothing")
        .await
        .unwrap();
    assert_eq!(reply.answer, NO_SEARCH_RESULTS);
    assert!(reply.sources.is_empty());
}

#[tokio::test]
async fn test_persisted_turns_join_the_index() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.retrieval.persist_turns = true;
    let store = ConversationStore::new(&config.paths.memory_dir).unwrap();
    let mut manager = SessionManager::new(store, config, Arc::new(TestFactory::new("sure")));

    let mut context = manager.new_session().await.unwrap();
    assert_eq!(context.binding.vector_store.len(), 0);
    context.chat(manager.store(), "remember the lighthouse").await.unwrap();
    assert_eq!(context.binding.vector_store.len(), 1);
}
