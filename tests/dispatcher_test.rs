//! Integration tests for the interactive command loop
//!
//! Drives the dispatcher with scripted input and inspects the sessions and
//! history it leaves behind.

mod common;

use aeon::backup::BackupManager;
use aeon::commands::chat::supervise;
use aeon::commands::{CommandDispatcher, LoopControl, ScriptedReader};
use aeon::config::Config;
use aeon::plugins::{PluginInvoker, PluginRegistry};
use aeon::session::SessionManager;
use aeon::storage::ConversationStore;
use common::{test_config, write_plugin, TestFactory};
use std::sync::Arc;
use tempfile::TempDir;

async fn dispatcher(config: Config) -> CommandDispatcher {
    let store = ConversationStore::new(&config.paths.memory_dir).unwrap();
    let backups = BackupManager::new(&config.paths.memory_dir, config.paths.backup_dir());
    let registry = PluginRegistry::load(&config.paths.plugins_dir, None);
    let invoker = PluginInvoker::from_config(&config.plugins);
    let mut manager = SessionManager::new(store, config, Arc::new(TestFactory::new("hi there")));
    let context = manager.new_session().await.unwrap();
    CommandDispatcher::new(manager, registry, invoker, backups, context)
}

fn index_of(dispatcher: &CommandDispatcher, id: &str) -> usize {
    dispatcher
        .manager()
        .store()
        .snapshot()
        .iter()
        .find(|s| s.id == id)
        .map(|s| s.index)
        .unwrap()
}

#[tokio::test]
async fn test_chat_then_exit_stops_reading() {
    let dir = TempDir::new().unwrap();
    let mut dispatcher = dispatcher(test_config(&dir)).await;
    let mut reader = ScriptedReader::new(["hello", "   ", "/quit", "never read"]);

    let control = dispatcher.run(&mut reader).await.unwrap();
    assert_eq!(control, LoopControl::Exit);
    assert_eq!(reader.remaining(), 1);
    assert_eq!(dispatcher.context().history.len(), 1);
    assert_eq!(dispatcher.context().history[0].aeon, "hi there");
    assert!(reader.prompts()[0].contains(dispatcher.context().id()));
}

#[tokio::test]
async fn test_end_of_input_exits_and_restart_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut dispatcher = dispatcher(test_config(&dir)).await;

    let mut reader = ScriptedReader::new(Vec::<String>::new());
    assert_eq!(
        dispatcher.run(&mut reader).await.unwrap(),
        LoopControl::Exit
    );

    let mut reader = ScriptedReader::new(["/restart"]);
    assert_eq!(
        dispatcher.run(&mut reader).await.unwrap(),
        LoopControl::Restart
    );
}

#[tokio::test]
async fn test_new_then_open_switches_sessions() {
    let dir = TempDir::new().unwrap();
    let mut dispatcher = dispatcher(test_config(&dir)).await;
    let first = dispatcher.context().id().to_string();
    let mut reader = ScriptedReader::default();

    dispatcher.handle_line("/new", &mut reader).await;
    let second = dispatcher.context().id().to_string();
    assert_ne!(first, second);

    dispatcher.handle_line("/list", &mut reader).await;
    let index = index_of(&dispatcher, &first);
    dispatcher
        .handle_line(&format!("/open {}", index), &mut reader)
        .await;
    assert_eq!(dispatcher.context().id(), first);

    // out of range leaves the active session alone
    dispatcher.handle_line("/open 99", &mut reader).await;
    assert_eq!(dispatcher.context().id(), first);
}

#[tokio::test]
async fn test_delete_needs_confirmation_and_spares_active() {
    let dir = TempDir::new().unwrap();
    let mut dispatcher = dispatcher(test_config(&dir)).await;
    let old = dispatcher.context().session.clone();
    let mut reader = ScriptedReader::default();
    dispatcher.handle_line("/new", &mut reader).await;
    let active = dispatcher.context().session.clone();
    dispatcher.handle_line("/list", &mut reader).await;

    let active_index = index_of(&dispatcher, &active.id);
    dispatcher
        .handle_line(&format!("/delete {}", active_index), &mut reader)
        .await;
    assert!(active.memory_path.exists());

    let old_index = index_of(&dispatcher, &old.id);
    let mut reader = ScriptedReader::new(["n"]);
    dispatcher
        .handle_line(&format!("/delete {}", old_index), &mut reader)
        .await;
    assert!(old.memory_path.exists());

    let mut reader = ScriptedReader::new(["y"]);
    dispatcher
        .handle_line(&format!("/delete {}", old_index), &mut reader)
        .await;
    assert!(!old.memory_path.exists());
    assert_eq!(dispatcher.manager().store().snapshot().len(), 1);
}

#[tokio::test]
async fn test_rename_active_keeps_history() {
    let dir = TempDir::new().unwrap();
    let mut dispatcher = dispatcher(test_config(&dir)).await;
    let mut reader = ScriptedReader::default();
    dispatcher.handle_line("how are you", &mut reader).await;
    dispatcher.handle_line("/rename 1 morning_chat", &mut reader).await;

    assert_eq!(dispatcher.context().id(), "morning_chat");
    assert_eq!(dispatcher.context().history.len(), 1);

    // missing argument is reported, nothing changes
    dispatcher.handle_line("/rename", &mut reader).await;
    assert_eq!(dispatcher.context().id(), "morning_chat");
}

#[tokio::test]
async fn test_zip_writes_archive_and_ingest_reports() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let backup_dir = config.paths.backup_dir();
    let mut dispatcher = dispatcher(config).await;
    let mut reader = ScriptedReader::default();

    dispatcher.handle_line("first turn", &mut reader).await;
    dispatcher.handle_line("/zip", &mut reader).await;
    let archives = std::fs::read_dir(&backup_dir).unwrap().count();
    assert_eq!(archives, 1);

    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("a.txt"), "alpha document").unwrap();
    std::fs::write(docs.join("b.md"), "beta document").unwrap();
    let before = dispatcher.context().binding.vector_store.len();
    dispatcher
        .handle_line(&format!("/ingest {}", docs.display()), &mut reader)
        .await;
    assert_eq!(dispatcher.context().binding.vector_store.len(), before + 2);
}

#[tokio::test]
async fn test_plugin_command_routes_to_plugin() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_plugin(
        &config.paths.plugins_dir,
        "greeter",
        "aeon_plugin:\n  command: /greet\n  builtin: hello\n  parameters: prompt\n",
    );
    let mut dispatcher = dispatcher(config).await;
    let mut reader = ScriptedReader::default();

    let control = dispatcher.handle_line("/GREET good evening", &mut reader).await;
    assert_eq!(control, LoopControl::Continue);
    let turn = dispatcher.context().history.last().unwrap();
    assert_eq!(turn.aeon, "Hello, you said: good evening");
    assert_eq!(turn.sources, vec!["Plugin: greeter".to_string()]);
}

#[tokio::test]
async fn test_reload_picks_up_new_plugins() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let mut dispatcher = dispatcher(config.clone()).await;
    let id = dispatcher.context().id().to_string();
    assert!(dispatcher.registry().is_empty());

    write_plugin(
        &config.paths.plugins_dir,
        "greeter",
        "aeon_plugin:\n  command: /greet\n  builtin: hello\n",
    );
    dispatcher.reload(config).await.unwrap();
    assert_eq!(dispatcher.registry().len(), 1);
    assert_eq!(dispatcher.context().id(), id);
}

#[tokio::test]
async fn test_failed_restart_keeps_the_loop_running() {
    let dir = TempDir::new().unwrap();
    let mut dispatcher = dispatcher(test_config(&dir)).await;
    let mut reader = ScriptedReader::new(["/restart", "hello", "/quit"]);

    supervise(&mut dispatcher, &mut reader, || {
        Err(anyhow::anyhow!("malformed config.yml"))
    })
    .await
    .unwrap();

    assert_eq!(reader.remaining(), 0);
    assert_eq!(dispatcher.context().history.len(), 1);
    assert_eq!(dispatcher.context().history[0].user, "hello");
}

#[tokio::test]
async fn test_invalid_reloaded_config_keeps_previous_plugins() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_plugin(
        &config.paths.plugins_dir,
        "greeter",
        "aeon_plugin:\n  command: /greet\n  builtin: hello\n",
    );
    let mut dispatcher = dispatcher(config.clone()).await;
    let id = dispatcher.context().id().to_string();

    let mut broken = config.clone();
    broken.llm.model = String::new();
    broken.paths.plugins_dir = dir.path().join("no-plugins-here");
    let mut reader = ScriptedReader::new(["/restart", "/greet again", "/quit"]);
    supervise(&mut dispatcher, &mut reader, || Ok(broken.clone()))
        .await
        .unwrap();

    assert_eq!(dispatcher.registry().len(), 1);
    assert_eq!(dispatcher.context().id(), id);
    assert_eq!(
        dispatcher.context().history.last().unwrap().aeon,
        "Hello, you said: again"
    );
}
