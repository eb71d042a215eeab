//! Filesystem-backed conversation store
//!
//! Every session is a directory under the memory root named after its id.
//! Directories whose name starts with [`RESERVED_PREFIX`] are never listed;
//! they hold staging data such as in-flight backup restores.

use crate::error::{AeonError, Result};
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub mod types;
pub use types::{ChatTurn, ConversationSession, LoadedHistory, SessionSummary, DB_DIR, OUTPUTS_DIR};

/// Directory-name prefix excluded from listings
pub const RESERVED_PREFIX: char = '.';

/// Length of generated session ids
pub const SESSION_ID_LEN: usize = 5;

/// Fresh timestamps tried before giving up on a colliding id
pub const MAX_ID_ATTEMPTS: usize = 8;

/// Repository of conversation sessions under one memory root
///
/// Numeric references (`/open 2`, `/rename 1 notes`) resolve against the
/// snapshot taken by the most recent [`ConversationStore::list`] call, so the
/// numbers a user sees stay valid until the next listing.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    root: PathBuf,
    snapshot: Vec<SessionSummary>,
}

impl ConversationStore {
    /// Open the store, creating the memory root if needed
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create memory root {}", root.display()))?;
        Ok(Self {
            root,
            snapshot: Vec::new(),
        })
    }

    /// The memory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the memory root and replace the numbered snapshot
    pub fn list(&mut self) -> Result<&[SessionSummary]> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read memory root {}", self.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(RESERVED_PREFIX) {
                continue;
            }
            names.push(name);
        }
        names.sort();

        self.snapshot = names
            .into_iter()
            .enumerate()
            .map(|(i, id)| SessionSummary {
                index: i + 1,
                path: self.root.join(&id),
                id,
            })
            .collect();

        tracing::debug!(count = self.snapshot.len(), "Listed conversations");
        Ok(&self.snapshot)
    }

    /// The snapshot from the last listing
    pub fn snapshot(&self) -> &[SessionSummary] {
        &self.snapshot
    }

    /// Resolve a 1-based index against the last listing
    pub fn resolve(&self, index: usize) -> Result<&SessionSummary> {
        let summary = index
            .checked_sub(1)
            .and_then(|i| self.snapshot.get(i))
            .ok_or_else(|| AeonError::NotFound(format!("conversation number {}", index)))?;
        if !summary.path.is_dir() {
            return Err(AeonError::NotFound(format!(
                "conversation '{}' no longer exists",
                summary.id
            ))
            .into());
        }
        Ok(summary)
    }

    /// Open an existing session by id
    pub fn session(&self, id: &str) -> Result<ConversationSession> {
        if !is_valid_name(id) {
            return Err(AeonError::InvalidName(id.to_string()).into());
        }
        let memory_path = self.root.join(id);
        if !memory_path.is_dir() {
            return Err(AeonError::NotFound(format!("conversation '{}'", id)).into());
        }
        let history_file = locate_history_file(&memory_path, id);
        Ok(ConversationSession {
            id: id.to_string(),
            memory_path,
            history_file,
        })
    }

    /// Whether a session directory with this id exists
    pub fn exists(&self, id: &str) -> bool {
        is_valid_name(id) && self.root.join(id).is_dir()
    }

    /// Create a new session with a timestamp-derived id
    pub fn create(&mut self) -> Result<ConversationSession> {
        self.create_with(|| Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    /// Create a new session, drawing timestamps from `clock`
    ///
    /// A colliding id is retried with the next timestamp, up to
    /// [`MAX_ID_ATTEMPTS`] times.
    pub fn create_with<F>(&mut self, mut clock: F) -> Result<ConversationSession>
    where
        F: FnMut() -> String,
    {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = session_id(&clock());
            let memory_path = self.root.join(&id);
            if memory_path.exists() {
                tracing::warn!(id = %id, attempt, "Session id collision, retrying");
                continue;
            }

            fs::create_dir_all(memory_path.join(DB_DIR))
                .with_context(|| format!("Failed to create session {}", id))?;
            fs::create_dir_all(memory_path.join(OUTPUTS_DIR))
                .with_context(|| format!("Failed to create session {}", id))?;

            tracing::info!(id = %id, "Created conversation");
            return Ok(ConversationSession {
                history_file: memory_path.join(format!("{}.json", id)),
                id,
                memory_path,
            });
        }

        Err(AeonError::Collision(format!(
            "no free session id after {} attempts",
            MAX_ID_ATTEMPTS
        ))
        .into())
    }

    /// Rename the session at `index` to `new_name`
    ///
    /// The directory is renamed first, then the history file inside it.
    pub fn rename(&mut self, index: usize, new_name: &str) -> Result<ConversationSession> {
        let new_name = new_name.trim();
        if !is_valid_name(new_name) {
            return Err(AeonError::InvalidName(new_name.to_string()).into());
        }

        let current = self.resolve(index)?.clone();
        let target = self.root.join(new_name);
        if target.exists() {
            return Err(AeonError::Conflict(format!(
                "a conversation named '{}' already exists",
                new_name
            ))
            .into());
        }

        fs::rename(&current.path, &target).with_context(|| {
            format!("Failed to rename '{}' to '{}'", current.id, new_name)
        })?;

        let old_history = locate_history_file(&target, &current.id);
        let new_history = target.join(format!("{}.json", new_name));
        if old_history.exists() && old_history != new_history {
            fs::rename(&old_history, &new_history)
                .with_context(|| format!("Failed to rename history of '{}'", new_name))?;
        }

        if let Some(entry) = self.snapshot.iter_mut().find(|s| s.id == current.id) {
            entry.id = new_name.to_string();
            entry.path = target.clone();
        }

        tracing::info!(from = %current.id, to = %new_name, "Renamed conversation");
        Ok(ConversationSession {
            id: new_name.to_string(),
            memory_path: target,
            history_file: new_history,
        })
    }

    /// Delete the session at `index` after `confirm` approves it
    ///
    /// Returns `Ok(None)` when the confirmation is declined. The active
    /// session can never be deleted.
    pub fn delete<F>(
        &mut self,
        index: usize,
        active_id: Option<&str>,
        confirm: F,
    ) -> Result<Option<SessionSummary>>
    where
        F: FnOnce(&SessionSummary) -> bool,
    {
        let summary = self.resolve(index)?.clone();
        if active_id == Some(summary.id.as_str()) {
            return Err(AeonError::ActiveSession(summary.id).into());
        }
        if !confirm(&summary) {
            tracing::debug!(id = %summary.id, "Deletion declined");
            return Ok(None);
        }
        self.remove_dir(&summary.id)?;
        Ok(Some(summary))
    }

    /// Delete a session by id without a listing
    pub fn delete_by_id(&mut self, id: &str) -> Result<()> {
        let session = self.session(id)?;
        self.remove_dir(&session.id)
    }

    /// Rename a session by id without a listing
    pub fn rename_by_id(&mut self, id: &str, new_name: &str) -> Result<ConversationSession> {
        let session = self.session(id)?;
        self.snapshot = vec![SessionSummary {
            index: 1,
            id: session.id,
            path: session.memory_path,
        }];
        self.rename(1, new_name)
    }

    fn remove_dir(&mut self, id: &str) -> Result<()> {
        let path = self.root.join(id);
        fs::remove_dir_all(&path)
            .with_context(|| format!("Failed to delete conversation '{}'", id))?;
        tracing::info!(id = %id, "Deleted conversation");
        Ok(())
    }

    /// Read a session's history
    ///
    /// A missing or empty file is an empty history. A corrupt or non-list
    /// file is also empty, with a warning attached.
    pub fn load_history(&self, session: &ConversationSession) -> Result<LoadedHistory> {
        let path = &session.history_file;
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedHistory::default())
            }
            Err(e) => {
                return Err(AeonError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                ))
                .into())
            }
        };

        if contents.trim().is_empty() {
            return Ok(LoadedHistory::default());
        }

        match serde_json::from_str::<Vec<ChatTurn>>(&contents) {
            Ok(turns) => Ok(LoadedHistory {
                turns,
                warning: None,
            }),
            Err(e) => {
                let warning = format!(
                    "History file '{}' is unreadable ({}); starting with an empty history",
                    session.history_filename(),
                    e
                );
                tracing::warn!(id = %session.id, "{}", warning);
                Ok(LoadedHistory {
                    turns: Vec::new(),
                    warning: Some(warning),
                })
            }
        }
    }

    /// Append a turn and atomically rewrite the history file
    ///
    /// Returns the warning produced while reading the existing file, if any.
    pub fn append_turn(
        &self,
        session: &ConversationSession,
        turn: ChatTurn,
    ) -> Result<Option<String>> {
        let LoadedHistory { mut turns, warning } = self.load_history(session)?;
        turns.push(turn);
        write_history(&session.history_file, &turns)?;
        tracing::debug!(id = %session.id, turns = turns.len(), "Saved conversation turn");
        Ok(warning)
    }
}

/// Derive a session id from a timestamp string
pub fn session_id(timestamp: &str) -> String {
    let digest = Sha256::digest(timestamp.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..SESSION_ID_LEN].to_string()
}

/// Whether `name` can be used as a session directory name
pub fn is_valid_name(name: &str) -> bool {
    match Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$") {
        Ok(re) => re.is_match(name),
        Err(_) => false,
    }
}

/// Find the history file in a session directory
///
/// Prefers `<name>.json`, then any `*.json` file, and otherwise returns the
/// conventional path for a history that has not been written yet.
pub fn locate_history_file(dir: &Path, name: &str) -> PathBuf {
    let preferred = dir.join(format!("{}.json", name));
    if preferred.is_file() {
        return preferred;
    }

    let pattern = dir.join("*.json");
    let fallback = glob::glob(&pattern.to_string_lossy())
        .ok()
        .and_then(|paths| paths.filter_map(|p| p.ok()).find(|p| p.is_file()));

    fallback.unwrap_or(preferred)
}

fn write_history(path: &Path, turns: &[ChatTurn]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AeonError::Storage(format!("No parent for {}", path.display())))?;
    // a deleted session is never recreated by a late append
    if !parent.is_dir() {
        return Err(AeonError::NotFound(format!("conversation directory {}", parent.display())).into());
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = parent.join(format!("{}{}.tmp", RESERVED_PREFIX, file_name));

    let json = serde_json::to_string_pretty(turns)?;
    fs::write(&tmp, json)
        .map_err(|e| AeonError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| AeonError::Storage(format!("Failed to replace {}: {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ConversationStore) {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path().join("chats")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_session_id_is_short_hex() {
        let id = session_id("2026-10-14T09:30:00.123456789Z");
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, session_id("2026-10-14T09:30:00.123456789Z"));
    }

    #[test]
    fn test_create_builds_layout() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        assert!(session.db_dir().is_dir());
        assert!(session.outputs_dir().is_dir());
        assert_eq!(session.history_filename(), format!("{}.json", session.id));
        assert!(!session.history_file.exists());
    }

    #[test]
    fn test_create_retries_on_collision() {
        let (_dir, mut store) = store();
        let first = store.create_with(|| "fixed".to_string()).unwrap();

        let mut stamps = vec!["other".to_string(), "fixed".to_string()];
        let second = store.create_with(|| stamps.pop().unwrap()).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.id, session_id("other"));
    }

    #[test]
    fn test_create_fails_after_bounded_retries() {
        let (_dir, mut store) = store();
        store.create_with(|| "fixed".to_string()).unwrap();
        let err = store.create_with(|| "fixed".to_string()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AeonError>(),
            Some(AeonError::Collision(_))
        ));
    }

    #[test]
    fn test_list_skips_reserved_and_files() {
        let (_dir, mut store) = store();
        fs::create_dir_all(store.root().join("beta")).unwrap();
        fs::create_dir_all(store.root().join("alpha")).unwrap();
        fs::create_dir_all(store.root().join(".staging")).unwrap();
        fs::write(store.root().join("notes.txt"), "x").unwrap();

        let ids: Vec<_> = store.list().unwrap().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(store.resolve(2).unwrap().id, "beta");
    }

    #[test]
    fn test_resolve_out_of_range() {
        let (_dir, mut store) = store();
        fs::create_dir_all(store.root().join("alpha")).unwrap();
        store.list().unwrap();
        for index in [0, 2] {
            let err = store.resolve(index).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<AeonError>(),
                Some(AeonError::NotFound(_))
            ));
        }
    }

    #[test]
    fn test_append_and_load_history() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        store
            .append_turn(&session, ChatTurn::new("hello", "hi there"))
            .unwrap();
        store
            .append_turn(
                &session,
                ChatTurn::new("/hello bob", "Hello, bob!").with_sources(vec!["Plugin: hello".into()]),
            )
            .unwrap();

        let loaded = store.load_history(&session).unwrap();
        assert!(loaded.warning.is_none());
        assert_eq!(loaded.turns.len(), 2);
        assert_eq!(loaded.turns[0], ChatTurn::new("hello", "hi there"));
        assert_eq!(loaded.turns[1].sources, vec!["Plugin: hello".to_string()]);
    }

    #[test]
    fn test_history_file_omits_empty_sources() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        store.append_turn(&session, ChatTurn::new("a", "b")).unwrap();
        let raw = fs::read_to_string(&session.history_file).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!([{"user": "a", "aeon": "b"}]));
    }

    #[test]
    fn test_corrupt_history_is_empty_with_warning() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        fs::write(&session.history_file, "{\"user\": \"not a list\"}").unwrap();

        let loaded = store.load_history(&session).unwrap();
        assert!(loaded.turns.is_empty());
        assert!(loaded.warning.is_some());

        let warning = store.append_turn(&session, ChatTurn::new("x", "y")).unwrap();
        assert!(warning.is_some());
        assert_eq!(store.load_history(&session).unwrap().turns.len(), 1);
    }

    #[test]
    fn test_empty_history_file_is_empty() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        fs::write(&session.history_file, "").unwrap();
        let loaded = store.load_history(&session).unwrap();
        assert!(loaded.turns.is_empty());
        assert!(loaded.warning.is_none());
    }

    #[test]
    fn test_rename_moves_dir_and_history() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        store.append_turn(&session, ChatTurn::new("q", "a")).unwrap();
        store.list().unwrap();

        let renamed = store.rename(1, "greeting").unwrap();
        assert!(!session.memory_path.exists());
        assert!(renamed.memory_path.is_dir());
        assert_eq!(renamed.history_file, renamed.memory_path.join("greeting.json"));
        assert!(renamed.history_file.is_file());
        assert_eq!(store.snapshot()[0].id, "greeting");
    }

    #[test]
    fn test_rename_conflict() {
        let (_dir, mut store) = store();
        fs::create_dir_all(store.root().join("alpha")).unwrap();
        fs::create_dir_all(store.root().join("beta")).unwrap();
        store.list().unwrap();
        let err = store.rename(1, "beta").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AeonError>(),
            Some(AeonError::Conflict(_))
        ));
        assert!(store.root().join("alpha").is_dir());
    }

    #[test]
    fn test_rename_rejects_path_like_names() {
        let (_dir, mut store) = store();
        fs::create_dir_all(store.root().join("alpha")).unwrap();
        store.list().unwrap();
        for name in ["../escape", ".hidden", "a/b", ""] {
            let err = store.rename(1, name).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<AeonError>(),
                Some(AeonError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_locate_history_falls_back_to_any_json() {
        let (_dir, store) = store();
        let dir = store.root().join("greeting");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a1b2c.json"), "[]").unwrap();
        assert_eq!(locate_history_file(&dir, "greeting"), dir.join("a1b2c.json"));
    }

    #[test]
    fn test_delete_refuses_active() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        store.list().unwrap();
        let err = store.delete(1, Some(&session.id), |_| true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AeonError>(),
            Some(AeonError::ActiveSession(_))
        ));
        assert!(session.memory_path.is_dir());
    }

    #[test]
    fn test_delete_declined_keeps_dir() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        store.list().unwrap();
        assert!(store.delete(1, None, |_| false).unwrap().is_none());
        assert!(session.memory_path.is_dir());
    }

    #[test]
    fn test_delete_confirmed_removes_tree() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        store.append_turn(&session, ChatTurn::new("q", "a")).unwrap();
        store.list().unwrap();
        let deleted = store.delete(1, None, |_| true).unwrap().unwrap();
        assert_eq!(deleted.id, session.id);
        assert!(!session.memory_path.exists());
        assert!(store.resolve(1).is_err());
    }

    #[test]
    fn test_append_after_delete_does_not_recreate_session() {
        let (_dir, mut store) = store();
        let session = store.create().unwrap();
        store.list().unwrap();
        store.delete(1, None, |_| true).unwrap();

        let err = store
            .append_turn(&session, ChatTurn::new("late", "reply"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AeonError>(),
            Some(AeonError::NotFound(_))
        ));
        assert!(!session.memory_path.exists());
    }
}
