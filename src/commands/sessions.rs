use crate::error::Result;
use crate::storage::ConversationStore;
use chrono::{DateTime, Local};
use colored::Colorize;
use prettytable::{format, Table};

/// Print stored conversations as a table
pub fn list_sessions(store: &mut ConversationStore) -> Result<()> {
    let sessions = store.list()?.to_vec();

    if sessions.is_empty() {
        println!("{}", "No conversations found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "#".bold(),
        "Name".bold(),
        "Turns".bold(),
        "Last Updated".bold()
    ]);

    for summary in sessions {
        let session = store.session(&summary.id)?;
        let turns = store
            .load_history(&session)
            .map(|h| h.turns.len().to_string())
            .unwrap_or_else(|_| "?".to_string());
        let updated = std::fs::metadata(&session.history_file)
            .and_then(|m| m.modified())
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| "-".to_string());

        table.add_row(prettytable::row![
            summary.index,
            summary.id.cyan(),
            turns,
            updated
        ]);
    }

    println!("\nConversations in {}:", store.root().display());
    table.printstd();
    println!();
    println!("Use {} to open one.", "aeon chat".cyan());
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ChatTurn;
    use tempfile::TempDir;

    #[test]
    fn test_list_sessions_empty_and_populated() {
        let dir = TempDir::new().unwrap();
        let mut store = ConversationStore::new(dir.path()).unwrap();
        list_sessions(&mut store).unwrap();

        let session = store.create().unwrap();
        store
            .append_turn(&session, ChatTurn::new("hi", "hello"))
            .unwrap();
        list_sessions(&mut store).unwrap();
        assert_eq!(store.snapshot().len(), 1);
    }
}
