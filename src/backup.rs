//! Session backup archives
//!
//! A backup is a zip file whose root entries are exactly the contents of one
//! session directory. Restores are validated in full before anything under
//! the memory root is touched, then extracted into a reserved staging
//! directory and moved into place.

use crate::error::{AeonError, Result};
use crate::storage::{is_valid_name, ConversationSession, DB_DIR, OUTPUTS_DIR, RESERVED_PREFIX};
use chrono::Local;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Outcome of a restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredBackup {
    /// Id of the restored session
    pub id: String,
    /// Directory of the restored session
    pub path: PathBuf,
    /// Whether an existing session directory was overwritten
    pub replaced: bool,
}

/// Archives sessions and restores them into the memory root
#[derive(Debug, Clone)]
pub struct BackupManager {
    memory_root: PathBuf,
    backup_dir: PathBuf,
}

impl BackupManager {
    /// Create a manager writing archives to `backup_dir`
    pub fn new(memory_root: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            memory_root: memory_root.into(),
            backup_dir: backup_dir.into(),
        }
    }

    /// Where archives are written
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Archive a session directory
    ///
    /// Directory entries are stored too so empty `db/` and `outputs/`
    /// directories survive a round-trip.
    pub fn zip(&self, session: &ConversationSession) -> Result<PathBuf> {
        if !session.memory_path.is_dir() {
            return Err(AeonError::Backup(format!(
                "source directory {} does not exist",
                session.memory_path.display()
            ))
            .into());
        }

        fs::create_dir_all(&self.backup_dir)?;
        let archive_path = self.next_archive_path(&session.id);
        let partial = self.backup_dir.join(format!(
            "{}{}.part",
            RESERVED_PREFIX,
            archive_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        ));

        if let Err(e) = write_archive(&session.memory_path, &partial) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        fs::rename(&partial, &archive_path)?;

        tracing::info!(id = %session.id, archive = %archive_path.display(), "Created backup");
        Ok(archive_path)
    }

    fn next_archive_path(&self, id: &str) -> PathBuf {
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let mut candidate = self.backup_dir.join(format!("{}_{}.zip", id, stamp));
        let mut n = 1;
        while candidate.exists() {
            candidate = self.backup_dir.join(format!("{}_{}-{}.zip", id, stamp, n));
            n += 1;
        }
        candidate
    }

    /// Restore an archive into the memory root
    ///
    /// Fails without touching the memory root if the file is not a zip, an
    /// entry escapes the archive root, or no root `*.json` history exists.
    pub fn restore(&self, archive_path: &Path) -> Result<RestoredBackup> {
        if !archive_path.is_file() {
            return Err(AeonError::Backup(format!(
                "archive {} does not exist",
                archive_path.display()
            ))
            .into());
        }

        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| {
            AeonError::Backup(format!("{} is not a zip archive: {}", archive_path.display(), e))
        })?;

        let id = validate_archive(&mut archive, archive_path)?;

        fs::create_dir_all(&self.memory_root)?;
        let staging = self
            .memory_root
            .join(format!("{}restore-{}", RESERVED_PREFIX, id));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        if let Err(e) = extract_into(&mut archive, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let target = self.memory_root.join(&id);
        let replaced = target.exists();
        if replaced {
            tracing::warn!(id = %id, "Overwriting existing conversation from backup");
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&staging, &target)?;
        fs::create_dir_all(target.join(DB_DIR))?;
        fs::create_dir_all(target.join(OUTPUTS_DIR))?;

        tracing::info!(id = %id, archive = %archive_path.display(), "Restored backup");
        Ok(RestoredBackup {
            id,
            path: target,
            replaced,
        })
    }
}

fn write_archive(source: &Path, destination: &Path) -> Result<()> {
    let file = File::create(destination)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with(RESERVED_PREFIX))
    {
        let entry = entry.map_err(|e| AeonError::Backup(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| AeonError::Backup(e.to_string()))?;
        let name = archive_name(relative);

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{}/", name), options)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options)?;
            let mut input = File::open(entry.path())?;
            io::copy(&mut input, &mut writer)?;
        }
    }

    writer.finish()?;
    Ok(())
}

fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check every entry and pick the session id the archive restores to
fn validate_archive<R: io::Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
) -> Result<String> {
    let mut root_histories = Vec::new();

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let path = entry
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| {
                AeonError::Backup(format!("entry '{}' escapes the archive root", entry.name()))
            })?;

        let depth = path
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count();
        let is_json = path.extension().map(|ext| ext == "json").unwrap_or(false);
        if !entry.is_dir() && depth == 1 && is_json {
            if let Some(stem) = path.file_stem() {
                root_histories.push(stem.to_string_lossy().to_string());
            }
        }
    }

    root_histories.sort();
    let Some(history_stem) = root_histories.first() else {
        return Err(AeonError::Backup(format!(
            "{} has no conversation history at its root",
            archive_path.display()
        ))
        .into());
    };

    if is_valid_name(history_stem) {
        return Ok(history_stem.clone());
    }

    let archive_stem = archive_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if is_valid_name(&archive_stem) {
        return Ok(archive_stem);
    }

    Err(AeonError::Backup(format!(
        "cannot derive a conversation name from {}",
        archive_path.display()
    ))
    .into())
}

fn extract_into<R: io::Read + io::Seek>(archive: &mut ZipArchive<R>, staging: &Path) -> Result<()> {
    fs::create_dir_all(staging)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| AeonError::Backup(format!("unsafe entry '{}'", entry.name())))?;
        let out = staging.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;
    }
    Ok(())
}
