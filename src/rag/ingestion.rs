//! Document ingestion into a session's vector index
//!
//! Chunks are added one at a time so a single failing chunk is recorded in
//! the [`IngestReport`] instead of aborting the whole ingest.

use super::{Document, Embeddings, TextSplitter, VectorStore};
use crate::error::{AeonError, Result};
use std::path::Path;
use walkdir::WalkDir;

const INGESTIBLE_EXTENSIONS: [&str; 3] = ["md", "txt", "json"];

/// Characters of the first chunk embedded to verify the vector size
const SAMPLE_CHARS: usize = 100;

/// Tally of one ingest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Chunks stored (or already present)
    pub succeeded: usize,
    /// Chunks or files that could not be stored
    pub failed: usize,
    /// `succeeded + failed`
    pub total: usize,
    /// One message per failure
    pub errors: Vec<String>,
    /// Vector size reported by the post-ingest embedding check
    pub vector_size: Option<usize>,
}

impl IngestReport {
    fn record_failure(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.failed += 1;
        self.total += 1;
        self.errors.push(message);
    }

    fn record_success(&mut self) {
        self.succeeded += 1;
        self.total += 1;
    }

    /// One-line summary for terminal output
    pub fn summary(&self) -> String {
        format!(
            "Ingestion finished. Success: {}, Failed: {}, Total: {}",
            self.succeeded, self.failed, self.total
        )
    }
}

/// Ingest a file or a directory tree
///
/// Directories contribute every `.md`, `.txt` and `.json` file below them. A
/// single file of any other extension is read as UTF-8 text.
///
/// # Errors
///
/// Returns [`AeonError::Ingestion`] if `path` does not exist. Unreadable
/// files and failing chunks are reported in the returned tally instead.
pub async fn ingest_path(
    path: &Path,
    store: &dyn VectorStore,
    splitter: &dyn TextSplitter,
    embeddings: &dyn Embeddings,
) -> Result<IngestReport> {
    if !path.exists() {
        return Err(AeonError::Ingestion(format!("Path not found: '{}'", path.display())).into());
    }

    let mut report = IngestReport::default();
    let mut documents = Vec::new();
    for file in collect_files(path) {
        match load_document(&file) {
            Ok(doc) if doc.text.trim().is_empty() => {
                tracing::debug!(file = %file.display(), "Skipping empty document");
            }
            Ok(doc) => documents.push(doc),
            Err(e) => report.record_failure(format!("Failed to load '{}': {}", file.display(), e)),
        }
    }

    tracing::info!(path = %path.display(), documents = documents.len(), "Loaded documents");
    let chunk_report = ingest_documents(&documents, store, splitter, embeddings).await;
    report.succeeded += chunk_report.succeeded;
    report.failed += chunk_report.failed;
    report.total += chunk_report.total;
    report.errors.extend(chunk_report.errors);
    report.vector_size = chunk_report.vector_size;
    Ok(report)
}

/// Split documents and add the chunks, isolating any chunk that fails
pub async fn ingest_documents(
    documents: &[Document],
    store: &dyn VectorStore,
    splitter: &dyn TextSplitter,
    embeddings: &dyn Embeddings,
) -> IngestReport {
    let mut report = IngestReport::default();
    let chunks = splitter.split_documents(documents);
    tracing::debug!(chunks = chunks.len(), "Split documents");

    // one index write for the whole batch; per-chunk only to isolate a failure
    match store.add_documents(&chunks).await {
        Ok(_) => {
            for _ in &chunks {
                report.record_success();
            }
        }
        Err(e) => {
            tracing::debug!("Batch add failed, retrying chunk by chunk: {}", e);
            for (i, chunk) in chunks.iter().enumerate() {
                match store.add_documents(std::slice::from_ref(chunk)).await {
                    Ok(_) => report.record_success(),
                    Err(e) => report.record_failure(format!("Failed on chunk {}: {}", i + 1, e)),
                }
            }
        }
    }

    if report.succeeded > 0 {
        if let Some(first) = chunks.first() {
            let sample: String = first
                .text
                .chars()
                .take(SAMPLE_CHARS)
                .collect::<String>()
                .replace('\n', " ");
            match embeddings.embed_query(&sample).await {
                Ok(vector) => report.vector_size = Some(vector.len()),
                Err(e) => tracing::warn!("Embedding verification failed: {}", e),
            }
        }
    }

    report
}

/// Add one chat turn to the index as `USER: ...\nAEON: ...`
pub async fn persist_turn(store: &dyn VectorStore, user: &str, aeon: &str) -> Result<()> {
    let document = Document::new(format!("USER: {}\nAEON: {}", user, aeon), "conversation");
    store.add_documents(&[document]).await?;
    Ok(())
}

fn collect_files(path: &Path) -> Vec<std::path::PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| INGESTIBLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect()
}

/// Load one file as a document labelled with its path
pub fn load_document(path: &Path) -> Result<Document> {
    let raw = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let text = if is_json {
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        json_plaintext(&value)
    } else {
        raw
    };
    Ok(Document::new(text, path.display().to_string()))
}

/// Join every string leaf of a JSON document with newlines
pub fn json_plaintext(value: &serde_json::Value) -> String {
    fn walk(value: &serde_json::Value, out: &mut Vec<String>) {
        match value {
            serde_json::Value::String(s) => out.push(s.clone()),
            serde_json::Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            serde_json::Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }
    let mut leaves = Vec::new();
    walk(value, &mut leaves);
    leaves.join("\n")
}
