//! JSON-file vector index
//!
//! Each session keeps its chunks at `<session>/db/index.json`. Entries are
//! keyed by a content hash, so re-ingesting the same text on reopen does not
//! grow the index.

use super::{Document, Embeddings, VectorStore};
use crate::error::{AeonError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// File name of the index inside the session's `db/` directory
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    text: String,
    source: String,
    vector: Vec<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexFile {
    #[serde(default)]
    entries: Vec<IndexEntry>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    entries: &'a [IndexEntry],
}

/// Vector store persisted as one JSON file
pub struct JsonVectorStore {
    path: PathBuf,
    embeddings: Arc<dyn Embeddings>,
    entries: RwLock<Vec<IndexEntry>>,
}

impl JsonVectorStore {
    /// Open the index in `db_dir`, adding to any vectors already there
    pub fn open(db_dir: &Path, embeddings: Arc<dyn Embeddings>) -> Result<Self> {
        std::fs::create_dir_all(db_dir)?;
        let path = db_dir.join(INDEX_FILE);

        let entries = if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            let index: IndexFile = serde_json::from_str(&raw).map_err(|e| {
                AeonError::Rag(format!("Corrupt vector index {}: {}", path.display(), e))
            })?;
            index.entries
        } else {
            Vec::new()
        };

        tracing::debug!(path = %path.display(), chunks = entries.len(), "Opened vector index");
        Ok(Self {
            path,
            embeddings,
            entries: RwLock::new(entries),
        })
    }

    /// Location of the index file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &[IndexEntry]) -> Result<()> {
        let json = serde_json::to_string(&IndexFileRef { entries })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for JsonVectorStore {
    async fn add_documents(&self, documents: &[Document]) -> Result<usize> {
        let fresh: Vec<(String, &Document)> = {
            let entries = self
                .entries
                .read()
                .map_err(|_| AeonError::Rag("Vector index lock poisoned".to_string()))?;
            let known: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
            let mut seen = HashSet::new();
            documents
                .iter()
                .map(|doc| (content_id(&doc.text), doc))
                .filter(|(id, _)| !known.contains(id.as_str()) && seen.insert(id.clone()))
                .collect()
        };

        if fresh.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = fresh.iter().map(|(_, doc)| doc.text.clone()).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(AeonError::Rag(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))
            .into());
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|_| AeonError::Rag("Vector index lock poisoned".to_string()))?;
        let added = fresh.len();
        let mut updated = entries.clone();
        for ((id, doc), vector) in fresh.into_iter().zip(vectors) {
            updated.push(IndexEntry {
                id,
                text: doc.text.clone(),
                source: doc.source.clone(),
                vector,
            });
        }
        // memory only follows a successful write
        self.persist(&updated)?;
        *entries = updated;
        Ok(added)
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embeddings.embed_query(query).await?;

        let entries = self
            .entries
            .read()
            .map_err(|_| AeonError::Rag("Vector index lock poisoned".to_string()))?;
        let mut scored: Vec<(f32, &IndexEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_vector, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, e)| Document::new(e.text.clone(), e.source.clone()))
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

/// Cosine similarity of two vectors; 0.0 when either has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn content_id(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::HashEmbeddings;
    use tempfile::TempDir;

    fn store(dir: &Path) -> JsonVectorStore {
        JsonVectorStore::open(dir, Arc::new(HashEmbeddings::new(256))).unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_add_and_search() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let added = store
            .add_documents(&[
                Document::new("rust borrow checker ownership", "rust.md"),
                Document::new("banana bread recipe with walnuts", "baking.md"),
            ])
            .await
            .unwrap();
        assert_eq!(added, 2);

        let hits = store.similarity_search("banana walnuts", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "baking.md");
    }

    #[tokio::test]
    async fn test_duplicates_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        let doc = Document::new("same text", "a.md");
        assert_eq!(store.add_documents(&[doc.clone(), doc.clone()]).await.unwrap(), 1);
        assert_eq!(store.add_documents(&[doc]).await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_index_unchanged() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let store = store(&db);
        store
            .add_documents(&[Document::new("kept chunk", "a.md")])
            .await
            .unwrap();
        std::fs::remove_dir_all(&db).unwrap();

        let result = store
            .add_documents(&[Document::new("lost chunk", "b.md")])
            .await;
        assert!(result.is_err());
        assert_eq!(store.len(), 1);
        let hits = store.similarity_search("lost chunk", 5).await.unwrap();
        assert!(hits.iter().all(|d| d.source != "b.md"));
    }

    #[tokio::test]
    async fn test_reopen_keeps_vectors() {
        let dir = TempDir::new().unwrap();
        {
            let store = store(dir.path());
            store
                .add_documents(&[Document::new("persisted chunk", "x.txt")])
                .await
                .unwrap();
        }
        let reopened = store(dir.path());
        assert_eq!(reopened.len(), 1);
        assert!(reopened.path().ends_with(INDEX_FILE));
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path());
        assert!(store.similarity_search("anything", 4).await.unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_index_is_rag_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "not json").unwrap();
        let result = JsonVectorStore::open(dir.path(), Arc::new(HashEmbeddings::new(8)));
        assert!(result.is_err());
    }
}
