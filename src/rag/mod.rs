//! Retrieval-augmented generation collaborators
//!
//! The session core only talks to the traits in this module. Default
//! adapters cover an Ollama-compatible server, an offline hash embedding, a
//! JSON-file vector index per session and DuckDuckGo instant answers.
//!
//! A [`RagBinding`] bundles one session's collaborators. It is built by a
//! [`RagFactory`], which also runs the embedding sanity check so a broken
//! embedding backend is an initialisation error rather than a failure on the
//! first message.

use crate::config::Config;
use crate::error::{AeonError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub mod chain;
pub mod hash;
pub mod ingestion;
pub mod ollama;
pub mod search;
pub mod splitter;
pub mod vector_store;

pub use chain::RetrievalChain;
pub use hash::HashEmbeddings;
pub use ingestion::{ingest_documents, ingest_path, persist_turn, IngestReport};
pub use ollama::{OllamaEmbeddings, OllamaLanguageModel};
pub use search::{DuckDuckGoSearch, SearchHit};
pub use splitter::RecursiveTextSplitter;
pub use vector_store::{cosine_similarity, JsonVectorStore};

/// Query embedded once when a session's collaborators are bound
pub const SANITY_CHECK_TEXT: &str = "Sanity check for embeddings.";

/// A piece of text with its provenance label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Text content
    pub text: String,
    /// Where the text came from (file path, `web_search`, `conversation`, ...)
    pub source: String,
}

impl Document {
    /// Create a document
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Reference to a retrieved document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Provenance label of the retrieved chunk
    pub source: String,
}

/// Answer produced by a [`RagChain`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    /// Generated answer
    pub answer: String,
    /// Distinct sources of the retrieved context
    pub sources: Vec<DocumentRef>,
}

impl RagAnswer {
    /// Source labels in retrieval order
    pub fn source_labels(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.source.clone()).collect()
    }
}

/// Embedding model
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed a batch of document texts
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Text generation model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `prompt`
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Similarity index over embedded chunks
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Add documents, returning how many were new
    async fn add_documents(&self, documents: &[Document]) -> Result<usize>;

    /// The `k` documents most similar to `query`
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>>;

    /// Number of stored chunks
    fn len(&self) -> usize;

    /// Whether the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits documents into chunks
pub trait TextSplitter: Send + Sync {
    /// Split every document, keeping its source label on each chunk
    fn split_documents(&self, documents: &[Document]) -> Vec<Document>;
}

/// Answers a query from retrieved context
#[async_trait]
pub trait RagChain: Send + Sync {
    /// Retrieve, generate, and report sources
    async fn invoke(&self, query: &str) -> Result<RagAnswer>;
}

/// Web search provider
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Up to `max_results` hits for `query`
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// One session's bound collaborators
#[derive(Clone)]
pub struct RagBinding {
    /// Retrieval chain over `vector_store`
    pub chain: Arc<dyn RagChain>,
    /// The session's vector index
    pub vector_store: Arc<dyn VectorStore>,
    /// Splitter configured from the session snapshot
    pub splitter: Arc<dyn TextSplitter>,
    /// Embedding model used by `vector_store`
    pub embeddings: Arc<dyn Embeddings>,
    /// Language model used by `chain`
    pub llm: Arc<dyn LanguageModel>,
    /// Web search provider
    pub search: Arc<dyn SearchProvider>,
}

impl std::fmt::Debug for RagBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagBinding")
            .field("chunks", &self.vector_store.len())
            .finish()
    }
}

impl RagBinding {
    /// Wire collaborators over the index in `db_dir`
    ///
    /// Runs the embedding sanity check before opening the index.
    pub async fn assemble(
        config: &Config,
        db_dir: &Path,
        embeddings: Arc<dyn Embeddings>,
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
    ) -> Result<Self> {
        let probe = embeddings.embed_query(SANITY_CHECK_TEXT).await.map_err(|e| {
            tracing::error!("Embedding sanity check failed: {}", e);
            AeonError::Rag(format!("Embedding sanity check failed: {}", e))
        })?;
        if probe.is_empty() {
            return Err(AeonError::Rag("Embedding model returned an empty vector".to_string()).into());
        }
        tracing::debug!(dimensions = probe.len(), "Embedding sanity check passed");

        let vector_store: Arc<dyn VectorStore> =
            Arc::new(JsonVectorStore::open(db_dir, embeddings.clone())?);
        let splitter: Arc<dyn TextSplitter> = Arc::new(RecursiveTextSplitter::new(
            config.embeddings.chunk_size,
            config.embeddings.chunk_overlap,
        ));
        let chain: Arc<dyn RagChain> = Arc::new(RetrievalChain::new(
            vector_store.clone(),
            llm.clone(),
            config.llm.system_prompt.clone(),
            config.retrieval.top_k,
        ));

        Ok(Self {
            chain,
            vector_store,
            splitter,
            embeddings,
            llm,
            search,
        })
    }
}

/// Builds a session's [`RagBinding`]
#[async_trait]
pub trait RagFactory: Send + Sync {
    /// Bind collaborators for the session whose index lives in `db_dir`
    async fn bind(&self, config: &Config, db_dir: &Path) -> Result<RagBinding>;
}

/// Factory for the configured default adapters
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRagFactory;

#[async_trait]
impl RagFactory for DefaultRagFactory {
    async fn bind(&self, config: &Config, db_dir: &Path) -> Result<RagBinding> {
        let embeddings: Arc<dyn Embeddings> = match config.embeddings.provider.as_str() {
            "hash" => Arc::new(HashEmbeddings::new(config.embeddings.dimensions)),
            "ollama" => Arc::new(OllamaEmbeddings::new(&config.embeddings)?),
            other => {
                return Err(
                    AeonError::Config(format!("Unknown embeddings provider: {}", other)).into(),
                )
            }
        };
        let llm: Arc<dyn LanguageModel> = Arc::new(OllamaLanguageModel::new(&config.llm)?);
        let search: Arc<dyn SearchProvider> = Arc::new(DuckDuckGoSearch::new(&config.search)?);

        tracing::info!(
            provider = %config.embeddings.provider,
            model = %config.llm.model,
            db = %db_dir.display(),
            "Binding RAG collaborators"
        );
        RagBinding::assemble(config, db_dir, embeddings, llm, search).await
    }
}
