//! Retrieval chain
//!
//! Retrieved chunks are stuffed into a prompt together with the session's
//! system prompt and passed to the language model.

use super::{DocumentRef, LanguageModel, RagAnswer, RagChain, VectorStore};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

const PROMPT_TEMPLATE: &str = "{system}

Use the following pieces of context to answer the question at the end. \
If the question is factual and the context does not cover it, say: \
\"I don't know about it. Can we /search?\". If the question is conversational, \
reply naturally without referring to the context.

Context:
{context}

Question: {question}
Answer:";

/// Stuff-documents retrieval chain
pub struct RetrievalChain {
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LanguageModel>,
    system_prompt: String,
    top_k: usize,
}

impl RetrievalChain {
    /// Create a chain retrieving `top_k` chunks per query
    pub fn new(
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
        system_prompt: String,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            llm,
            system_prompt,
            top_k,
        }
    }

    /// Render the prompt for `question` over `context`
    pub fn render_prompt(&self, context: &str, question: &str) -> String {
        PROMPT_TEMPLATE
            .replace("{system}", &self.system_prompt)
            .replace("{context}", context)
            .replace("{question}", question)
    }
}

#[async_trait]
impl RagChain for RetrievalChain {
    async fn invoke(&self, query: &str) -> Result<RagAnswer> {
        let documents = self.store.similarity_search(query, self.top_k).await?;
        tracing::debug!(retrieved = documents.len(), "Retrieved context");

        let context = documents
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.render_prompt(&context, query);
        let answer = self.llm.generate(&prompt).await?;

        let mut sources: Vec<DocumentRef> = Vec::new();
        for doc in documents {
            if !sources.iter().any(|s| s.source == doc.source) {
                sources.push(DocumentRef { source: doc.source });
            }
        }

        Ok(RagAnswer { answer, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::{Document, HashEmbeddings, JsonVectorStore};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("forty-two".to_string())
        }
    }

    #[tokio::test]
    async fn test_invoke_stuffs_context_and_dedups_sources() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonVectorStore::open(dir.path(), Arc::new(HashEmbeddings::new(128))).unwrap());
        store
            .add_documents(&[
                Document::new("the answer is forty-two", "guide.md"),
                Document::new("the answer was computed by a computer", "guide.md"),
            ])
            .await
            .unwrap();

        let llm = Arc::new(RecordingModel::default());
        let chain = RetrievalChain::new(store, llm.clone(), "You are AEON.".to_string(), 4);
        let answer = chain.invoke("what is the answer").await.unwrap();

        assert_eq!(answer.answer, "forty-two");
        assert_eq!(answer.source_labels(), vec!["guide.md"]);

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("You are AEON."));
        assert!(prompts[0].contains("the answer is forty-two"));
        assert!(prompts[0].contains("Question: what is the answer"));
    }
}
