//! Ollama embedding and generation adapters
//!
//! Both adapters talk to an Ollama-compatible server over `reqwest`:
//! `/api/embeddings` for vectors and `/api/generate` for completions.

use super::{Embeddings, LanguageModel};
use crate::config::{EmbeddingsConfig, LlmConfig};
use crate::error::{AeonError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("aeon/", env!("CARGO_PKG_VERSION"));

fn build_client(timeout_seconds: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AeonError::Rag(format!("Failed to create HTTP client: {}", e)).into())
}

async fn post_json<Req, Resp>(client: &Client, url: &str, request: &Req) -> Result<Resp>
where
    Req: Serialize + ?Sized + Sync,
    Resp: for<'de> Deserialize<'de>,
{
    let response = client.post(url).json(request).send().await.map_err(|e| {
        tracing::error!("Ollama request failed: {}", e);
        AeonError::Rag(format!("Ollama request failed: {}", e))
    })?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!("Ollama returned error {}: {}", status, error_text);
        return Err(AeonError::Rag(format!(
            "Ollama returned error {}: {}",
            status, error_text
        ))
        .into());
    }

    response.json().await.map_err(|e| {
        tracing::error!("Failed to parse Ollama response: {}", e);
        AeonError::Rag(format!("Failed to parse Ollama response: {}", e)).into()
    })
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Embeddings served by Ollama
#[derive(Debug, Clone)]
pub struct OllamaEmbeddings {
    client: Client,
    host: String,
    model: String,
}

impl OllamaEmbeddings {
    /// Create an adapter for the configured host and model
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let client = build_client(60)?;
        tracing::debug!(host = %config.host, model = %config.model, "Initialized Ollama embeddings");
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Embeddings for OllamaEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_query(text).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.host);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };
        let response: EmbeddingResponse = post_json(&self.client, &url, &request).await?;
        Ok(response.embedding)
    }
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    num_ctx: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Language model served by Ollama
#[derive(Debug, Clone)]
pub struct OllamaLanguageModel {
    client: Client,
    host: String,
    config: LlmConfig,
}

impl OllamaLanguageModel {
    /// Create an adapter for the configured host and model
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = build_client(config.timeout_seconds)?;
        tracing::info!(
            "Initialized Ollama language model: host={}, model={}",
            config.host,
            config.model
        );
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            config: config.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.host);
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                top_k: self.config.top_k,
                top_p: self.config.top_p,
                num_ctx: self.config.num_ctx,
            },
        };
        tracing::debug!(model = %self.config.model, prompt_len = prompt.len(), "Sending generate request");
        let response: GenerateResponse = post_json(&self.client, &url, &request).await?;
        Ok(response.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embeddings_config(host: &str) -> EmbeddingsConfig {
        EmbeddingsConfig {
            host: host.to_string(),
            model: "nomic-embed-text".to_string(),
            ..EmbeddingsConfig::default()
        }
    }

    fn llm_config(host: &str) -> LlmConfig {
        LlmConfig {
            host: host.to_string(),
            model: "tiny".to_string(),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_embed_query_posts_model_and_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_partial_json(serde_json::json!({
                "model": "nomic-embed-text",
                "prompt": "hello"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"embedding": [0.1, 0.2, 0.3]})),
            )
            .mount(&server)
            .await;

        let embeddings = OllamaEmbeddings::new(&embeddings_config(&server.uri())).unwrap();
        let vector = embeddings.embed_query("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_server_error_is_rag_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let embeddings = OllamaEmbeddings::new(&embeddings_config(&server.uri())).unwrap();
        let err = embeddings.embed_query("hello").await.unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
        assert!(matches!(
            err.downcast_ref::<AeonError>(),
            Some(AeonError::Rag(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_returns_trimmed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"model": "tiny", "stream": false})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "  Hi there!\n", "done": true})),
            )
            .mount(&server)
            .await;

        let llm = OllamaLanguageModel::new(&llm_config(&server.uri())).unwrap();
        assert_eq!(llm.generate("hello").await.unwrap(), "Hi there!");
    }
}
