//! DuckDuckGo instant-answer search provider

use super::SearchProvider;
use crate::config::SearchConfig;
use crate::error::{AeonError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result title
    pub title: String,
    /// Result URL
    pub url: String,
    /// Result text
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL", default)]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics", default)]
        topics: Vec<RelatedTopic>,
    },
}

impl InstantAnswer {
    fn into_hits(self) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        if !self.abstract_text.trim().is_empty() {
            hits.push(SearchHit {
                title: self.heading.clone(),
                url: self.abstract_url,
                body: self.abstract_text,
            });
        }
        flatten_topics(self.related_topics, &mut hits);
        hits
    }
}

fn flatten_topics(topics: Vec<RelatedTopic>, hits: &mut Vec<SearchHit>) {
    for topic in topics {
        match topic {
            RelatedTopic::Topic { text, first_url } => {
                if text.trim().is_empty() {
                    continue;
                }
                let title = text.split(" - ").next().unwrap_or(&text).to_string();
                hits.push(SearchHit {
                    title,
                    url: first_url,
                    body: text,
                });
            }
            RelatedTopic::Group { topics } => flatten_topics(topics, hits),
        }
    }
}

/// Search provider backed by the DuckDuckGo instant answer API
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    /// Create a provider for the configured endpoint
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("aeon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AeonError::Search(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        tracing::info!(query = %query, "Searching the web");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Search request failed: {}", e);
                AeonError::Search(format!("Search request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Search provider returned error {}: {}", status, error_text);
            return Err(AeonError::Search(format!(
                "Search provider returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let answer: InstantAnswer = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse search response: {}", e);
            AeonError::Search(format!("Failed to parse search response: {}", e))
        })?;

        let mut hits = answer.into_hits();
        hits.truncate(max_results);
        tracing::debug!(hits = hits.len(), "Search finished");
        Ok(hits)
    }
}
