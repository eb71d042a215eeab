//! Offline deterministic embeddings
//!
//! Each lowercase word is hashed into one signed bucket of a fixed-size
//! vector, which is then L2-normalised. Texts sharing words land close
//! together, which is enough for local retrieval without a model server.

use super::Embeddings;
use crate::error::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Feature-hashing embedding provider
#[derive(Debug, Clone, Copy)]
pub struct HashEmbeddings {
    dimensions: usize,
}

impl HashEmbeddings {
    /// Create a provider producing `dimensions`-sized vectors
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed one text synchronously
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        } else {
            // keep the sanity check meaningful for texts without words
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embeddings for HashEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }
}
