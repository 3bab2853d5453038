//! Embedding providers for query and document vectorization.
//!
//! The store client embeds text through the [`Embedder`] trait.
//! [`RemoteEmbedder`] speaks the OpenAI-shaped `/v1/embeddings` wire format,
//! which covers Jina (the default) and OpenAI endpoints. [`HashEmbedder`]
//! is a deterministic local fallback for tests and offline smoke runs.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::config::EmbeddingConfig;
use crate::error::{ConfigError, StoreError};

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;

    /// Generate embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// The dimensionality of produced embeddings.
    fn dimensions(&self) -> usize;

    /// The provider name.
    fn provider_name(&self) -> &str;
}

/// Remote embedder over an OpenAI-shaped `/v1/embeddings` endpoint.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl RemoteEmbedder {
    /// Create an embedder from configuration, resolving the API key from
    /// the environment variable the config names.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| ConfigError::EnvVarMissing {
                var: config.api_key_env.clone(),
            })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key,
            model: config.model.clone(),
            dims: config.dimensions,
        })
    }

    async fn request_embeddings(&self, input: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": input,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Embedding {
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| StoreError::Embedding {
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(StoreError::Embedding {
                message: format!("Embedding endpoint returned {status}: {response_body}"),
            });
        }

        let parsed: Value =
            serde_json::from_str(&response_body).map_err(|e| StoreError::ResponseParse {
                message: format!("Invalid embedding JSON: {e}"),
            })?;

        let data = parsed
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| StoreError::ResponseParse {
                message: "No data array in embedding response".to_string(),
            })?;

        let mut embeddings = Vec::with_capacity(data.len());
        for entry in data {
            let vector = entry
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| StoreError::ResponseParse {
                    message: "Embedding entry without vector".to_string(),
                })?
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            embeddings.push(vector);
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let mut embeddings = self.request_embeddings(&[text]).await?;
        embeddings.pop().ok_or_else(|| StoreError::ResponseParse {
            message: "Embedding response contained no vectors".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();
        let embeddings = self.request_embeddings(&input).await?;
        if embeddings.len() != texts.len() {
            return Err(StoreError::ResponseParse {
                message: format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    embeddings.len()
                ),
            });
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "remote"
    }
}

/// Deterministic term-frequency hashing embedder.
///
/// No network, no model weights. Good enough for tests and offline runs
/// where only relative similarity of obviously related texts matters.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

fn term_hash(term: &str) -> usize {
    let mut hash: usize = 5381;
    for byte in term.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as usize);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let mut vector = vec![0.0f32; self.dims];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return Ok(vector);
        }

        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *tf.entry(word).or_insert(0) += 1;
        }
        for (term, count) in &tf {
            let idx = term_hash(term) % self.dims;
            vector[idx] += *count as f32;
        }

        // L2 normalize
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}
