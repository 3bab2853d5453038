//! Remote document store client.
//!
//! [`DocumentStore`] is the seam the pipeline retrieves through;
//! [`DataApiStore`] is the production implementation, speaking an
//! Astra-style JSON document API over HTTP: similarity search is a `find`
//! command sorted by `$vector`, ingestion is `insertMany`. Query and
//! document text is vectorized through an [`Embedder`] before each call.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::config::StoreConfig;
use crate::embeddings::Embedder;
use crate::error::{ConfigError, StoreError};
use crate::types::Document;

/// How a batch of ingestion items is interpreted.
///
/// Parsed from user input with `FromStr`; anything other than `document`
/// or `text` is a configuration error, raised before any store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestKind {
    /// Items are full documents carrying metadata.
    Document,
    /// Items are bare text; metadata starts empty.
    Text,
}

impl FromStr for IngestKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(IngestKind::Document),
            "text" => Ok(IngestKind::Text),
            other => Err(ConfigError::UnknownIngestKind {
                kind: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for IngestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestKind::Document => write!(f, "document"),
            IngestKind::Text => write!(f, "text"),
        }
    }
}

/// An item submitted for ingestion.
#[derive(Debug, Clone)]
pub enum IngestItem {
    Document(Document),
    Text(String),
}

impl IngestItem {
    /// The raw text that gets embedded.
    pub fn content(&self) -> &str {
        match self {
            IngestItem::Document(doc) => &doc.content,
            IngestItem::Text(text) => text,
        }
    }

    fn into_document(self) -> Document {
        match self {
            IngestItem::Document(doc) => doc,
            IngestItem::Text(text) => Document::new(text),
        }
    }

    fn into_text_document(self) -> Document {
        Document::new(match self {
            IngestItem::Document(doc) => doc.content,
            IngestItem::Text(text) => text,
        })
    }
}

impl From<Document> for IngestItem {
    fn from(doc: Document) -> Self {
        IngestItem::Document(doc)
    }
}

impl From<String> for IngestItem {
    fn from(text: String) -> Self {
        IngestItem::Text(text)
    }
}

impl From<&str> for IngestItem {
    fn from(text: &str) -> Self {
        IngestItem::Text(text.to_string())
    }
}

/// Trait for document stores supporting similarity retrieval and ingestion.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the `k` documents most similar to `query`, most similar first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>, StoreError>;

    /// Insert a batch of items, interpreted per `kind`. Returns the number
    /// of documents written.
    async fn ingest(&self, items: Vec<IngestItem>, kind: IngestKind) -> Result<usize, StoreError>;
}

/// HTTP client for an Astra-style JSON document API.
pub struct DataApiStore {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    embedder: Arc<dyn Embedder>,
}

impl DataApiStore {
    /// Create a store client from configuration, resolving the access token
    /// from the environment variable the config names.
    pub fn new(config: &StoreConfig, embedder: Arc<dyn Embedder>) -> Result<Self, ConfigError> {
        let token = std::env::var(&config.token_env).map_err(|_| ConfigError::EnvVarMissing {
            var: config.token_env.clone(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: collection_endpoint(config),
            token,
            embedder,
        })
    }

    /// The collection endpoint commands are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post one API command and return the parsed response body.
    async fn execute(&self, command: Value) -> Result<Value, StoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Token", &self.token)
            .json(&command)
            .send()
            .await
            .map_err(|e| StoreError::Request {
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| StoreError::Request {
            message: format!("Failed to read response body: {e}"),
        })?;

        if status.as_u16() == 401 {
            return Err(StoreError::AuthFailed {
                store: self.endpoint.clone(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Request {
                message: format!("Store returned {status}: {response_body}"),
            });
        }

        let parsed: Value =
            serde_json::from_str(&response_body).map_err(|e| StoreError::ResponseParse {
                message: format!("Invalid store JSON: {e}"),
            })?;

        // Command-level errors arrive with a 200 status.
        if let Some(errors) = parsed.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                return Err(StoreError::Request {
                    message: format!("Store command failed: {}", Value::Array(errors.clone())),
                });
            }
        }
        Ok(parsed)
    }

    fn parse_documents(response: &Value) -> Result<Vec<Document>, StoreError> {
        let raw = response
            .pointer("/data/documents")
            .and_then(|d| d.as_array())
            .ok_or_else(|| StoreError::ResponseParse {
                message: "No documents array in find response".to_string(),
            })?;

        let documents = raw
            .iter()
            .map(|doc| {
                let content = doc
                    .get("content")
                    .and_then(|c| c.as_str())
                    .unwrap_or_default()
                    .to_string();
                let metadata: BTreeMap<String, Value> = doc
                    .get("metadata")
                    .and_then(|m| m.as_object())
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                Document { metadata, content }
            })
            .collect();
        Ok(documents)
    }
}

#[async_trait]
impl DocumentStore for DataApiStore {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;

        debug!(endpoint = %self.endpoint, k, "Running similarity search");
        let response = self
            .execute(json!({
                "find": {
                    "sort": { "$vector": vector },
                    "projection": { "content": true, "metadata": true },
                    "options": { "limit": k },
                }
            }))
            .await?;

        Self::parse_documents(&response)
    }

    async fn ingest(&self, items: Vec<IngestItem>, kind: IngestKind) -> Result<usize, StoreError> {
        if items.is_empty() {
            return Ok(0);
        }

        let documents: Vec<Document> = match kind {
            IngestKind::Document => items.into_iter().map(IngestItem::into_document).collect(),
            IngestKind::Text => items
                .into_iter()
                .map(IngestItem::into_text_document)
                .collect(),
        };

        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&contents).await?;

        let ingested_at = chrono::Utc::now().to_rfc3339();
        let payload: Vec<Value> = documents
            .into_iter()
            .zip(vectors)
            .map(|(doc, vector)| {
                let metadata: Map<String, Value> = doc.metadata.into_iter().collect();
                json!({
                    "_id": uuid::Uuid::new_v4().to_string(),
                    "content": doc.content,
                    "metadata": metadata,
                    "ingested_at": ingested_at,
                    "$vector": vector,
                })
            })
            .collect();
        let count = payload.len();

        debug!(endpoint = %self.endpoint, count, %kind, "Inserting documents");
        let response = self
            .execute(json!({
                "insertMany": {
                    "documents": payload,
                    "options": { "ordered": false },
                }
            }))
            .await?;

        let inserted = response
            .pointer("/status/insertedIds")
            .and_then(|ids| ids.as_array())
            .map(|ids| ids.len())
            .unwrap_or(count);
        Ok(inserted)
    }
}

fn collection_endpoint(config: &StoreConfig) -> String {
    format!(
        "{}/api/json/v1/{}/{}",
        config.base_url.trim_end_matches('/'),
        config.namespace,
        config.collection
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_kind_parses_known_values() {
        assert_eq!("document".parse::<IngestKind>().unwrap(), IngestKind::Document);
        assert_eq!("text".parse::<IngestKind>().unwrap(), IngestKind::Text);
    }

    #[test]
    fn test_ingest_kind_rejects_unknown_value() {
        // Parsing happens before any store call, so a bad kind never
        // touches the collection.
        let result = "image".parse::<IngestKind>();
        assert!(matches!(
            result,
            Err(ConfigError::UnknownIngestKind { kind }) if kind == "image"
        ));
    }

    #[test]
    fn test_ingest_kind_is_case_sensitive() {
        assert!("Document".parse::<IngestKind>().is_err());
    }

    #[test]
    fn test_ingest_item_conversions() {
        let from_text: IngestItem = "plain text".into();
        assert_eq!(from_text.content(), "plain text");

        let doc = Document::new("doc content").with_meta("plan", "Mee Kosam");
        let from_doc: IngestItem = doc.into();
        assert_eq!(from_doc.content(), "doc content");
    }

    #[test]
    fn test_text_kind_drops_metadata() {
        let doc = Document::new("content").with_meta("plan", "x");
        let item = IngestItem::Document(doc);
        let converted = item.into_text_document();
        assert!(converted.metadata.is_empty());
        assert_eq!(converted.content, "content");
    }

    #[test]
    fn test_collection_endpoint_formatting() {
        let config = StoreConfig {
            base_url: "https://db.example.com/".to_string(),
            namespace: "ks".to_string(),
            collection: "plans".to_string(),
            ..Default::default()
        };
        assert_eq!(
            collection_endpoint(&config),
            "https://db.example.com/api/json/v1/ks/plans"
        );
    }

    #[test]
    fn test_missing_token_env() {
        let config = StoreConfig {
            token_env: "PLANSAGE_NONEXISTENT_STORE_TOKEN".to_string(),
            ..Default::default()
        };
        let embedder = Arc::new(crate::embeddings::HashEmbedder::new(8));
        let result = DataApiStore::new(&config, embedder);
        assert!(matches!(
            result,
            Err(ConfigError::EnvVarMissing { var }) if var == "PLANSAGE_NONEXISTENT_STORE_TOKEN"
        ));
    }

    #[test]
    fn test_parse_documents_from_find_response() {
        let response = json!({
            "data": {
                "documents": [
                    { "_id": "1", "content": "first", "metadata": { "page": 1 } },
                    { "_id": "2", "content": "second" },
                ]
            }
        });
        let docs = DataApiStore::parse_documents(&response).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "first");
        assert_eq!(docs[0].metadata.get("page"), Some(&json!(1)));
        assert_eq!(docs[1].content, "second");
        assert!(docs[1].metadata.is_empty());
    }

    #[test]
    fn test_parse_documents_missing_array_is_error() {
        let response = json!({ "status": {} });
        assert!(DataApiStore::parse_documents(&response).is_err());
    }
}
