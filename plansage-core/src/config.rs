//! Configuration system for PlanSage.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment. Configuration is loaded from
//! `~/.config/plansage/config.toml` and/or `.plansage/config.toml` in the
//! workspace directory, then overridden by `PLANSAGE_`-prefixed environment
//! variables.
//!
//! The loaded [`AssistantConfig`] is constructed once at startup and passed
//! into each component's constructor; nothing reads configuration from
//! ambient global state. API keys and store tokens are never stored in the
//! config itself — the config names the environment variable that holds them.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::ModelCandidate;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
}

/// Configuration for the remote document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the store's JSON document API.
    pub base_url: String,
    /// Keyspace / namespace holding the collection.
    pub namespace: String,
    /// Collection searched and written by the assistant.
    pub collection: String,
    /// Environment variable name containing the store access token.
    pub token_env: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8181".to_string(),
            namespace: "default_keyspace".to_string(),
            collection: "plan_documents".to_string(),
            token_env: "ASTRA_DB_APPLICATION_TOKEN".to_string(),
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-shaped `/v1/embeddings` endpoint.
    pub base_url: String,
    /// Embedding model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Embedding vector dimensionality.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.jina.ai".to_string(),
            model: "jina-embeddings-v3".to_string(),
            api_key_env: "JINA_API_KEY".to_string(),
            dimensions: 1024,
        }
    }
}

/// Configuration for the retrieval stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of documents fetched per query.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

/// Configuration for chat model access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Candidate models tried in order until one succeeds. Entries are
    /// either bare identifiers or one-entry `{model: max_tokens}` mappings.
    #[serde(default)]
    pub candidates: Vec<ModelCandidate>,
    /// Transport-level retry behavior for a single model call.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            candidates: vec![
                ModelCandidate::Bare("llama-3.3-70b-versatile".to_string()),
                ModelCandidate::Bare("llama-3.1-8b-instant".to_string()),
                ModelCandidate::Bare("gemma2-9b-it".to_string()),
            ],
            retry: RetryConfig::default(),
        }
    }
}

/// Retry behavior for transient transport errors within one model call.
///
/// Independent of candidate fallback: these retries happen before a
/// candidate is declared failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial call.
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to the backoff after each attempt.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to the backoff delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Load the assistant configuration.
///
/// Layering, later entries winning: built-in defaults, the user-level
/// config file, the workspace `.plansage/config.toml`, `PLANSAGE_`-prefixed
/// environment variables (nested fields separated by `__`, e.g.
/// `PLANSAGE_RETRIEVAL__TOP_K=8`), and finally explicit overrides.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AssistantConfig>,
) -> Result<AssistantConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AssistantConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "plansage", "plansage") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(workspace) = workspace {
        let ws_config = workspace.join(".plansage").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables
    figment = figment.merge(Env::prefixed("PLANSAGE_").split("__"));

    // Explicit overrides win over everything
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides.clone()));
    }

    figment.extract().map_err(Box::new)
}
