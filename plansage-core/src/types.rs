//! Core type definitions for PlanSage.
//!
//! Defines the fundamental data structures used throughout the system:
//! conversation messages, retrieved documents, completion requests and
//! responses, and the model candidate list.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a prompt or completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A document returned by the store's similarity search.
///
/// Immutable once retrieved; metadata keys are arbitrary (source, page,
/// plan name, ...) and render in sorted order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub content: String,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            metadata: BTreeMap::new(),
            content: content.into(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A request to a chat model for completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    /// Maximum tokens to generate. `None` delegates to the model's own ceiling.
    pub max_tokens: Option<u32>,
    /// Optional model identifier override.
    pub model: Option<String>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: 0.2,
            max_tokens: None,
            model: None,
        }
    }
}

/// A completion returned by a chat model.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

impl CompletionResponse {
    /// The generated answer text.
    pub fn text(&self) -> &str {
        &self.message.content
    }
}

/// One entry in the priority-ordered model candidate list.
///
/// Serializes to either a bare model identifier or a one-entry
/// `{model: max_tokens}` mapping, matching both config spellings:
///
/// ```toml
/// candidates = ["llama-3.3-70b-versatile", { "mixtral-8x7b-32768" = 1024 }]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelCandidate {
    /// A model tried with the caller's default token bound.
    Bare(String),
    /// A model with its own maximum-output-token override.
    WithTokenLimit { model: String, max_tokens: u32 },
}

impl ModelCandidate {
    /// The model identifier for this candidate.
    pub fn model(&self) -> &str {
        match self {
            ModelCandidate::Bare(model) => model,
            ModelCandidate::WithTokenLimit { model, .. } => model,
        }
    }

    /// The effective token bound: the candidate's own override when present,
    /// otherwise the caller-supplied default. Overrides replace the default,
    /// they never merge with it.
    pub fn token_limit(&self, default: Option<u32>) -> Option<u32> {
        match self {
            ModelCandidate::Bare(_) => default,
            ModelCandidate::WithTokenLimit { max_tokens, .. } => Some(*max_tokens),
        }
    }
}

impl Serialize for ModelCandidate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ModelCandidate::Bare(model) => serializer.serialize_str(model),
            ModelCandidate::WithTokenLimit { model, max_tokens } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(model, max_tokens)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ModelCandidate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bare(String),
            Limited(BTreeMap<String, u32>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bare(model) => Ok(ModelCandidate::Bare(model)),
            Repr::Limited(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((model, max_tokens)), None) => {
                        Ok(ModelCandidate::WithTokenLimit { model, max_tokens })
                    }
                    _ => Err(D::Error::custom(
                        "model candidate mapping must contain exactly one model",
                    )),
                }
            }
        }
    }
}
