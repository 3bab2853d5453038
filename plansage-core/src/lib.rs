//! # PlanSage Core
//!
//! Core library for the PlanSage retrieval-grounded assistant.
//! Provides the retrieve → reason pipeline, the model fallback manager,
//! prompt assembly, the document store and embedding clients,
//! configuration, and fundamental types.

pub mod config;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod manager;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{load_config, AssistantConfig};
pub use context::format_documents;
pub use embeddings::{Embedder, HashEmbedder, RemoteEmbedder};
pub use error::{PlanSageError, Result};
pub use manager::{ResolveOptions, ResponseManager, NO_ANSWER_FALLBACK};
pub use pipeline::{ChatPipeline, PipelineState, Stage};
pub use prompt::{grounded_answer_prompt, PromptTemplate};
pub use providers::{ChatModel, ModelFactory, OpenAiCompatFactory, OpenAiCompatModel};
pub use store::{DataApiStore, DocumentStore, IngestItem, IngestKind};
pub use types::{
    CompletionRequest, CompletionResponse, Document, Message, ModelCandidate, Role, TokenUsage,
};
