//! Chat model providers.
//!
//! [`ChatModel`] abstracts a single model endpoint; [`OpenAiCompatModel`]
//! implements it for any OpenAI-compatible chat completions API (Groq,
//! OpenAI, Ollama, vLLM). [`ModelFactory`] instantiates a model per
//! candidate identifier so the response manager can fall back across
//! candidates without holding idle connections.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatModel;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse};

/// Trait for chat models.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// The model identifier this instance calls.
    fn model_name(&self) -> &str;
}

/// Instantiates chat models by identifier.
pub trait ModelFactory: Send + Sync {
    fn build(&self, model: &str) -> Result<Arc<dyn ChatModel>, LlmError>;
}

/// Factory producing [`OpenAiCompatModel`] instances against one endpoint.
pub struct OpenAiCompatFactory {
    config: LlmConfig,
}

impl OpenAiCompatFactory {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

impl ModelFactory for OpenAiCompatFactory {
    fn build(&self, model: &str) -> Result<Arc<dyn ChatModel>, LlmError> {
        Ok(Arc::new(OpenAiCompatModel::new(&self.config, model)?))
    }
}

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `RateLimited` (respecting `retry_after_secs`), `Connection`,
/// and `Timeout`. Permanent errors (auth, parse, plain request failures)
/// return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt == config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| LlmError::Connection {
        message: "All retry attempts exhausted".to_string(),
    }))
}

/// Check if an error is retryable (transient).
fn is_retryable(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
    )
}

/// Compute backoff delay, respecting rate limit retry-after hints.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    if let LlmError::RateLimited { retry_after_secs } = err {
        let server_ms = retry_after_secs * 1000;
        let computed = compute_exponential_backoff(config, attempt);
        return server_ms.max(computed);
    }
    compute_exponential_backoff(config, attempt)
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Up to 25% jitter
        let jitter = (capped as f64 * 0.25 * subsec_fraction()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Cheap pseudo-random fraction for jitter without pulling in a rand crate.
fn subsec_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
