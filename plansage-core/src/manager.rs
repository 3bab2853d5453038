//! Response manager — ordered model fallback.
//!
//! Resolves one answer from a priority-ordered candidate list: candidates
//! are tried strictly in the supplied order, each failure is logged and
//! discarded, and the first success wins. No health state is kept between
//! calls and the list is never reordered. When every candidate fails the
//! manager returns a fixed fallback answer instead of an error.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RetryConfig;
use crate::prompt::PromptTemplate;
use crate::providers::{with_retry, ModelFactory};
use crate::types::{CompletionRequest, Message, ModelCandidate};

/// Answer returned when every candidate model has failed.
pub const NO_ANSWER_FALLBACK: &str = "Unable to generate a response for this query.";

/// Transport-level retries within one candidate call, independent of
/// candidate fallback.
pub const TRANSPORT_RETRIES: u32 = 3;

/// Per-call generation options.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub temperature: f32,
    /// Default maximum output tokens; a candidate's own limit overrides it.
    pub max_tokens: Option<u32>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
        }
    }
}

/// Resolves one model response from a priority-ordered candidate list.
pub struct ResponseManager {
    candidates: Vec<ModelCandidate>,
    factory: Arc<dyn ModelFactory>,
    retry: RetryConfig,
}

impl ResponseManager {
    pub fn new(candidates: Vec<ModelCandidate>, factory: Arc<dyn ModelFactory>) -> Self {
        Self::with_retry(candidates, factory, RetryConfig::default())
    }

    /// Create a manager with custom backoff timing. The retry count itself
    /// is pinned to [`TRANSPORT_RETRIES`] regardless of the supplied config.
    pub fn with_retry(
        candidates: Vec<ModelCandidate>,
        factory: Arc<dyn ModelFactory>,
        retry: RetryConfig,
    ) -> Self {
        let retry = RetryConfig {
            max_retries: TRANSPORT_RETRIES,
            ..retry
        };
        Self {
            candidates,
            factory,
            retry,
        }
    }

    /// The configured candidate list, in priority order.
    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    /// Bind `variables` into `prompt` and resolve an answer.
    ///
    /// A binding failure would fail identically for every candidate, so it
    /// short-circuits straight to the fallback answer.
    pub async fn resolve(
        &self,
        prompt: &PromptTemplate,
        variables: &Value,
        options: ResolveOptions,
    ) -> String {
        match prompt.bind(variables) {
            Ok(messages) => self.resolve_messages(messages, options).await,
            Err(e) => {
                warn!(error = %e, "Prompt binding failed; returning fallback answer");
                NO_ANSWER_FALLBACK.to_string()
            }
        }
    }

    /// Resolve an answer for a pre-built message list.
    ///
    /// Candidates are tried in list order, one pass, first success wins;
    /// the answer text of the winning completion is returned. Exhaustion
    /// yields [`NO_ANSWER_FALLBACK`].
    pub async fn resolve_messages(
        &self,
        messages: Vec<Message>,
        options: ResolveOptions,
    ) -> String {
        for candidate in &self.candidates {
            let model_id = candidate.model();
            let max_tokens = candidate.token_limit(options.max_tokens);
            info!(
                model = model_id,
                temperature = options.temperature,
                max_tokens = ?max_tokens,
                "Trying candidate model"
            );

            let model = match self.factory.build(model_id) {
                Ok(model) => model,
                Err(e) => {
                    warn!(model = model_id, error = %e, "Candidate failed to initialize, trying next");
                    continue;
                }
            };

            let request = CompletionRequest {
                messages: messages.clone(),
                temperature: options.temperature,
                max_tokens,
                model: Some(model_id.to_string()),
            };

            let attempt = with_retry(&self.retry, || {
                let model = model.clone();
                let request = request.clone();
                async move { model.complete(request).await }
            })
            .await;

            match attempt {
                Ok(response) => {
                    debug!(
                        model = model_id,
                        output_tokens = response.usage.output_tokens,
                        "Candidate model succeeded"
                    );
                    return response.text().to_string();
                }
                Err(e) => {
                    warn!(model = model_id, error = %e, "Candidate model failed, trying next");
                }
            }
        }

        warn!("All candidate models failed; returning fallback answer");
        NO_ANSWER_FALLBACK.to_string()
    }
}
