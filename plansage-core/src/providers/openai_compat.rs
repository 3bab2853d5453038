//! OpenAI-compatible chat model client.
//!
//! Supports Groq (the default endpoint), OpenAI, Ollama, vLLM, and any
//! endpoint that follows the OpenAI chat completions API format.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::providers::ChatModel;
use crate::types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};

/// Chat model client for one OpenAI-compatible endpoint and model.
pub struct OpenAiCompatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatModel {
    /// Create a client for `model` against the configured endpoint.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`. Local endpoints (Ollama, vLLM, LM Studio)
    /// don't require a key and get a placeholder bearer token.
    pub fn new(config: &LlmConfig, model: &str) -> Result<Self, LlmError> {
        let is_local =
            config.base_url.contains("localhost") || config.base_url.contains("127.0.0.1");

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .or_else(|| {
                if is_local {
                    debug!("No API key set for local endpoint; using placeholder bearer token");
                    Some("local".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!("env var '{}' not set", config.api_key_env),
            })?;

        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    /// Convert messages to the OpenAI chat format.
    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": msg.content })
            })
            .collect()
    }

    /// Parse an OpenAI-format response body into a CompletionResponse.
    fn parse_response(body: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice =
            body.get("choices")
                .and_then(|c| c.get(0))
                .ok_or_else(|| LlmError::ResponseParse {
                    message: "No choices in response".to_string(),
                })?;

        let message = choice.get("message").ok_or_else(|| LlmError::ResponseParse {
            message: "No message in choice".to_string(),
        })?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(|s| s.to_string());

        let usage_obj = body.get("usage");
        let usage = TokenUsage {
            input_tokens: usage_obj
                .and_then(|u| u.get("prompt_tokens"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize,
            output_tokens: usage_obj
                .and_then(|u| u.get("completion_tokens"))
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize,
        };

        let resp_model = body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(CompletionResponse {
            message: Message::assistant(content),
            usage,
            model: resp_model,
            finish_reason,
        })
    }

    /// Map a non-success HTTP status to the error taxonomy.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "OpenAI-compatible".to_string(),
            },
            429 => {
                // Try to extract "try again in Xs" from the error message
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            408 => LlmError::Timeout { timeout_secs: 0 },
            status if status >= 500 => LlmError::Connection {
                message: format!("Server error ({status}): {body}"),
            },
            status => LlmError::ApiRequest {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": Self::messages_to_json(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        debug!(url = %url, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    LlmError::Connection {
                        message: format!("Connection failed: {e}"),
                    }
                } else {
                    LlmError::ApiRequest {
                        message: format!("Request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let parsed: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {e}"),
            })?;

        Self::parse_response(&parsed, &self.model)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key_env: "PLANSAGE_TEST_UNSET_KEY".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let model = OpenAiCompatModel::new(&test_config(), "llama-3.1-8b-instant").unwrap();
        assert_eq!(model.model_name(), "llama-3.1-8b-instant");
    }

    #[test]
    fn test_remote_endpoint_missing_key_fails() {
        let config = LlmConfig {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "PLANSAGE_TEST_UNSET_KEY".to_string(),
            ..Default::default()
        };
        let result = OpenAiCompatModel::new(&config, "llama-3.3-70b-versatile");
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
    }

    #[test]
    fn test_messages_to_json_roles() {
        let messages = vec![
            Message::system("instructions"),
            Message::user("question"),
            Message::assistant("answer"),
        ];
        let converted = OpenAiCompatModel::messages_to_json(&messages);
        assert_eq!(converted[0]["role"], "system");
        assert_eq!(converted[1]["role"], "user");
        assert_eq!(converted[2]["role"], "assistant");
        assert_eq!(converted[1]["content"], "question");
    }

    #[test]
    fn test_parse_response_extracts_text_and_usage() {
        let body = json!({
            "model": "llama-3.3-70b-versatile",
            "choices": [{
                "message": { "role": "assistant", "content": "The plan covers X." },
                "finish_reason": "stop",
            }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 18 },
        });
        let response = OpenAiCompatModel::parse_response(&body, "fallback-model").unwrap();
        assert_eq!(response.text(), "The plan covers X.");
        assert_eq!(response.usage.input_tokens, 120);
        assert_eq!(response.usage.output_tokens, 18);
        assert_eq!(response.model, "llama-3.3-70b-versatile");
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_response_without_choices_fails() {
        let body = json!({ "usage": {} });
        let result = OpenAiCompatModel::parse_response(&body, "m");
        assert!(matches!(result, Err(LlmError::ResponseParse { .. })));
    }

    #[test]
    fn test_map_http_error_auth() {
        let err = OpenAiCompatModel::map_http_error(reqwest::StatusCode::UNAUTHORIZED, "{}");
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn test_map_http_error_rate_limit_parses_retry_after() {
        let body = r#"{"error": {"message": "Rate limit reached, please try again in 12s"}}"#;
        let err =
            OpenAiCompatModel::map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert!(matches!(
            err,
            LlmError::RateLimited {
                retry_after_secs: 12
            }
        ));
    }

    #[test]
    fn test_map_http_error_server_error_is_transient() {
        let err = OpenAiCompatModel::map_http_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "boom",
        );
        assert!(matches!(err, LlmError::Connection { .. }));
    }
}
