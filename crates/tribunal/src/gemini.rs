//! Gemini transport behind the `LlmClient` seam.
//!
//! The engine only ever sees `generate(request) -> response | error`; this
//! module owns the wire format, per-request timeout, and the bounded retry
//! with exponential backoff on rate limits and server errors. Schema
//! validation of the returned JSON is the engine's job, not the client's.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::config::{Backend, GeminiConfig, RetryConfig};
use crate::conversation::{ChatRole, PromptMessage};
use crate::error::EngineError;
use crate::metrics::TokenUsage;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Transport-level failures, after the client's own retry budget.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("request timed out")]
    Timeout,

    #[error("api error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("model returned an empty completion")]
    EmptyResponse,
}

/// One structured generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub messages: Vec<PromptMessage>,
    /// Strict response schema for this role (Hypothesis or Verdict).
    pub response_schema: Option<Value>,
    /// Function declarations for the tools the agent may request.
    pub tool_declarations: Vec<Value>,
}

/// The model's reply plus usage accounting.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub latency: Duration,
}

/// The LLM capability consumed by the debate engine. Implementations must be
/// safe to call sequentially from a single run; no call may block forever.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError>;
}

/// REST client for the `generateContent` endpoint.
pub struct GeminiRestClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    temperature: f64,
    max_tokens: u32,
    retry: RetryConfig,
}

impl GeminiRestClient {
    pub fn from_config(gemini: &GeminiConfig, retry: &RetryConfig) -> Result<Self, EngineError> {
        if gemini.backend == Backend::Sdk {
            warn!("no native Gemini SDK backend exists; using the REST transport");
        }
        let api_key = gemini.resolve_api_key()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(gemini.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Configuration(format!("cannot build http client: {e}")))?;
        Ok(Self {
            http,
            api_url: format!("{GEMINI_API_BASE}/{}:generateContent", gemini.model),
            api_key,
            temperature: gemini.temperature,
            max_tokens: gemini.max_tokens,
            retry: retry.clone(),
        })
    }

    fn build_payload(&self, request: &GenerateRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        ChatRole::User => "user",
                        ChatRole::Model => "model",
                    },
                    "parts": [{"text": m.content}],
                })
            })
            .collect();

        let mut generation_config = json!({
            "temperature": self.temperature,
            "maxOutputTokens": self.max_tokens,
        });
        if let Some(schema) = &request.response_schema {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = schema.clone();
        }

        let mut payload = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !request.tool_declarations.is_empty() {
            payload["tools"] = json!([{"functionDeclarations": request.tool_declarations}]);
        }
        payload
    }

    fn parse_response(data: &Value) -> Result<(String, TokenUsage), LlmError> {
        let usage = TokenUsage {
            prompt: data
                .pointer("/usageMetadata/promptTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            completion: data
                .pointer("/usageMetadata/candidatesTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        };

        let mut content = String::new();
        if let Some(parts) = data
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
        {
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    content.push_str(text);
                }
            }
        }
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok((content, usage))
    }
}

#[async_trait]
impl LlmClient for GeminiRestClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let payload = self.build_payload(&request);
        let mut last_error = LlmError::Transport("no attempts made".into());

        for attempt in 0..self.retry.attempts {
            if attempt > 0 {
                let backoff = self.retry.backoff_ms * (1u64 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let started = Instant::now();
            let result = self
                .http
                .post(&self.api_url)
                .query(&[("key", self.api_key.as_str())])
                .json(&payload)
                .send()
                .await;
            let latency = started.elapsed();

            let response = match result {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    warn!(attempt, "gemini request timed out");
                    last_error = LlmError::Timeout;
                    continue;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "gemini transport error");
                    last_error = LlmError::Transport(e.to_string());
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                warn!(attempt, "gemini rate limited");
                last_error = LlmError::RateLimited {
                    attempts: attempt + 1,
                };
                continue;
            }
            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!(attempt, status = status.as_u16(), "gemini server error");
                last_error = LlmError::Api {
                    status: status.as_u16(),
                    body,
                };
                continue;
            }
            if !status.is_success() {
                // Client errors are not retriable — fail fast.
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let data: Value = response
                .json()
                .await
                .map_err(|e| LlmError::Transport(e.to_string()))?;
            let (content, usage) = Self::parse_response(&data)?;
            return Ok(GenerateResponse {
                content,
                usage,
                latency,
            });
        }

        if let LlmError::RateLimited { .. } = last_error {
            return Err(LlmError::RateLimited {
                attempts: self.retry.attempts,
            });
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": {"parts": [{"text": text}]}
            }],
            "usageMetadata": {
                "promptTokenCount": 120,
                "candidatesTokenCount": 34,
                "totalTokenCount": 154
            }
        })
    }

    #[test]
    fn parses_text_and_usage() {
        let (content, usage) = GeminiRestClient::parse_response(&sample_response("hello")).unwrap();
        assert_eq!(content, "hello");
        assert_eq!(usage.prompt, 120);
        assert_eq!(usage.completion, 34);
    }

    #[test]
    fn concatenates_multiple_parts() {
        let data = json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"a\""}, {"text": ": 1}"}]}
            }]
        });
        let (content, usage) = GeminiRestClient::parse_response(&data).unwrap();
        assert_eq!(content, "{\"a\": 1}");
        assert_eq!(usage.prompt, 0);
    }

    #[test]
    fn empty_completion_is_an_error() {
        let err = GeminiRestClient::parse_response(&sample_response("  ")).unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[test]
    fn missing_candidates_is_empty_response() {
        let err = GeminiRestClient::parse_response(&json!({})).unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }
}
