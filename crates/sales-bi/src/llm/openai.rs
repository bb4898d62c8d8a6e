//! OpenAI-compatible chat completions generator.
//!
//! Every failure is classified into a `GeneratorError` kind so the router can
//! decide on fallback without inspecting messages.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{format_rag_prompt, AnswerGenerator, GenerationConfig};
use crate::config::LlmConfig;
use crate::error::GeneratorError;
use crate::types::RetrievedRecord;

pub struct OpenAiGenerator {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    config: GenerationConfig,
    client: Client,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    /// The API key may be absent; that only surfaces as an `Auth` error when a
    /// question actually reaches the generator.
    pub fn new(config: &LlmConfig) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(300))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| GeneratorError::Network(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(
            model = %config.model,
            endpoint = %config.endpoint,
            "Creating OpenAI generator"
        );

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            config: GenerationConfig::from(config),
            client,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        query: &str,
        context: &[RetrievedRecord],
    ) -> Result<String, GeneratorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GeneratorError::Auth("OPENAI_API_KEY is not set".to_string()))?;

        let prompt = format_rag_prompt(query, context);
        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeneratorError::Network(format!("request to {} timed out", self.endpoint))
                } else if e.is_connect() {
                    GeneratorError::Network(format!(
                        "failed to connect to {}: {}",
                        self.endpoint, e
                    ))
                } else {
                    GeneratorError::Network(format!("request to {} failed: {}", self.endpoint, e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GeneratorError::Network(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        parse_completion(&body)
    }
}

/// Map a non-success HTTP status (and its body) onto an error kind.
fn classify_status(status: StatusCode, body: &str) -> GeneratorError {
    let preview: String = body.chars().take(300).collect();
    let detail = format!("HTTP {}: {}", status, preview);

    if body.contains("insufficient_quota") || status == StatusCode::TOO_MANY_REQUESTS {
        GeneratorError::Quota(detail)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        GeneratorError::Auth(detail)
    } else if status.is_server_error() {
        GeneratorError::Network(detail)
    } else {
        GeneratorError::MalformedResponse(detail)
    }
}

fn parse_completion(body: &str) -> Result<String, GeneratorError> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(GeneratorError::MalformedResponse(format!(
            "endpoint returned HTML instead of JSON: {}",
            preview
        )));
    }

    let result: OpenAIResponse = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        GeneratorError::MalformedResponse(format!("{}. Body: {}", e, preview))
    })?;

    result
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GeneratorError::MalformedResponse("empty choices array".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth() {
        let body = r#"{"error":{"code":"invalid_api_key"}}"#;
        let err = classify_status(StatusCode::UNAUTHORIZED, body);
        assert_eq!(err.kind(), "auth");
        assert_eq!(classify_status(StatusCode::FORBIDDEN, "").kind(), "auth");
    }

    #[test]
    fn test_classify_quota() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").kind(), "quota");
        let body = r#"{"error":{"type":"insufficient_quota","code":"insufficient_quota"}}"#;
        assert_eq!(classify_status(StatusCode::FORBIDDEN, body).kind(), "quota");
    }

    #[test]
    fn test_classify_server_errors_as_network() {
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY, "<html>").kind(), "network");
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").kind(), "network");
    }

    #[test]
    fn test_classify_other_client_errors_as_malformed() {
        assert_eq!(classify_status(StatusCode::BAD_REQUEST, "bad").kind(), "malformed_response");
    }

    #[test]
    fn test_parse_completion() {
        let body =
            r#"{"choices":[{"message":{"role":"assistant","content":"Lanterns sold best."}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Lanterns sold best.");
    }

    #[test]
    fn test_parse_completion_failures() {
        assert_eq!(parse_completion(r#"{"choices":[]}"#).unwrap_err().kind(), "malformed_response");
        assert_eq!(parse_completion("<!DOCTYPE html>").unwrap_err().kind(), "malformed_response");
        assert_eq!(parse_completion("not json").unwrap_err().kind(), "malformed_response");
        let null_content = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert_eq!(parse_completion(null_content).unwrap_err().kind(), "malformed_response");
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error_without_network() {
        let generator = OpenAiGenerator::new(&LlmConfig {
            endpoint: "http://127.0.0.1:9/never".into(),
            ..LlmConfig::default()
        })
        .unwrap();
        let err = generator.generate("anything", &[]).await.unwrap_err();
        assert!(matches!(err, GeneratorError::Auth(_)));
    }
}
