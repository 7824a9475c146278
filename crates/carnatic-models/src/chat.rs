//! OpenAI-compatible chat completion client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use carnatic_core::{CarnaticError, LanguageModel, LlmConfig, Result};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat completion client for Groq and other OpenAI-compatible endpoints.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl ChatCompletionsClient {
    /// Build a client from config, reading the API key from the configured
    /// environment variable.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            CarnaticError::config(format!("environment variable {} is not set", config.api_key_env))
        })?;
        Self::with_api_key(config, api_key)
    }

    /// Build a client with an explicit API key.
    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CarnaticError::config(format!("Failed to build HTTP client: {}", e)))?;

        info!("Language model client: {} at {}", config.model, config.base_url);

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout,
        })
    }

    /// Full URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        debug!("Sending {} prompt chars to {}", prompt.len(), self.model);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CarnaticError::timeout("language model request", self.timeout.as_millis() as u64)
                } else {
                    CarnaticError::upstream(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CarnaticError::upstream(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CarnaticError::upstream(format!("malformed response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CarnaticError::upstream("response contained no message"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = LlmConfig {
            base_url: "https://api.groq.com/openai/v1/".to_string(),
            ..LlmConfig::default()
        };
        let client = ChatCompletionsClient::with_api_key(&config, "key").unwrap();
        assert_eq!(client.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(client.model_name(), "llama3-8b-8192");
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = LlmConfig {
            api_key_env: "CARNATIC_TEST_UNSET_KEY_VARIABLE".to_string(),
            ..LlmConfig::default()
        };
        match ChatCompletionsClient::new(&config) {
            Err(e) => assert_eq!(e.error_code(), "CONFIG_ERROR"),
            Ok(_) => panic!("expected missing key error"),
        }
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Sankarabharanam"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Sankarabharanam"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_upstream_error() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client = ChatCompletionsClient::with_api_key(&config, "key").unwrap();
        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(
            err,
            CarnaticError::UpstreamModel { .. } | CarnaticError::Timeout { .. }
        ));
    }
}
