//! One call: `(system_prompt, user_prompt, timeout) -> text`. Chooses
//! vendor, sets model, returns the raw string (spec.md §4.1).

use std::time::Duration;

use aav3_core::AppError;
use async_trait::async_trait;
use serde_json::json;

const DEFAULT_MAX_TOKENS: u32 = 4000;

/// Abstraction over "send one chat-completion call", so callers (the agent
/// role functions, the orchestrator) can be exercised against a fake in
/// tests without a live vendor endpoint.
#[async_trait]
pub trait Llm: Send + Sync {
    async fn call(&self, system_prompt: &str, user_prompt: &str, timeout_sec: u64) -> Result<String, AppError>;
}

#[async_trait]
impl Llm for LlmClient {
    async fn call(&self, system_prompt: &str, user_prompt: &str, timeout_sec: u64) -> Result<String, AppError> {
        LlmClient::call(self, system_prompt, user_prompt, timeout_sec).await
    }
}

/// A thin OpenAI-compatible chat-completions client. Model and vendor base
/// URL are resolved once at construction time from config; this type makes
/// no attempt at multi-model failover or rotation — spec.md treats model
/// selection as a single resolved value, not a pool.
#[derive(Debug, Clone)]
pub struct LlmClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Send one chat completion request. Returns the raw text response,
    /// trimmed of leading/trailing whitespace.
    ///
    /// - `ErrorKind::LLMTimeout` if the call exceeds `timeout_sec`.
    /// - `ErrorKind::LLMAuth` on a 401/403 response.
    /// - `ErrorKind::LLMTransport` on any other network/vendor failure.
    pub async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout_sec: u64,
    ) -> Result<String, AppError> {
        self.call_with_max_tokens(system_prompt, user_prompt, timeout_sec, DEFAULT_MAX_TOKENS)
            .await
    }

    pub async fn call_with_max_tokens(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout_sec: u64,
        max_tokens: u32,
    ) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "max_tokens": max_tokens,
            "temperature": 0.2,
        });

        let request = self.client.post(&url).bearer_auth(&self.api_key).json(&body);

        let response = match tokio::time::timeout(Duration::from_secs(timeout_sec), request.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(AppError::LlmTransport(e.to_string())),
            Err(_) => return Err(AppError::LlmTimeout { timeout_sec }),
        };

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AppError::LlmAuth(format!("status {status}")));
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| AppError::LlmTransport(e.to_string()))?;

        if !status.is_success() {
            return Err(AppError::LlmTransport(format!("status {status}: {body_text}")));
        }

        let content = parse_completion_content(&body_text)
            .map_err(|e| AppError::LlmTransport(e.to_string()))?;

        tracing::debug!(model = %self.model, chars = content.len(), "llm call completed");
        Ok(content.trim().to_string())
    }
}

fn parse_completion_content(body: &str) -> Result<String, String> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("invalid completion JSON: {e}"))?;
    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| "missing choices[0].message.content".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_completion_content_from_response_body() {
        let body = r#"{"choices":[{"message":{"content":"  {\"strategy\":\"x\"}  "}}]}"#;
        let content = parse_completion_content(body).unwrap();
        assert_eq!(content.trim(), "{\"strategy\":\"x\"}");
    }

    #[test]
    fn missing_content_field_is_an_error() {
        let body = r#"{"choices":[{"message":{}}]}"#;
        assert!(parse_completion_content(body).is_err());
    }

    #[test]
    fn invalid_json_body_is_an_error() {
        assert!(parse_completion_content("not json").is_err());
    }

    #[tokio::test]
    async fn timeout_yields_llm_timeout_error() {
        let client = LlmClient::new("http://127.0.0.1:1", "test-key", "gpt-4");
        // Port 1 is reserved and non-routable on most hosts; this exercises
        // the timeout/error path without needing a live LLM endpoint.
        let result = client.call("system", "user", 0).await;
        assert!(result.is_err());
    }
}
