//! Chat-completion client with rate-limit classification.
//!
//! A single-attempt call to an OpenAI-compatible chat API. No internal
//! retry: HTTP 429 is parsed into a typed [`RateLimitSignal`] and raised
//! as [`RagError::RateLimited`] so callers can react to daily limits
//! differently from per-minute ones; every other failure becomes a generic
//! [`RagError::CompletionFailed`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{error, info};

use crate::config::CompletionConfig;
use crate::error::RagError;
use crate::models::{RateLimitKind, RateLimitSignal};

/// Returned without a network call when no API key is configured.
pub const NOT_CONFIGURED_REPLY: &str =
    "I'm sorry, but the AI service is not configured. Please check the API key settings.";

/// Shown in place of any non-rate-limit completion failure.
pub const SERVICE_TROUBLE_REPLY: &str =
    "I'm experiencing technical difficulties. Please try again later.";

static RETRY_AFTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"try again in ([0-9]+(?:\.[0-9]+)?)s").expect("retry-after pattern is valid")
});

pub struct CompletionClient {
    model: String,
    api_url: String,
    api_key: Option<String>,
    persona: String,
    client: reqwest::Client,
}

impl CompletionClient {
    pub fn from_config(config: &CompletionConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::CompletionFailed(format!("http client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            api_url: config.api_url.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
            persona: config.persona.clone(),
            client,
        })
    }

    /// Whether an API key was found in the environment.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a completion for `query` grounded in `context`.
    ///
    /// Sends three messages in order: the system persona, a system context
    /// block, and the user query. Exactly one attempt; retry policy, if
    /// any, belongs to the caller.
    pub async fn generate_response(
        &self,
        query: &str,
        context: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, RagError> {
        let Some(api_key) = self.api_key.as_deref() else {
            error!("completion API key not configured");
            return Ok(NOT_CONFIGURED_REPLY.to_string());
        };

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.persona},
                {"role": "system", "content": format!("Context:\n{}", context)},
                {"role": "user", "content": query},
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::CompletionFailed(format!("transport: {}", e)))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let body_text = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body_text);
            let signal = parse_rate_limit(&message);
            return Err(RagError::RateLimited {
                kind: signal.kind,
                retry_after_secs: signal.retry_after_secs,
            });
        }

        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::CompletionFailed(format!(
                "API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::CompletionFailed(format!("response body: {}", e)))?;

        let text = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                RagError::CompletionFailed("response missing choices[0].message.content".to_string())
            })?;

        info!("generated chat response");
        Ok(text.to_string())
    }
}

/// Pull `error.message` out of a 429 body; fall back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.to_string())
}

/// Classify a provider rate-limit message.
///
/// The limit window is matched by case-insensitive substring; the
/// suggested wait comes from a `"try again in Ns"` clause, with fractional
/// seconds truncated to whole seconds.
pub fn parse_rate_limit(message: &str) -> RateLimitSignal {
    let lower = message.to_lowercase();

    let kind = if lower.contains("tokens per minute") {
        RateLimitKind::TokensPerMinute
    } else if lower.contains("requests per minute") {
        RateLimitKind::RequestsPerMinute
    } else if lower.contains("tokens per day") {
        RateLimitKind::TokensPerDay
    } else if lower.contains("requests per day") {
        RateLimitKind::RequestsPerDay
    } else {
        RateLimitKind::Unknown
    };

    let retry_after_secs = RETRY_AFTER_RE
        .captures(&lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|secs| secs as u64);

    RateLimitSignal {
        kind,
        retry_after_secs,
    }
}
