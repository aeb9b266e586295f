//! Chat-completion clients used by the script and blueprint providers.

mod mistral;
mod ollama;

pub use mistral::MistralClient;
pub use ollama::OllamaClient;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::error::{ProviderError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One prompt to send to a model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A model endpoint that turns a prompt into text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name as used in config and requests (`mistral`, `phi3`).
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Creates an HTTP client with a connect timeout and an overall request timeout.
pub(crate) fn http_client(request_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}

/// Extracts the JSON object from a model reply.
///
/// Models like to wrap JSON in markdown fences or prose; this returns the
/// slice from the first `{` to the last `}`.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Parses a model reply into `T`, tolerating fences and surrounding prose.
pub fn parse_json_reply<T: DeserializeOwned>(provider: &str, raw: &str) -> Result<T> {
    serde_json::from_str(extract_json(raw)).map_err(|e| {
        ProviderError::GenerationFailed(format!("{} returned invalid JSON: {}", provider, e))
    })
}
