use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{http_client, CompletionRequest, LlmClient};
use crate::config::OllamaConfig;
use crate::providers::error::{ProviderError, Result};

/// Local Ollama server running the phi3 model.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "phi3"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = GenerateRequest {
            model: &self.model,
            system: &request.system,
            prompt: &request.prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        log::debug!("Calling Ollama model {} at {}", self.model, self.base_url);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::GenerationFailed(format!(
                "Ollama request failed ({}): {}",
                status, body
            )));
        }

        let reply: GenerateResponse = response.json().await?;
        if reply.response.trim().is_empty() {
            return Err(ProviderError::GenerationFailed(
                "Ollama returned an empty response".to_string(),
            ));
        }
        Ok(reply.response)
    }
}
