use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::truncate_text;
use crate::config::SarvamConfig;
use crate::providers::error::{ProviderError, Result};
use crate::providers::llm::http_client;
use crate::providers::{Provider, SpeechProvider};

const SAMPLE_RATE: u32 = 22050;

/// Sarvam AI text-to-speech for Indian languages and English.
pub struct SarvamSpeech {
    client: Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    inputs: Vec<&'a str>,
    target_language_code: String,
    speaker: &'static str,
    pitch: f32,
    pace: f32,
    loudness: f32,
    speech_sample_rate: u32,
    enable_preprocessing: bool,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    #[serde(default)]
    audios: Vec<String>,
}

impl SarvamSpeech {
    pub fn new(config: &SarvamConfig, api_key: SecretString, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn speaker_for(language: &str) -> &'static str {
        match language {
            "hi" => "meera",
            "ta" => "pallavi",
            "te" => "shruti",
            _ => "anushka",
        }
    }

    fn request<'a>(&'a self, text: &'a str, language: &str) -> TtsRequest<'a> {
        TtsRequest {
            inputs: vec![truncate_text(text)],
            target_language_code: format!("{}-IN", language),
            speaker: Self::speaker_for(language),
            pitch: 0.0,
            pace: 1.0,
            loudness: 1.5,
            speech_sample_rate: SAMPLE_RATE,
            enable_preprocessing: true,
            model: &self.model,
        }
    }
}

impl Provider for SarvamSpeech {
    fn name(&self) -> &str {
        "sarvam"
    }
}

#[async_trait]
impl SpeechProvider for SarvamSpeech {
    async fn synthesize(&self, text: &str, language: &str, output_path: &Path) -> Result<PathBuf> {
        log::info!(
            "Synthesizing {} narration with Sarvam speaker {}",
            language,
            Self::speaker_for(language)
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-subscription-key", self.api_key.expose_secret())
            .json(&self.request(text, language))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::SynthesisFailed(format!(
                "Sarvam request failed ({}): {}",
                status, body
            )));
        }

        let reply: TtsResponse = response.json().await?;
        let encoded = reply.audios.into_iter().next().ok_or_else(|| {
            ProviderError::SynthesisFailed("Sarvam returned no audio".to_string())
        })?;
        let audio = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| ProviderError::SynthesisFailed(format!("Invalid Sarvam audio: {}", e)))?;

        tokio::fs::write(output_path, &audio)
            .await
            .map_err(|e| ProviderError::io(output_path, e))?;

        Ok(output_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech() -> SarvamSpeech {
        SarvamSpeech::new(
            &SarvamConfig::default(),
            SecretString::from("test-key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_speaker_map() {
        assert_eq!(SarvamSpeech::speaker_for("hi"), "meera");
        assert_eq!(SarvamSpeech::speaker_for("ta"), "pallavi");
        assert_eq!(SarvamSpeech::speaker_for("te"), "shruti");
        assert_eq!(SarvamSpeech::speaker_for("en"), "anushka");
    }

    #[test]
    fn test_request_payload() {
        let speech = speech();
        let json = serde_json::to_value(speech.request("नमस्ते", "hi")).unwrap();

        assert_eq!(json["inputs"][0], "नमस्ते");
        assert_eq!(json["target_language_code"], "hi-IN");
        assert_eq!(json["speaker"], "meera");
        assert_eq!(json["model"], "bulbul:v2");
        assert_eq!(json["speech_sample_rate"], 22050);
        assert_eq!(json["enable_preprocessing"], true);
    }
}
