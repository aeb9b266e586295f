use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{truncate_text, SUPPORTED_LANGUAGES};
use crate::config::GttsConfig;
use crate::providers::error::{ProviderError, Result};
use crate::providers::llm::http_client;
use crate::providers::{Provider, SpeechProvider};

/// Longest piece of text the translate endpoint voices per request.
const MAX_CHUNK_CHARS: usize = 100;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) vidsynth";

/// Google Translate speech, the keyless endpoint behind the `gTTS` library.
///
/// Narration is split into short chunks. Each chunk is fetched as MP3 and
/// the frames are concatenated into one file.
pub struct GttsSpeech {
    client: Client,
    endpoint: String,
}

impl GttsSpeech {
    pub fn new(config: &GttsConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: config.endpoint.clone(),
        })
    }

    fn voice_for(language: &str) -> &str {
        if SUPPORTED_LANGUAGES.contains(&language) {
            language
        } else {
            "en"
        }
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        language: &str,
        idx: usize,
        total: usize,
    ) -> Result<Vec<u8>> {
        let total = total.to_string();
        let idx = idx.to_string();
        let textlen = chunk.chars().count().to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", language),
                ("client", "tw-ob"),
                ("total", total.as_str()),
                ("idx", idx.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::SynthesisFailed(format!(
                "gTTS request {} of {} failed ({})",
                idx,
                total,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::SynthesisFailed(
                "gTTS returned empty audio".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}

/// Splits `text` on whitespace into pieces of at most `max` characters.
/// Words longer than `max` are cut.
fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if word_len > max {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

impl Provider for GttsSpeech {
    fn name(&self) -> &str {
        "gtts"
    }
}

#[async_trait]
impl SpeechProvider for GttsSpeech {
    async fn synthesize(&self, text: &str, language: &str, output_path: &Path) -> Result<PathBuf> {
        let chunks = split_chunks(truncate_text(text), MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(ProviderError::SynthesisFailed(
                "no text to synthesize".to_string(),
            ));
        }

        let voice = Self::voice_for(language);
        log::info!(
            "Synthesizing {} narration with gTTS in {} request(s)",
            voice,
            chunks.len()
        );

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            audio.extend(self.fetch_chunk(chunk, voice, idx, chunks.len()).await?);
        }

        let path = output_path.with_extension("mp3");
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| ProviderError::io(&path, e))?;
        Ok(path)
    }
}
