use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::{ProviderError, Result};
use super::llm::{parse_json_reply, CompletionRequest, LlmClient};
use super::{Provider, ScriptProvider};
use crate::artifacts::{Scene, Script};
use crate::worker::job::StyleProfile;

const SYSTEM_PROMPT: &str =
    "You are a professional video script writer. Generate video scripts in valid JSON format only.";

#[derive(Debug, Deserialize)]
struct ScriptReply {
    #[serde(default)]
    scenes: Vec<Scene>,
}

/// Script generation over any [`LlmClient`].
pub struct LlmScriptProvider {
    client: Arc<dyn LlmClient>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmScriptProvider {
    pub fn new(client: Arc<dyn LlmClient>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            client,
            temperature,
            max_tokens,
        }
    }
}

pub(crate) fn script_prompt(topic: &str, style: &StyleProfile, duration_secs: u32) -> String {
    format!(
        r#"Generate a video script for: {topic}

Style: {style}
Duration: {duration_secs} seconds

Create scenes with:
1. Scene number
2. Duration (seconds)
3. Narration text
4. Concept explanation
5. Visual description

Return as JSON with this exact structure:
{{
  "scenes": [
    {{
      "scene_number": 1,
      "duration": 15,
      "narration_text": "...",
      "concept": "...",
      "explanation": "..."
    }}
  ]
}}

Generate valid JSON only, no other text."#,
        style = style.style,
    )
}

impl Provider for LlmScriptProvider {
    fn name(&self) -> &str {
        self.client.name()
    }
}

#[async_trait]
impl ScriptProvider for LlmScriptProvider {
    async fn generate_script(
        &self,
        topic: &str,
        style: &StyleProfile,
        duration_secs: u32,
    ) -> Result<Script> {
        log::info!("Generating script for '{}' using {}", topic, self.name());

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: script_prompt(topic, style, duration_secs),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let raw = self.client.complete(&request).await?;
        let reply: ScriptReply = parse_json_reply(self.name(), &raw)?;

        if reply.scenes.is_empty() {
            return Err(ProviderError::GenerationFailed(format!(
                "{} returned a script with no scenes",
                self.name()
            )));
        }

        let script = Script::from_scenes(topic, style.style.as_str(), reply.scenes)
            .with_provider(self.name());
        log::info!("Script generated with {} scenes", script.scenes.len());
        Ok(script)
    }
}
