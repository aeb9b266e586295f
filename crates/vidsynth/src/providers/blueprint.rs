use std::sync::Arc;

use async_trait::async_trait;

use super::error::{ProviderError, Result};
use super::llm::{parse_json_reply, CompletionRequest, LlmClient};
use super::{BlueprintProvider, Provider};
use crate::artifacts::{Blueprint, Script};
use crate::worker::job::StyleProfile;

const SYSTEM_PROMPT: &str =
    "You are an expert animation director. Generate animation blueprints in valid JSON format only.";

/// Blueprint generation over any [`LlmClient`].
pub struct LlmBlueprintProvider {
    client: Arc<dyn LlmClient>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmBlueprintProvider {
    pub fn new(client: Arc<dyn LlmClient>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            client,
            temperature,
            max_tokens,
        }
    }
}

pub(crate) fn blueprint_prompt(script: &Script, style: &StyleProfile) -> Result<String> {
    let scenes = serde_json::to_string_pretty(&script.scenes)
        .map_err(|e| ProviderError::GenerationFailed(format!("Cannot encode scenes: {}", e)))?;

    Ok(format!(
        r#"Create animation blueprint for these scenes:

Scenes: {scenes}
Style: {style}
Colors: {colors}
Animation speed: {speed:?}
Text style: {text:?}
Transitions: {transitions:?}

Generate:
1. Storyboard frames
2. Animation elements
3. Animation instructions
4. Timing markers
5. Transitions

Return valid JSON with this structure:
{{
  "storyboard": [...],
  "elements": [...],
  "animation_instructions": [...],
  "timing": [...],
  "transitions": [...],
  "asset_prompts": [...]
}}

Return only valid JSON, no other text."#,
        style = style.style,
        colors = style.colors_csv(),
        speed = style.animation_speed,
        text = style.text_style,
        transitions = style.transitions,
    ))
}

impl Provider for LlmBlueprintProvider {
    fn name(&self) -> &str {
        self.client.name()
    }
}

#[async_trait]
impl BlueprintProvider for LlmBlueprintProvider {
    async fn generate_blueprint(&self, script: &Script, style: &StyleProfile) -> Result<Blueprint> {
        log::info!("Creating animation blueprint using {}", self.name());

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: blueprint_prompt(script, style)?,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let raw = self.client.complete(&request).await?;
        let blueprint: Blueprint = parse_json_reply(self.name(), &raw)?;

        log::info!(
            "Blueprint created with {} storyboard frames",
            blueprint.storyboard.len()
        );
        Ok(blueprint.with_provider(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::Scene;
    use crate::providers::fake::FakeLlm;
    use crate::worker::job::StyleType;

    fn script() -> Script {
        Script::from_scenes(
            "Tides",
            "infographic motion graphics",
            vec![Scene {
                scene_number: 1,
                duration: 12.0,
                narration_text: "The moon pulls the sea.".to_string(),
                concept: "gravity".to_string(),
                ..Default::default()
            }],
        )
    }

    #[test]
    fn test_prompt_includes_scenes_and_colors() {
        let style = StyleProfile::new(StyleType::Infographic, "navy, teal");
        let prompt = blueprint_prompt(&script(), &style).unwrap();
        assert!(prompt.contains("The moon pulls the sea."));
        assert!(prompt.contains("Colors: navy,teal"));
        assert!(prompt.contains("Style: infographic motion graphics"));
    }

    #[tokio::test]
    async fn test_generate_blueprint() {
        let llm = Arc::new(FakeLlm::new("phi3").with_reply(
            r#"{"storyboard": [{"scene": 1, "description": "Moon over water"}],
                "transitions": [{"from_scene": 1, "to_scene": 2, "transition_type": "fade"}]}"#,
        ));
        let provider = LlmBlueprintProvider::new(llm.clone(), 0.6, 2000);
        let style = StyleProfile::new(StyleType::Infographic, "navy");

        let blueprint = provider.generate_blueprint(&script(), &style).await.unwrap();

        assert_eq!(blueprint.provider.as_deref(), Some("phi3"));
        assert_eq!(blueprint.frame_for(1).unwrap().description, "Moon over water");
        assert_eq!(blueprint.transitions.len(), 1);
        assert!(blueprint.elements.is_empty());
        assert_eq!(llm.last_request().unwrap().temperature, 0.6);
    }

    #[tokio::test]
    async fn test_generate_blueprint_invalid_json() {
        let llm = Arc::new(FakeLlm::new("mistral").with_reply("I cannot help with that."));
        let provider = LlmBlueprintProvider::new(llm, 0.6, 2000);
        let style = StyleProfile::new(StyleType::Infographic, "navy");

        let err = provider
            .generate_blueprint(&script(), &style)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::GenerationFailed(_)));
    }
}
