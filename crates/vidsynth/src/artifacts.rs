//! Typed artifacts produced by the pipeline stages.
//!
//! LLM output is loosely shaped, so every field carries a serde default and
//! a missing key never fails deserialization on its own.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─── Script ─────────────────────────────────────────────────────────────────

/// One scene of a generated script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default, alias = "number")]
    pub scene_number: u32,
    /// Scene length in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default, alias = "narration")]
    pub narration_text: String,
    #[serde(default)]
    pub concept: String,
    #[serde(default)]
    pub explanation: String,
}

/// A generated narration script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    /// All scene narrations joined with spaces.
    #[serde(default)]
    pub narration: String,
    #[serde(default)]
    pub voiceover_text: String,
    #[serde(default)]
    pub total_duration: f64,
    /// Name of the provider that produced this script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Script {
    /// Builds a script from scenes, deriving the narration and totals.
    pub fn from_scenes(topic: &str, style: &str, scenes: Vec<Scene>) -> Self {
        let mut script = Self {
            topic: topic.to_string(),
            style: style.to_string(),
            scenes,
            ..Default::default()
        };
        script.refresh_totals();
        script
    }

    /// Recomputes `narration`, `voiceover_text` and `total_duration` from the scenes.
    pub fn refresh_totals(&mut self) {
        let narration = self
            .scenes
            .iter()
            .map(|s| s.narration_text.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        self.voiceover_text = narration.clone();
        self.narration = narration;
        self.total_duration = self.scenes.iter().map(|s| s.duration).sum();
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }
}

// ─── Blueprint ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryboardFrame {
    #[serde(default)]
    pub scene: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub composition: String,
    #[serde(default)]
    pub visual_elements: Vec<String>,
    #[serde(default)]
    pub text_overlays: Vec<String>,
    #[serde(default)]
    pub animation_movement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationElement {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub element_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationInstruction {
    #[serde(default)]
    pub scene: u32,
    #[serde(default)]
    pub entry_animation: String,
    #[serde(default)]
    pub main_animation: String,
    #[serde(default)]
    pub exit_animation: String,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingMarker {
    #[serde(default)]
    pub scene: u32,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    #[serde(default)]
    pub from_scene: u32,
    #[serde(default)]
    pub to_scene: u32,
    #[serde(default)]
    pub transition_type: String,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetPrompt {
    #[serde(default)]
    pub element_name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub asset_type: String,
}

/// Animation blueprint derived from a script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub storyboard: Vec<StoryboardFrame>,
    #[serde(default)]
    pub elements: Vec<AnimationElement>,
    #[serde(default)]
    pub animation_instructions: Vec<AnimationInstruction>,
    #[serde(default)]
    pub timing: Vec<TimingMarker>,
    #[serde(default)]
    pub transitions: Vec<TransitionSpec>,
    #[serde(default)]
    pub asset_prompts: Vec<AssetPrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Blueprint {
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    /// Returns the storyboard frame for a scene, if the model produced one.
    pub fn frame_for(&self, scene: u32) -> Option<&StoryboardFrame> {
        self.storyboard.iter().find(|f| f.scene == scene)
    }
}

// ─── Audio ──────────────────────────────────────────────────────────────────

/// Result of the audio stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioArtifact {
    Synthesized {
        path: PathBuf,
        provider: String,
        language: String,
    },
    /// Empty stand-in written after every speech provider failed.
    Placeholder { path: PathBuf, reason: String },
    Skipped { reason: String },
}

impl AudioArtifact {
    /// Path to hand to the renderer, if any file exists for this artifact.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            AudioArtifact::Synthesized { path, .. } | AudioArtifact::Placeholder { path, .. } => {
                Some(path)
            }
            AudioArtifact::Skipped { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AudioArtifact::Placeholder { .. })
    }
}
