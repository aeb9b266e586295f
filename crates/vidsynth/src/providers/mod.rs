//! Capability interfaces for the external services a job depends on, and
//! their implementations.
//!
//! Each stage talks to one capability trait. The engine only ever holds
//! `Arc<dyn Trait>` values, so tests swap in the fakes from [`fake`].

pub mod blueprint;
pub mod error;
pub mod fake;
pub mod llm;
pub mod render;
pub mod report;
pub mod script;
pub mod tts;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::artifacts::{AudioArtifact, Blueprint, Script};
use crate::worker::job::StyleProfile;

pub use blueprint::LlmBlueprintProvider;
pub use error::{ProviderError, Result};
pub use render::FfmpegRenderer;
pub use report::{GoogleDocsReportWriter, LocalReportWriter};
pub use script::LlmScriptProvider;
pub use tts::{GttsSpeech, PiperSpeech, SarvamSpeech};

/// Anything that can sit in a fallback chain.
pub trait Provider: Send + Sync {
    /// Stable name used in logs, failure records and artifact metadata.
    fn name(&self) -> &str;
}

#[async_trait]
pub trait ScriptProvider: Provider {
    async fn generate_script(
        &self,
        topic: &str,
        style: &StyleProfile,
        duration_secs: u32,
    ) -> Result<Script>;
}

#[async_trait]
pub trait BlueprintProvider: Provider {
    async fn generate_blueprint(&self, script: &Script, style: &StyleProfile) -> Result<Blueprint>;
}

#[async_trait]
pub trait SpeechProvider: Provider {
    /// Writes synthesized speech for `text` to `output_path`.
    async fn synthesize(&self, text: &str, language: &str, output_path: &Path) -> Result<PathBuf>;
}

#[async_trait]
pub trait Renderer: Provider {
    async fn render(&self, request: &RenderRequest) -> Result<PathBuf>;
}

#[async_trait]
pub trait ReportWriter: Provider {
    /// Writes the report and returns where it can be found (URL or path).
    async fn write_report(&self, summary: &ReportSummary) -> Result<String>;
}

/// Everything the renderer needs for one job.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub job_id: String,
    pub script: Script,
    pub blueprint: Blueprint,
    pub style: StyleProfile,
    /// Narration to mux in. `None`, or a missing or empty file, renders silent.
    pub audio_path: Option<PathBuf>,
}

/// Job outcome handed to report writers.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub job_id: String,
    pub topic: String,
    pub style: String,
    pub status: String,
    pub video_path: PathBuf,
    pub script: Script,
    pub blueprint: Blueprint,
    pub audio: Option<AudioArtifact>,
    pub warnings: Vec<String>,
}

impl ReportSummary {
    pub fn title(&self) -> String {
        format!("Video Analysis: {}", self.topic)
    }

    /// Plain-text body shared by every report writer.
    pub fn render_text(&self) -> String {
        let script = serde_json::to_string_pretty(&self.script).unwrap_or_default();
        let blueprint = serde_json::to_string_pretty(&self.blueprint).unwrap_or_default();

        let mut text = format!(
            "Video Synthesis Report\n\
             ======================\n\n\
             Job: {}\n\
             Topic: {}\n\
             Style: {}\n\
             Status: {}\n\
             Video: {}\n",
            self.job_id,
            self.topic,
            self.style,
            self.status,
            self.video_path.display()
        );

        match &self.audio {
            Some(AudioArtifact::Synthesized {
                provider, language, ..
            }) => text.push_str(&format!("Audio: {} ({})\n", provider, language)),
            Some(AudioArtifact::Placeholder { reason, .. }) => {
                text.push_str(&format!("Audio: placeholder ({})\n", reason))
            }
            Some(AudioArtifact::Skipped { reason }) => {
                text.push_str(&format!("Audio: skipped ({})\n", reason))
            }
            None => {}
        }

        if !self.warnings.is_empty() {
            text.push_str("\nWarnings:\n");
            for warning in &self.warnings {
                text.push_str(&format!("- {}\n", warning));
            }
        }

        text.push_str(&format!("\nScript:\n{}\n\nBlueprint:\n{}\n", script, blueprint));
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::Scene;

    #[test]
    fn test_report_text_contains_sections() {
        let summary = ReportSummary {
            job_id: "job-1".to_string(),
            topic: "Photosynthesis".to_string(),
            style: "2D explainer".to_string(),
            status: "COMPLETED".to_string(),
            video_path: PathBuf::from("/videos/video_job-1.mp4"),
            script: Script::from_scenes(
                "Photosynthesis",
                "2D explainer",
                vec![Scene {
                    scene_number: 1,
                    narration_text: "Leaves capture light.".to_string(),
                    ..Default::default()
                }],
            ),
            blueprint: Blueprint::default(),
            audio: Some(AudioArtifact::Placeholder {
                path: PathBuf::from("/tmp/placeholder_job-1.mp3"),
                reason: "all speech providers failed".to_string(),
            }),
            warnings: vec!["audio degraded".to_string()],
        };

        let text = summary.render_text();
        assert_eq!(summary.title(), "Video Analysis: Photosynthesis");
        assert!(text.contains("Topic: Photosynthesis"));
        assert!(text.contains("Video: /videos/video_job-1.mp4"));
        assert!(text.contains("Audio: placeholder"));
        assert!(text.contains("- audio degraded"));
        assert!(text.contains("Leaves capture light."));
    }
}
