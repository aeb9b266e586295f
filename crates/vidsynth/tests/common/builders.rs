//! Builders for requests and fake provider sets.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use vidsynth::pipeline::StageProviders;
use vidsynth::providers::fake::{
    FakeBlueprintProvider, FakeRenderer, FakeReportWriter, FakeScriptProvider, FakeSpeech,
};
use vidsynth::providers::{
    BlueprintProvider, Renderer, ReportWriter, ScriptProvider, SpeechProvider,
};
use vidsynth::{StyleProfile, StyleType, VideoRequest};

/// A request for `topic` with a plain 2D style.
pub fn request(topic: &str) -> VideoRequest {
    VideoRequest::new(
        topic,
        StyleProfile::new(StyleType::Explainer2d, "#2e7d32,#ffffff"),
    )
}

/// Builder for `StageProviders`.
///
/// Unset capabilities get a single succeeding fake.
pub struct ProvidersBuilder {
    script: Vec<Arc<dyn ScriptProvider>>,
    blueprint: Vec<Arc<dyn BlueprintProvider>>,
    speech: Vec<Arc<dyn SpeechProvider>>,
    renderer: Option<Arc<dyn Renderer>>,
    reports: Vec<Arc<dyn ReportWriter>>,
}

impl ProvidersBuilder {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            blueprint: Vec::new(),
            speech: Vec::new(),
            renderer: None,
            reports: Vec::new(),
        }
    }

    pub fn script(mut self, provider: &Arc<FakeScriptProvider>) -> Self {
        self.script.push(provider.clone());
        self
    }

    pub fn blueprint(mut self, provider: &Arc<FakeBlueprintProvider>) -> Self {
        self.blueprint.push(provider.clone());
        self
    }

    pub fn speech(mut self, provider: &Arc<FakeSpeech>) -> Self {
        self.speech.push(provider.clone());
        self
    }

    pub fn renderer(mut self, renderer: &Arc<FakeRenderer>) -> Self {
        self.renderer = Some(renderer.clone());
        self
    }

    pub fn report(mut self, writer: &Arc<FakeReportWriter>) -> Self {
        self.reports.push(writer.clone());
        self
    }

    /// `output_dir` is where the default renderer writes videos.
    pub fn build(self, output_dir: &Path) -> StageProviders {
        let script = if self.script.is_empty() {
            vec![Arc::new(FakeScriptProvider::new("mistral")) as Arc<dyn ScriptProvider>]
        } else {
            self.script
        };
        let blueprint = if self.blueprint.is_empty() {
            vec![Arc::new(FakeBlueprintProvider::new("mistral")) as Arc<dyn BlueprintProvider>]
        } else {
            self.blueprint
        };
        let speech = if self.speech.is_empty() {
            vec![Arc::new(FakeSpeech::new("piper")) as Arc<dyn SpeechProvider>]
        } else {
            self.speech
        };
        let reports = if self.reports.is_empty() {
            vec![Arc::new(FakeReportWriter::new("local_file")) as Arc<dyn ReportWriter>]
        } else {
            self.reports
        };

        StageProviders {
            script,
            blueprint,
            speech,
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(FakeRenderer::new(output_dir)) as Arc<dyn Renderer>),
            reports,
        }
    }
}

impl Default for ProvidersBuilder {
    fn default() -> Self {
        Self::new()
    }
}
