//! Deterministic providers for tests and offline runs.
//!
//! Every fake can succeed, fail with a message, or sleep before answering,
//! and counts how often it was called.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{ProviderError, Result};
use super::llm::{CompletionRequest, LlmClient};
use super::{
    BlueprintProvider, Provider, RenderRequest, Renderer, ReportSummary, ReportWriter,
    ScriptProvider, SpeechProvider,
};
use crate::artifacts::{Blueprint, Scene, Script, StoryboardFrame};
use crate::worker::job::StyleProfile;

/// How a fake answers each call.
#[derive(Debug, Clone, Default)]
pub enum Behavior {
    #[default]
    Succeed,
    Fail(String),
    /// Sleeps, then succeeds. Longer than the chain timeout means a timeout.
    Delay(Duration),
}

#[derive(Debug, Default)]
struct CallLog {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl CallLog {
    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    async fn enter(&self, make_error: fn(String) -> ProviderError) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(message) => Err(make_error(message.clone())),
            Behavior::Delay(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Two-scene script whose narration mentions the topic.
pub fn sample_script(topic: &str, style: &str) -> Script {
    Script::from_scenes(
        topic,
        style,
        vec![
            Scene {
                scene_number: 1,
                duration: 10.0,
                narration_text: format!("Let's explore {}.", topic),
                concept: "Introduction".to_string(),
                explanation: format!("What {} is", topic),
            },
            Scene {
                scene_number: 2,
                duration: 15.0,
                narration_text: format!("That is how {} works.", topic),
                concept: "Summary".to_string(),
                explanation: "Key takeaways".to_string(),
            },
        ],
    )
}

// ─── LLM ────────────────────────────────────────────────────────────────────

pub struct FakeLlm {
    name: String,
    reply: String,
    log: CallLog,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl FakeLlm {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: "{}".to_string(),
            log: CallLog::default(),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.log = CallLog::with(Behavior::Fail(message.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.log.calls()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.last_request).clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        *lock(&self.last_request) = Some(request.clone());
        self.log.enter(ProviderError::GenerationFailed).await?;
        Ok(self.reply.clone())
    }
}

// ─── Script / blueprint ─────────────────────────────────────────────────────

pub struct FakeScriptProvider {
    name: String,
    script: Option<Script>,
    log: CallLog,
}

impl FakeScriptProvider {
    pub fn new(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Succeed)
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_behavior(name, Behavior::Fail(message.to_string()))
    }

    pub fn delayed(name: &str, delay: Duration) -> Self {
        Self::with_behavior(name, Behavior::Delay(delay))
    }

    pub fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            script: None,
            log: CallLog::with(behavior),
        }
    }

    /// Returns this script instead of [`sample_script`].
    pub fn with_script(mut self, script: Script) -> Self {
        self.script = Some(script);
        self
    }

    pub fn calls(&self) -> usize {
        self.log.calls()
    }
}

impl Provider for FakeScriptProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ScriptProvider for FakeScriptProvider {
    async fn generate_script(
        &self,
        topic: &str,
        style: &StyleProfile,
        _duration_secs: u32,
    ) -> Result<Script> {
        self.log.enter(ProviderError::GenerationFailed).await?;
        let script = self
            .script
            .clone()
            .unwrap_or_else(|| sample_script(topic, style.style.as_str()));
        Ok(script.with_provider(&self.name))
    }
}

pub struct FakeBlueprintProvider {
    name: String,
    log: CallLog,
}

impl FakeBlueprintProvider {
    pub fn new(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Succeed)
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_behavior(name, Behavior::Fail(message.to_string()))
    }

    pub fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            log: CallLog::with(behavior),
        }
    }

    pub fn calls(&self) -> usize {
        self.log.calls()
    }
}

impl Provider for FakeBlueprintProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl BlueprintProvider for FakeBlueprintProvider {
    async fn generate_blueprint(&self, script: &Script, _style: &StyleProfile) -> Result<Blueprint> {
        self.log.enter(ProviderError::GenerationFailed).await?;
        let storyboard = script
            .scenes
            .iter()
            .map(|s| StoryboardFrame {
                scene: s.scene_number,
                description: s.concept.clone(),
                ..Default::default()
            })
            .collect();
        Ok(Blueprint {
            storyboard,
            ..Default::default()
        }
        .with_provider(&self.name))
    }
}

// ─── Speech ─────────────────────────────────────────────────────────────────

/// Bytes written by [`FakeSpeech`] on success.
pub const FAKE_AUDIO: &[u8] = b"FAKE-AUDIO";

pub struct FakeSpeech {
    name: String,
    log: CallLog,
    last_language: Mutex<Option<String>>,
}

impl FakeSpeech {
    pub fn new(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Succeed)
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_behavior(name, Behavior::Fail(message.to_string()))
    }

    pub fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            log: CallLog::with(behavior),
            last_language: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.log.calls()
    }

    pub fn last_language(&self) -> Option<String> {
        lock(&self.last_language).clone()
    }
}

impl Provider for FakeSpeech {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl SpeechProvider for FakeSpeech {
    async fn synthesize(&self, _text: &str, language: &str, output_path: &Path) -> Result<PathBuf> {
        *lock(&self.last_language) = Some(language.to_string());
        self.log.enter(ProviderError::SynthesisFailed).await?;
        tokio::fs::write(output_path, FAKE_AUDIO)
            .await
            .map_err(|e| ProviderError::io(output_path, e))?;
        Ok(output_path.to_path_buf())
    }
}

// ─── Render ─────────────────────────────────────────────────────────────────

/// Writes a small stand-in video file to `<output_dir>/video_<job_id>.mp4`.
pub struct FakeRenderer {
    output_dir: PathBuf,
    log: CallLog,
    last_request: Mutex<Option<RenderRequest>>,
}

impl FakeRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::with_behavior(output_dir, Behavior::Succeed)
    }

    pub fn failing(output_dir: impl Into<PathBuf>, message: &str) -> Self {
        Self::with_behavior(output_dir, Behavior::Fail(message.to_string()))
    }

    pub fn with_behavior(output_dir: impl Into<PathBuf>, behavior: Behavior) -> Self {
        Self {
            output_dir: output_dir.into(),
            log: CallLog::with(behavior),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.log.calls()
    }

    pub fn last_request(&self) -> Option<RenderRequest> {
        lock(&self.last_request).clone()
    }
}

impl Provider for FakeRenderer {
    fn name(&self) -> &str {
        "fake_renderer"
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<PathBuf> {
        *lock(&self.last_request) = Some(request.clone());
        self.log.enter(ProviderError::RenderFailed).await?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ProviderError::io(&self.output_dir, e))?;
        let path = self.output_dir.join(format!("video_{}.mp4", request.job_id));
        tokio::fs::write(&path, format!("video for {}", request.script.topic))
            .await
            .map_err(|e| ProviderError::io(&path, e))?;
        Ok(path)
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

pub struct FakeReportWriter {
    name: String,
    log: CallLog,
}

impl FakeReportWriter {
    pub fn new(name: &str) -> Self {
        Self::with_behavior(name, Behavior::Succeed)
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_behavior(name, Behavior::Fail(message.to_string()))
    }

    pub fn with_behavior(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            log: CallLog::with(behavior),
        }
    }

    pub fn calls(&self) -> usize {
        self.log.calls()
    }
}

impl Provider for FakeReportWriter {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ReportWriter for FakeReportWriter {
    async fn write_report(&self, summary: &ReportSummary) -> Result<String> {
        self.log.enter(ProviderError::ReportFailed).await?;
        Ok(format!("fake://{}/{}", self.name, summary.job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::job::StyleType;

    #[tokio::test]
    async fn test_fake_script_counts_calls() {
        let fake = FakeScriptProvider::new("A");
        let style = StyleProfile::new(StyleType::Storytelling, "red");

        let script = fake.generate_script("Volcanoes", &style, 60).await.unwrap();
        assert_eq!(script.provider.as_deref(), Some("A"));
        assert!(script.narration.contains("Volcanoes"));
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_fake_returns_matching_error_kind() {
        let speech = FakeSpeech::failing("tts", "no voice");
        let err = speech
            .synthesize("hi", "en", Path::new("/tmp/never-written.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::SynthesisFailed(ref m) if m == "no voice"));
        assert_eq!(speech.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_fake_sleeps() {
        let fake = FakeScriptProvider::delayed("slow", Duration::from_secs(30));
        let style = StyleProfile::new(StyleType::Storytelling, "red");
        let started = tokio::time::Instant::now();

        fake.generate_script("Tides", &style, 60).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
