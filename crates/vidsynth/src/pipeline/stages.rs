//! Stage executors. Each wraps the providers for one capability and
//! applies that stage's failure policy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::artifacts::{AudioArtifact, Blueprint, Script};
use crate::config::Config;
use crate::providers::llm::{LlmClient, MistralClient, OllamaClient};
use crate::providers::tts::resolve_language;
use crate::providers::{
    BlueprintProvider, FfmpegRenderer, GoogleDocsReportWriter, GttsSpeech, LlmBlueprintProvider,
    LlmScriptProvider, LocalReportWriter, PiperSpeech, ProviderError, RenderRequest, Renderer,
    ReportSummary, ReportWriter, SarvamSpeech, ScriptProvider, SpeechProvider,
};
use crate::worker::job::StyleProfile;

use super::config::PipelineConfig;
use super::error::{StageError, StageWarning};
use super::fallback::{ProviderChain, Sourced};
use super::state::WorkflowStage;

// ─── Provider wiring ────────────────────────────────────────────────────────

/// The providers a workflow runs with, in fallback order.
pub struct StageProviders {
    pub script: Vec<Arc<dyn ScriptProvider>>,
    pub blueprint: Vec<Arc<dyn BlueprintProvider>>,
    pub speech: Vec<Arc<dyn SpeechProvider>>,
    pub renderer: Arc<dyn Renderer>,
    pub reports: Vec<Arc<dyn ReportWriter>>,
}

impl StageProviders {
    /// Builds the real providers. Providers whose credentials are absent are
    /// left out with a warning.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let llm_timeout = Duration::from_secs(config.llm.timeout_secs);
        let mut clients: Vec<Arc<dyn LlmClient>> = Vec::new();
        for name in &config.llm.providers {
            match name.as_str() {
                "mistral" => match resolve_key("llm.mistral.api_key", &config.llm.mistral.api_key)? {
                    Some(key) => clients.push(Arc::new(MistralClient::new(
                        &config.llm.mistral,
                        key,
                        llm_timeout,
                    )?)),
                    None => log::warn!("Mistral API key not configured, skipping mistral"),
                },
                "phi3" => clients.push(Arc::new(OllamaClient::new(&config.llm.ollama, llm_timeout)?)),
                other => log::warn!("Ignoring unknown LLM provider '{}'", other),
            }
        }

        let script = clients
            .iter()
            .map(|c| {
                Arc::new(LlmScriptProvider::new(
                    Arc::clone(c),
                    config.llm.script_temperature,
                    config.llm.max_tokens,
                )) as Arc<dyn ScriptProvider>
            })
            .collect();
        let blueprint = clients
            .iter()
            .map(|c| {
                Arc::new(LlmBlueprintProvider::new(
                    Arc::clone(c),
                    config.llm.blueprint_temperature,
                    config.llm.max_tokens,
                )) as Arc<dyn BlueprintProvider>
            })
            .collect();

        let tts_timeout = Duration::from_secs(config.tts.timeout_secs);
        let mut speech: Vec<Arc<dyn SpeechProvider>> = Vec::new();
        for name in &config.tts.providers {
            match name.as_str() {
                "piper" => speech.push(Arc::new(PiperSpeech::new(&config.tts.piper))),
                "sarvam" => match resolve_key("tts.sarvam.api_key", &config.tts.sarvam.api_key)? {
                    Some(key) => speech.push(Arc::new(SarvamSpeech::new(
                        &config.tts.sarvam,
                        key,
                        tts_timeout,
                    )?)),
                    None => log::warn!("Sarvam API key not configured, skipping sarvam"),
                },
                "gtts" => speech.push(Arc::new(GttsSpeech::new(&config.tts.gtts, tts_timeout)?)),
                other => log::warn!("Ignoring unknown TTS provider '{}'", other),
            }
        }

        let renderer: Arc<dyn Renderer> = Arc::new(FfmpegRenderer::new(
            &config.render,
            config.output_dir(),
            config.temp_dir(),
        ));

        let mut reports: Vec<Arc<dyn ReportWriter>> = Vec::new();
        let docs = &config.report.google_docs;
        match resolve_key("report.google_docs.access_token", &docs.access_token)? {
            Some(token) => reports.push(Arc::new(GoogleDocsReportWriter::new(
                docs,
                token,
                Duration::from_secs(config.report.timeout_secs),
            )?)),
            None => log::info!("Google Docs token not configured, reports go to local files"),
        }
        reports.push(Arc::new(LocalReportWriter::new(config.report_dir())));

        Ok(Self {
            script,
            blueprint,
            speech,
            renderer,
            reports,
        })
    }
}

fn resolve_key(
    name: &str,
    secret: &crate::secrets::SecretRef,
) -> Result<Option<secrecy::SecretString>, ProviderError> {
    secret
        .resolve_optional()
        .map_err(|e| ProviderError::NotConfigured(format!("{}: {}", name, e)))
}

// ─── Script ─────────────────────────────────────────────────────────────────

pub struct ScriptStage {
    chain: ProviderChain<dyn ScriptProvider>,
}

impl ScriptStage {
    pub fn new(chain: ProviderChain<dyn ScriptProvider>) -> Self {
        Self { chain }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.chain.names()
    }

    /// Generates a script, starting at `provider` in the chain. Fatal on exhaustion.
    pub async fn execute(
        &self,
        topic: &str,
        style: &StyleProfile,
        duration_secs: u32,
        provider: &str,
    ) -> Result<Sourced<Script>, StageError> {
        let mut sourced = self
            .chain
            .starting_at(provider)
            .run(|p| async move { p.generate_script(topic, style, duration_secs).await })
            .await
            .map_err(|e| StageError::unavailable(WorkflowStage::Script, e))?;

        sourced.value.provider = Some(sourced.provider.clone());
        Ok(sourced)
    }
}

// ─── Blueprint ──────────────────────────────────────────────────────────────

pub struct BlueprintStage {
    chain: ProviderChain<dyn BlueprintProvider>,
}

impl BlueprintStage {
    pub fn new(chain: ProviderChain<dyn BlueprintProvider>) -> Self {
        Self { chain }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.chain.names()
    }

    pub async fn execute(
        &self,
        script: &Script,
        style: &StyleProfile,
        provider: &str,
    ) -> Result<Sourced<Blueprint>, StageError> {
        let mut sourced = self
            .chain
            .starting_at(provider)
            .run(|p| async move { p.generate_blueprint(script, style).await })
            .await
            .map_err(|e| StageError::unavailable(WorkflowStage::Blueprint, e))?;

        sourced.value.provider = Some(sourced.provider.clone());
        Ok(sourced)
    }
}

// ─── Audio ──────────────────────────────────────────────────────────────────

/// Audio result plus the warning to record when it is degraded.
#[derive(Debug, Clone)]
pub struct AudioOutcome {
    pub artifact: AudioArtifact,
    pub warning: Option<StageWarning>,
}

pub struct AudioStage {
    chain: ProviderChain<dyn SpeechProvider>,
    language: String,
    temp_dir: PathBuf,
}

impl AudioStage {
    pub fn new(chain: ProviderChain<dyn SpeechProvider>, language: &str, temp_dir: PathBuf) -> Self {
        Self {
            chain,
            language: language.to_string(),
            temp_dir,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.chain.names()
    }

    pub fn placeholder_path(&self, job_id: &str) -> PathBuf {
        self.temp_dir.join(format!("placeholder_{}.mp3", job_id))
    }

    /// Synthesizes the narration. Never fails: exhaustion degrades to a
    /// placeholder file.
    pub async fn execute(&self, job_id: &str, script: &Script, include_voiceover: bool) -> AudioOutcome {
        if !include_voiceover {
            return AudioOutcome {
                artifact: AudioArtifact::Skipped {
                    reason: "voiceover disabled".to_string(),
                },
                warning: None,
            };
        }

        let text = script.narration.trim();
        if text.is_empty() {
            return AudioOutcome {
                artifact: AudioArtifact::Skipped {
                    reason: "script has no narration".to_string(),
                },
                warning: None,
            };
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.temp_dir).await {
            log::warn!("Cannot create temp directory {:?}: {}", self.temp_dir, e);
        }

        let language = resolve_language(&self.language, text);
        let lang = language.as_str();
        let output = self.temp_dir.join(format!("narration_{}.wav", job_id));
        let output = output.as_path();

        match self
            .chain
            .run(|p| async move { p.synthesize(text, lang, output).await })
            .await
        {
            Ok(sourced) => AudioOutcome {
                artifact: AudioArtifact::Synthesized {
                    path: sourced.value,
                    provider: sourced.provider,
                    language,
                },
                warning: None,
            },
            Err(exhausted) => {
                let reason = format!("speech synthesis failed: {}", exhausted);
                log::warn!("Job {}: {}, continuing without narration", job_id, reason);
                self.degrade(job_id, reason).await
            }
        }
    }

    async fn degrade(&self, job_id: &str, reason: String) -> AudioOutcome {
        let placeholder = self.placeholder_path(job_id);
        let artifact = match write_placeholder(&placeholder).await {
            Ok(()) => AudioArtifact::Placeholder {
                path: placeholder,
                reason: reason.clone(),
            },
            Err(e) => {
                log::warn!("Could not write placeholder audio {:?}: {}", placeholder, e);
                AudioArtifact::Skipped {
                    reason: format!("{}; placeholder not written: {}", reason, e),
                }
            }
        };

        AudioOutcome {
            artifact,
            warning: Some(StageWarning::OptionalStageDegraded {
                stage: WorkflowStage::Audio,
                reason,
            }),
        }
    }
}

async fn write_placeholder(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, b"").await
}

// ─── Render ─────────────────────────────────────────────────────────────────

pub struct RenderStage {
    renderer: Arc<dyn Renderer>,
    timeout: Duration,
}

impl RenderStage {
    pub fn new(renderer: Arc<dyn Renderer>, timeout: Duration) -> Self {
        Self { renderer, timeout }
    }

    pub fn renderer_name(&self) -> String {
        self.renderer.name().to_string()
    }

    /// Renders the video. Any failure is fatal.
    pub async fn execute(
        &self,
        job_id: &str,
        script: &Script,
        blueprint: &Blueprint,
        style: &StyleProfile,
        audio: &AudioArtifact,
    ) -> Result<PathBuf, StageError> {
        let request = RenderRequest {
            job_id: job_id.to_string(),
            script: script.clone(),
            blueprint: blueprint.clone(),
            style: style.clone(),
            audio_path: audio.path().cloned(),
        };

        let fail = |source| StageError::Failed {
            stage: WorkflowStage::Render,
            source,
        };

        let path = match tokio::time::timeout(self.timeout, self.renderer.render(&request)).await {
            Ok(result) => result.map_err(fail)?,
            Err(_) => {
                return Err(fail(ProviderError::Timeout {
                    provider: self.renderer.name().to_string(),
                    after: self.timeout,
                }))
            }
        };

        if path.as_os_str().is_empty() {
            return Err(fail(ProviderError::RenderFailed(
                "renderer returned an empty path".to_string(),
            )));
        }
        Ok(path)
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub location: Option<Sourced<String>>,
    pub warning: Option<StageWarning>,
}

pub struct ReportStage {
    chain: ProviderChain<dyn ReportWriter>,
}

impl ReportStage {
    pub fn new(chain: ProviderChain<dyn ReportWriter>) -> Self {
        Self { chain }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.chain.names()
    }

    /// Writes the report. Never fails: exhaustion leaves the job without a report URL.
    pub async fn execute(&self, summary: &ReportSummary) -> ReportOutcome {
        match self
            .chain
            .run(|p| async move { p.write_report(summary).await })
            .await
        {
            Ok(sourced) => ReportOutcome {
                location: Some(sourced),
                warning: None,
            },
            Err(exhausted) => {
                log::error!(
                    "Report for job {} could not be written: {}",
                    summary.job_id,
                    exhausted
                );
                ReportOutcome {
                    location: None,
                    warning: Some(StageWarning::ReportFailed {
                        reason: exhausted.to_string(),
                    }),
                }
            }
        }
    }
}

/// The five stage executors for one workflow.
pub struct Stages {
    pub script: ScriptStage,
    pub blueprint: BlueprintStage,
    pub audio: AudioStage,
    pub render: RenderStage,
    pub report: ReportStage,
}

impl Stages {
    pub fn new(config: &PipelineConfig, providers: StageProviders) -> Self {
        Self {
            script: ScriptStage::new(ProviderChain::new(
                "script",
                providers.script,
                config.llm_timeout,
            )),
            blueprint: BlueprintStage::new(ProviderChain::new(
                "blueprint",
                providers.blueprint,
                config.llm_timeout,
            )),
            audio: AudioStage::new(
                ProviderChain::new("speech", providers.speech, config.tts_timeout),
                &config.tts_language,
                config.temp_directory.clone(),
            ),
            render: RenderStage::new(providers.renderer, config.render_timeout),
            report: ReportStage::new(ProviderChain::new(
                "report",
                providers.reports,
                config.report_timeout,
            )),
        }
    }
}
