use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info_span, Instrument};

use crate::artifacts::{AudioArtifact, Blueprint, Script};
use crate::broadcast::job_store::JobStore;
use crate::broadcast::progress_channel::ProgressEvent;
use crate::config::Config;
use crate::error::RegistryError;
use crate::providers::{ProviderError, ReportSummary};
use crate::worker::job::{Job, JobStatus, StyleProfile, VideoRequest};

use super::config::PipelineConfig;
use super::error::{StageError, WorkflowError};
use super::progress::ProgressReporter;
use super::stages::{StageProviders, Stages};
use super::state::{PipelineState, WorkflowStage};

const COMPLETED_MESSAGE: &str = "Video generated successfully";

/// Artifacts of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub video_path: PathBuf,
    pub report_url: Option<String>,
    pub script: Script,
    pub blueprint: Blueprint,
    pub audio: AudioArtifact,
    pub warnings: Vec<String>,
}

/// Runs the five stages for a job in a fixed order, recording each
/// checkpoint in the registry and reporting it as progress.
pub struct Workflow {
    config: PipelineConfig,
    stages: Stages,
    registry: Arc<JobStore>,
    progress: Arc<dyn ProgressReporter>,
    /// Every LLM provider a request may name, including ones left out of
    /// the chains for lack of credentials.
    llm_names: Vec<String>,
}

impl Workflow {
    pub fn new(
        config: PipelineConfig,
        providers: StageProviders,
        registry: Arc<JobStore>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        let stages = Stages::new(&config, providers);
        let llm_names = stages.script.provider_names();
        Self {
            config,
            stages,
            registry,
            progress,
            llm_names,
        }
    }

    /// Production constructor, builds the real providers from config.
    pub fn from_config(
        config: &Config,
        registry: Arc<JobStore>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<Self, ProviderError> {
        let providers = StageProviders::from_config(config)?;
        Ok(Self::new(
            PipelineConfig::from_config(config),
            providers,
            registry,
            progress,
        )
        .with_llm_names(&config.llm.providers))
    }

    /// Widens the set of LLM provider names a request may select.
    ///
    /// A selected provider that is missing from the chain starts the run at
    /// the head of the chain instead.
    pub fn with_llm_names(mut self, names: &[String]) -> Self {
        for name in names {
            if !self.llm_names.contains(name) {
                self.llm_names.push(name.clone());
            }
        }
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobStore> {
        &self.registry
    }

    /// Whether a request may select `name`, enabled or not.
    pub fn supports_llm_provider(&self, name: &str) -> bool {
        self.llm_names.iter().any(|n| n == name)
    }

    pub fn llm_providers(&self) -> Vec<String> {
        self.llm_names.clone()
    }

    /// Configured providers per service, in fallback order.
    pub fn services(&self) -> BTreeMap<String, Vec<String>> {
        let mut services = BTreeMap::new();
        services.insert("script".to_string(), self.stages.script.provider_names());
        services.insert(
            "blueprint".to_string(),
            self.stages.blueprint.provider_names(),
        );
        services.insert("tts".to_string(), self.stages.audio.provider_names());
        services.insert(
            "render".to_string(),
            vec![self.stages.render.renderer_name()],
        );
        services.insert("report".to_string(), self.stages.report.provider_names());
        services
    }

    /// Script generation on its own, outside any job.
    pub async fn generate_script(
        &self,
        topic: &str,
        style: &StyleProfile,
        duration_secs: u32,
        provider: &str,
    ) -> Result<Script, StageError> {
        let sourced = self
            .stages
            .script
            .execute(topic, style, duration_secs, provider)
            .instrument(info_span!("generate_script", provider = %provider))
            .await?;
        Ok(sourced.value)
    }

    /// Executes the whole workflow for `job_id`.
    ///
    /// The job must exist in the registry and not be terminal. On a fatal
    /// stage error the job is marked FAILED and an error event is reported
    /// before the error is returned.
    pub async fn run(
        &self,
        job_id: &str,
        request: &VideoRequest,
    ) -> Result<PipelineOutput, WorkflowError> {
        let span = info_span!(
            "workflow",
            job_id = %job_id,
            topic = %request.topic,
            llm_provider = %request.llm_provider,
        );
        self.run_job(job_id, request).instrument(span).await
    }

    async fn run_job(
        &self,
        job_id: &str,
        request: &VideoRequest,
    ) -> Result<PipelineOutput, WorkflowError> {
        let mut state = PipelineState::new(job_id, request.clone());

        match self
            .registry
            .update(job_id, |job| job.mark_processing("Starting workflow"))
        {
            Ok(_) => {}
            Err(e @ (RegistryError::JobNotFound(_) | RegistryError::AlreadyTerminal { .. })) => {
                return Err(e.into());
            }
            Err(e) => return Err(self.abort(&mut state, e.into())),
        }
        self.progress.report(ProgressEvent::new(
            job_id,
            WorkflowStage::Initializing.as_str(),
            0,
            "Starting workflow",
        ));
        state.advance();
        log::info!("Workflow started for job {}", job_id);

        match self.execute(&mut state).await {
            Ok(output) => Ok(output),
            Err(e) => Err(self.abort(&mut state, e)),
        }
    }

    async fn execute(&self, state: &mut PipelineState) -> Result<PipelineOutput, WorkflowError> {
        let script = self
            .step_script(state)
            .instrument(info_span!("script"))
            .await?;
        let blueprint = self
            .step_blueprint(state, &script)
            .instrument(info_span!("blueprint"))
            .await?;
        let audio = self
            .step_audio(state, &script)
            .instrument(info_span!("audio"))
            .await?;
        let video_path = self
            .step_render(state, &script, &blueprint, &audio)
            .instrument(info_span!("render"))
            .await?;
        let report_url = self
            .step_report(state, &script, &blueprint, &audio, &video_path)
            .instrument(info_span!("report"))
            .await;

        self.finish(state, &report_url)?;

        Ok(PipelineOutput {
            video_path,
            report_url,
            script,
            blueprint,
            audio,
            warnings: state.warning_messages(),
        })
    }

    async fn step_script(&self, state: &mut PipelineState) -> Result<Script, WorkflowError> {
        let request = &state.request;
        let sourced = self
            .stages
            .script
            .execute(
                &request.topic,
                &request.style,
                request.duration_secs,
                &request.llm_provider,
            )
            .await?;

        let script = sourced.value;
        let message = format!(
            "Script generated by {} ({} scenes)",
            sourced.provider,
            script.scenes.len()
        );
        state.script = Some(script.clone());
        let stored = script.clone();
        self.checkpoint(state, &message, move |job| job.script = Some(stored))?;
        Ok(script)
    }

    async fn step_blueprint(
        &self,
        state: &mut PipelineState,
        script: &Script,
    ) -> Result<Blueprint, WorkflowError> {
        let sourced = self
            .stages
            .blueprint
            .execute(script, &state.request.style, &state.request.llm_provider)
            .await?;

        let blueprint = sourced.value;
        let message = format!("Animation blueprint generated by {}", sourced.provider);
        state.blueprint = Some(blueprint.clone());
        let stored = blueprint.clone();
        self.checkpoint(state, &message, move |job| job.blueprint = Some(stored))?;
        Ok(blueprint)
    }

    async fn step_audio(
        &self,
        state: &mut PipelineState,
        script: &Script,
    ) -> Result<AudioArtifact, WorkflowError> {
        let outcome = self
            .stages
            .audio
            .execute(&state.job_id, script, state.request.include_voiceover)
            .await;

        let message = match &outcome.artifact {
            AudioArtifact::Synthesized { provider, .. } => {
                format!("Voiceover synthesized by {}", provider)
            }
            AudioArtifact::Placeholder { .. } => {
                "Voiceover unavailable, continuing with placeholder audio".to_string()
            }
            AudioArtifact::Skipped { reason } => format!("Voiceover skipped: {}", reason),
        };
        if let Some(warning) = outcome.warning {
            state.warnings.push(warning);
        }

        let audio = outcome.artifact;
        state.audio = Some(audio.clone());
        let stored = audio.clone();
        self.checkpoint(state, &message, move |job| job.audio = Some(stored))?;
        Ok(audio)
    }

    async fn step_render(
        &self,
        state: &mut PipelineState,
        script: &Script,
        blueprint: &Blueprint,
        audio: &AudioArtifact,
    ) -> Result<PathBuf, WorkflowError> {
        let video_path = self
            .stages
            .render
            .execute(&state.job_id, script, blueprint, &state.request.style, audio)
            .await?;

        let message = format!("Video rendered to {}", video_path.display());
        state.video_path = Some(video_path.clone());
        let stored = video_path.clone();
        self.checkpoint(state, &message, move |job| job.video_path = Some(stored))?;
        Ok(video_path)
    }

    async fn step_report(
        &self,
        state: &mut PipelineState,
        script: &Script,
        blueprint: &Blueprint,
        audio: &AudioArtifact,
        video_path: &std::path::Path,
    ) -> Option<String> {
        let summary = ReportSummary {
            job_id: state.job_id.clone(),
            topic: state.request.topic.clone(),
            style: state.request.style.style.to_string(),
            status: JobStatus::Completed.as_str().to_string(),
            video_path: video_path.to_path_buf(),
            script: script.clone(),
            blueprint: blueprint.clone(),
            audio: Some(audio.clone()),
            warnings: state.warning_messages(),
        };

        let outcome = self.stages.report.execute(&summary).await;
        if let Some(warning) = outcome.warning {
            state.warnings.push(warning);
        }

        let report_url = outcome.location.map(|sourced| {
            log::info!(
                "Report for job {} written by {}: {}",
                state.job_id,
                sourced.provider,
                sourced.value
            );
            sourced.value
        });
        state.report_url = report_url.clone();
        report_url
    }

    /// Completes the report stage and writes the terminal COMPLETED state
    /// in one registry update.
    fn finish(
        &self,
        state: &mut PipelineState,
        report_url: &Option<String>,
    ) -> Result<(), WorkflowError> {
        let warnings = state.warning_messages();
        let report_url = report_url.clone();
        self.registry.update(&state.job_id, move |job| {
            job.report_url = report_url;
            job.warnings = warnings;
            job.mark_completed(COMPLETED_MESSAGE);
        })?;
        state.advance();

        self.progress
            .report(ProgressEvent::completed(&state.job_id, COMPLETED_MESSAGE));
        log::info!("Workflow completed for job {}", state.job_id);
        Ok(())
    }

    /// Marks the current stage complete, copies its result into the
    /// registry and reports the new progress.
    fn checkpoint<F>(
        &self,
        state: &mut PipelineState,
        message: &str,
        apply: F,
    ) -> Result<(), WorkflowError>
    where
        F: FnOnce(&mut Job),
    {
        // Persist first so a failed write is reported against the running stage.
        let progress = state.progress.max(state.stage.checkpoint());
        let warnings = state.warning_messages();
        self.registry.update(&state.job_id, |job| {
            apply(job);
            job.record_progress(progress);
            job.message = message.to_string();
            job.warnings = warnings;
        })?;
        let completed = state.advance();

        log::debug!(
            "Job {} finished {} stage at {}%",
            state.job_id,
            completed,
            progress
        );
        self.progress.report(ProgressEvent::new(
            &state.job_id,
            completed.as_str(),
            progress,
            message,
        ));
        Ok(())
    }

    /// Records a fatal error. The registry write is best effort so the
    /// original error is never masked.
    fn abort(&self, state: &mut PipelineState, error: WorkflowError) -> WorkflowError {
        let message = error.to_string();
        let failed_at = state.fail(&message);
        log::error!(
            "Workflow for job {} failed at {} stage: {}",
            state.job_id,
            failed_at,
            message
        );

        let warnings = state.warning_messages();
        if let Err(e) = self.registry.update(&state.job_id, |job| {
            job.warnings = warnings;
            job.message = format!("Failed during {} stage", failed_at);
            job.mark_failed(&message);
        }) {
            log::error!("Could not record failure of job {}: {}", state.job_id, e);
        }

        self.progress.report(ProgressEvent::failed(
            &state.job_id,
            failed_at.as_str(),
            state.progress,
            &message,
        ));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::progress::RecordingProgress;
    use crate::providers::fake::{
        FakeBlueprintProvider, FakeRenderer, FakeReportWriter, FakeScriptProvider, FakeSpeech,
    };
    use crate::providers::{BlueprintProvider, ReportWriter, ScriptProvider, SpeechProvider};
    use crate::broadcast::progress_channel::EventKind;
    use crate::worker::job::StyleType;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        workflow: Workflow,
        registry: Arc<JobStore>,
        progress: Arc<RecordingProgress>,
        renderer: Arc<FakeRenderer>,
        report: Arc<FakeReportWriter>,
    }

    fn fixture(script: Vec<Arc<FakeScriptProvider>>, speech: Vec<Arc<FakeSpeech>>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path()).with_timeouts(Duration::from_secs(5));
        let renderer = Arc::new(FakeRenderer::new(config.output_directory.clone()));
        let report = Arc::new(FakeReportWriter::new("local_file"));
        let providers = StageProviders {
            script: script
                .into_iter()
                .map(|p| p as Arc<dyn ScriptProvider>)
                .collect(),
            blueprint: vec![
                Arc::new(FakeBlueprintProvider::new("mistral")) as Arc<dyn BlueprintProvider>,
            ],
            speech: speech
                .into_iter()
                .map(|p| p as Arc<dyn SpeechProvider>)
                .collect(),
            renderer: renderer.clone(),
            reports: vec![report.clone() as Arc<dyn ReportWriter>],
        };
        let registry = Arc::new(JobStore::new());
        let progress = Arc::new(RecordingProgress::new());
        let workflow = Workflow::new(config, providers, registry.clone(), progress.clone());

        Fixture {
            _dir: dir,
            workflow,
            registry,
            progress,
            renderer,
            report,
        }
    }

    fn submit(fixture: &Fixture) -> (String, VideoRequest) {
        let request = VideoRequest::new(
            "Photosynthesis",
            StyleProfile::new(StyleType::Explainer2d, "green,white"),
        );
        let job = fixture.registry.create(Job::new(&request)).unwrap();
        (job.id, request)
    }

    #[tokio::test]
    async fn test_run_completes_job() {
        let f = fixture(
            vec![Arc::new(FakeScriptProvider::new("mistral"))],
            vec![Arc::new(FakeSpeech::new("piper"))],
        );
        let (job_id, request) = submit(&f);

        let output = f.workflow.run(&job_id, &request).await.unwrap();

        let job = f.registry.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.video_path.as_ref(), Some(&output.video_path));
        assert_eq!(job.report_url.as_deref(), output.report_url.as_deref());
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());

        let progress: Vec<u8> = f.progress.events_for(&job_id).iter().map(|e| e.progress).collect();
        assert_eq!(progress, vec![0, 25, 50, 70, 85, 100]);
        assert_eq!(f.report.calls(), 1);
    }

    #[tokio::test]
    async fn test_script_exhaustion_fails_job() {
        let f = fixture(
            vec![
                Arc::new(FakeScriptProvider::failing("mistral", "401")),
                Arc::new(FakeScriptProvider::failing("phi3", "connection refused")),
            ],
            vec![Arc::new(FakeSpeech::new("piper"))],
        );
        let (job_id, request) = submit(&f);

        let err = f.workflow.run(&job_id, &request).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Stage(StageError::ProviderUnavailable { .. })));

        let job = f.registry.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0);
        assert!(job.error.unwrap().contains("all providers unavailable"));
        assert!(job.video_path.is_none());
        assert_eq!(f.renderer.calls(), 0);

        let events = f.progress.events_for(&job_id);
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Error);
        assert_eq!(last.stage, "script");
    }

    #[tokio::test]
    async fn test_degraded_audio_records_warning() {
        let f = fixture(
            vec![Arc::new(FakeScriptProvider::new("mistral"))],
            vec![Arc::new(FakeSpeech::failing("piper", "binary missing"))],
        );
        let (job_id, request) = submit(&f);

        let output = f.workflow.run(&job_id, &request).await.unwrap();

        assert!(matches!(output.audio, AudioArtifact::Placeholder { .. }));
        let job = f.registry.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.warnings.len(), 1);
        assert!(job.warnings[0].starts_with("audio stage degraded"));
    }

    #[tokio::test]
    async fn test_run_rejects_unknown_job() {
        let f = fixture(
            vec![Arc::new(FakeScriptProvider::new("mistral"))],
            Vec::new(),
        );
        let request = VideoRequest::new(
            "Photosynthesis",
            StyleProfile::new(StyleType::Explainer2d, "green"),
        );

        let err = f.workflow.run("missing", &request).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Registry(_)));
        assert!(f.progress.events().is_empty());
    }

    #[tokio::test]
    async fn test_services_lists_providers() {
        let f = fixture(
            vec![
                Arc::new(FakeScriptProvider::new("mistral")),
                Arc::new(FakeScriptProvider::new("phi3")),
            ],
            vec![Arc::new(FakeSpeech::new("piper"))],
        );

        let services = f.workflow.services();
        assert_eq!(services["script"], vec!["mistral", "phi3"]);
        assert_eq!(services["render"], vec!["fake_renderer"]);
        assert!(f.workflow.supports_llm_provider("phi3"));
        assert!(!f.workflow.supports_llm_provider("gpt"));
    }
}
