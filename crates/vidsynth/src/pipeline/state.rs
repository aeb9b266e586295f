use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::StageWarning;
use crate::artifacts::{AudioArtifact, Blueprint, Script};
use crate::worker::job::VideoRequest;

/// Position of a run in the linear workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Initializing,
    Script,
    Blueprint,
    Audio,
    Render,
    Report,
    Completed,
    Failed,
}

impl WorkflowStage {
    /// Stages that call out to providers, in execution order.
    pub const EXECUTION_ORDER: [WorkflowStage; 5] = [
        WorkflowStage::Script,
        WorkflowStage::Blueprint,
        WorkflowStage::Audio,
        WorkflowStage::Render,
        WorkflowStage::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Initializing => "initializing",
            WorkflowStage::Script => "script",
            WorkflowStage::Blueprint => "blueprint",
            WorkflowStage::Audio => "audio",
            WorkflowStage::Render => "render",
            WorkflowStage::Report => "report",
            WorkflowStage::Completed => "completed",
            WorkflowStage::Failed => "failed",
        }
    }

    /// Linear successor. Terminal stages are their own successor.
    pub fn next(&self) -> WorkflowStage {
        match self {
            WorkflowStage::Initializing => WorkflowStage::Script,
            WorkflowStage::Script => WorkflowStage::Blueprint,
            WorkflowStage::Blueprint => WorkflowStage::Audio,
            WorkflowStage::Audio => WorkflowStage::Render,
            WorkflowStage::Render => WorkflowStage::Report,
            WorkflowStage::Report => WorkflowStage::Completed,
            WorkflowStage::Completed => WorkflowStage::Completed,
            WorkflowStage::Failed => WorkflowStage::Failed,
        }
    }

    /// Progress reached once this stage has completed.
    pub fn checkpoint(&self) -> u8 {
        match self {
            WorkflowStage::Initializing | WorkflowStage::Failed => 0,
            WorkflowStage::Script => 25,
            WorkflowStage::Blueprint => 50,
            WorkflowStage::Audio => 70,
            WorkflowStage::Render => 85,
            WorkflowStage::Report | WorkflowStage::Completed => 100,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStage::Completed | WorkflowStage::Failed)
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one run knows about its job while it executes.
///
/// Owned by a single run and never shared; the registry only sees what the
/// engine copies into it at each checkpoint.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub job_id: String,
    pub request: VideoRequest,
    pub stage: WorkflowStage,
    pub progress: u8,
    pub script: Option<Script>,
    pub blueprint: Option<Blueprint>,
    pub audio: Option<AudioArtifact>,
    pub video_path: Option<PathBuf>,
    pub report_url: Option<String>,
    pub error: Option<String>,
    pub warnings: Vec<StageWarning>,
}

impl PipelineState {
    pub fn new(job_id: &str, request: VideoRequest) -> Self {
        Self {
            job_id: job_id.to_string(),
            request,
            stage: WorkflowStage::Initializing,
            progress: 0,
            script: None,
            blueprint: None,
            audio: None,
            video_path: None,
            report_url: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Completes the current stage and returns it.
    ///
    /// Progress is raised to the completed stage's checkpoint, never lowered.
    pub fn advance(&mut self) -> WorkflowStage {
        let completed = self.stage;
        self.progress = self.progress.max(completed.checkpoint());
        self.stage = completed.next();
        completed
    }

    /// Moves to `Failed` and returns the stage that was running.
    pub fn fail(&mut self, error: &str) -> WorkflowStage {
        let failed_at = self.stage;
        self.stage = WorkflowStage::Failed;
        self.error = Some(error.to_string());
        failed_at
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}
