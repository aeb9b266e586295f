use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::artifacts::{AudioArtifact, Blueprint, Script};
use crate::error::WorkerError;

pub const MIN_TOPIC_CHARS: usize = 3;
pub const MAX_TOPIC_CHARS: usize = 200;
pub const MIN_DURATION_SECS: u32 = 30;
pub const MAX_DURATION_SECS: u32 = 600;
pub const DEFAULT_DURATION_SECS: u32 = 120;
pub const DEFAULT_LLM_PROVIDER: &str = "mistral";

// ─── Style profile ──────────────────────────────────────────────────────────

/// Visual style of the explainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StyleType {
    #[serde(rename = "2D explainer")]
    Explainer2d,
    #[serde(rename = "line-based animation")]
    LineBased,
    #[serde(rename = "flowchart + arrow animations")]
    Flowchart,
    #[serde(rename = "character-based")]
    Character,
    #[serde(rename = "whiteboard/doodle")]
    Whiteboard,
    #[serde(rename = "UI walkthrough")]
    UiWalkthrough,
    #[serde(rename = "kinetic typography")]
    KineticTypography,
    #[serde(rename = "infographic motion graphics")]
    Infographic,
    #[serde(rename = "storytelling scenes")]
    Storytelling,
}

impl StyleType {
    pub const ALL: [StyleType; 9] = [
        StyleType::Explainer2d,
        StyleType::LineBased,
        StyleType::Flowchart,
        StyleType::Character,
        StyleType::Whiteboard,
        StyleType::UiWalkthrough,
        StyleType::KineticTypography,
        StyleType::Infographic,
        StyleType::Storytelling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StyleType::Explainer2d => "2D explainer",
            StyleType::LineBased => "line-based animation",
            StyleType::Flowchart => "flowchart + arrow animations",
            StyleType::Character => "character-based",
            StyleType::Whiteboard => "whiteboard/doodle",
            StyleType::UiWalkthrough => "UI walkthrough",
            StyleType::KineticTypography => "kinetic typography",
            StyleType::Infographic => "infographic motion graphics",
            StyleType::Storytelling => "storytelling scenes",
        }
    }
}

impl fmt::Display for StyleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StyleType {
    type Err = String;

    /// Accepts the display name or a short slug such as `whiteboard`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let style = match wanted.as_str() {
            "2d" | "explainer" | "2d-explainer" => StyleType::Explainer2d,
            "line" | "line-based" => StyleType::LineBased,
            "flowchart" => StyleType::Flowchart,
            "character" => StyleType::Character,
            "whiteboard" | "doodle" => StyleType::Whiteboard,
            "ui" | "ui-walkthrough" => StyleType::UiWalkthrough,
            "kinetic" | "kinetic-typography" => StyleType::KineticTypography,
            "infographic" => StyleType::Infographic,
            "storytelling" => StyleType::Storytelling,
            other => StyleType::ALL
                .iter()
                .copied()
                .find(|t| t.as_str().eq_ignore_ascii_case(other))
                .ok_or_else(|| format!("unknown style '{}'", s))?,
        };
        Ok(style)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationSpeed {
    Slow,
    #[default]
    Medium,
    Fast,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextStyle {
    #[default]
    Bold,
    Light,
    Handwritten,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    #[default]
    Fade,
    Slide,
    Cut,
}

/// Style descriptor submitted with a video request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub style: StyleType,
    /// Accepts either a list or a comma-separated string.
    #[serde(deserialize_with = "deserialize_colors")]
    pub colors: Vec<String>,
    #[serde(default)]
    pub animation_speed: AnimationSpeed,
    #[serde(default)]
    pub text_style: TextStyle,
    #[serde(default)]
    pub transitions: TransitionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_video_url: Option<String>,
}

impl StyleProfile {
    pub fn new(style: StyleType, colors: &str) -> Self {
        Self {
            style,
            colors: split_colors(colors),
            animation_speed: AnimationSpeed::default(),
            text_style: TextStyle::default(),
            transitions: TransitionType::default(),
            reference_video_url: None,
        }
    }

    pub fn colors_csv(&self) -> String {
        self.colors.join(",")
    }
}

fn split_colors(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn deserialize_colors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Colors {
        Csv(String),
        List(Vec<String>),
    }

    Ok(match Colors::deserialize(deserializer)? {
        Colors::Csv(raw) => split_colors(&raw),
        Colors::List(list) => list
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
    })
}

// ─── Request ────────────────────────────────────────────────────────────────

fn default_llm_provider() -> String {
    DEFAULT_LLM_PROVIDER.to_string()
}

fn default_true() -> bool {
    true
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_SECS
}

/// A request to produce one explainer video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRequest {
    pub topic: String,
    pub style: StyleProfile,
    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,
    #[serde(default = "default_true")]
    pub include_voiceover: bool,
    #[serde(default = "default_duration")]
    pub duration_secs: u32,
}

impl VideoRequest {
    pub fn new(topic: &str, style: StyleProfile) -> Self {
        Self {
            topic: topic.to_string(),
            style,
            llm_provider: default_llm_provider(),
            include_voiceover: true,
            duration_secs: DEFAULT_DURATION_SECS,
        }
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.llm_provider = provider.to_string();
        self
    }

    pub fn with_duration(mut self, duration_secs: u32) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn without_voiceover(mut self) -> Self {
        self.include_voiceover = false;
        self
    }

    /// Checks topic length, duration bounds, colors and provider selector.
    pub fn validate(&self) -> Result<(), WorkerError> {
        let topic_len = self.topic.trim().chars().count();
        if !(MIN_TOPIC_CHARS..=MAX_TOPIC_CHARS).contains(&topic_len) {
            return Err(WorkerError::InvalidRequest(format!(
                "topic must be {}-{} characters, got {}",
                MIN_TOPIC_CHARS, MAX_TOPIC_CHARS, topic_len
            )));
        }
        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&self.duration_secs) {
            return Err(WorkerError::InvalidRequest(format!(
                "duration must be {}-{} seconds, got {}",
                MIN_DURATION_SECS, MAX_DURATION_SECS, self.duration_secs
            )));
        }
        if self.style.colors.is_empty() {
            return Err(WorkerError::InvalidRequest(
                "at least one color required".to_string(),
            ));
        }
        if self.llm_provider.trim().is_empty() {
            return Err(WorkerError::InvalidRequest(
                "llm_provider must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Job record ─────────────────────────────────────────────────────────────

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub topic: String,
    pub style: StyleProfile,
    pub llm_provider: String,
    pub duration_secs: u32,
    pub include_voiceover: bool,
    pub status: JobStatus,
    /// 0-100, never decreases.
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<Blueprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a PENDING job for a request with a fresh id.
    pub fn new(request: &VideoRequest) -> Self {
        Self::with_id(&uuid::Uuid::new_v4().to_string(), request)
    }

    pub fn with_id(id: &str, request: &VideoRequest) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            topic: request.topic.trim().to_string(),
            style: request.style.clone(),
            llm_provider: request.llm_provider.clone(),
            duration_secs: request.duration_secs,
            include_voiceover: request.include_voiceover,
            status: JobStatus::Pending,
            progress: 0,
            message: "Job queued".to_string(),
            script: None,
            blueprint: None,
            audio: None,
            video_path: None,
            report_url: None,
            error: None,
            warnings: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Reconstructs the request this job was created from.
    pub fn request(&self) -> VideoRequest {
        VideoRequest {
            topic: self.topic.clone(),
            style: self.style.clone(),
            llm_provider: self.llm_provider.clone(),
            include_voiceover: self.include_voiceover,
            duration_secs: self.duration_secs,
        }
    }

    /// Raises progress to `progress`, clamped to 100. Lower values are ignored.
    pub fn record_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    pub fn mark_processing(&mut self, message: &str) {
        self.status = JobStatus::Processing;
        self.message = message.to_string();
    }

    pub fn mark_completed(&mut self, message: &str) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.record_progress(100);
        self.message = message.to_string();
        self.completed_at = Some(now);
    }

    pub fn mark_failed(&mut self, error: &str) {
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(now);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
