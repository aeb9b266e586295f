pub mod artifacts;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod secrets;
pub mod telemetry;
pub mod worker;

pub use artifacts::{AudioArtifact, Blueprint, Scene, Script};
pub use broadcast::{EventKind, JobQuery, JobStore, ProgressChannel, ProgressEvent};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, RegistryError, Result, VidsynthError, WorkerError};
pub use pipeline::{PipelineConfig, StageProviders, Workflow, WorkflowStage};
pub use secrets::{SecretError, SecretRef};
pub use worker::{HealthReport, Job, JobStatus, StyleProfile, StyleType, VideoRequest, WorkerPool};
