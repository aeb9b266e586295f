//! The workflow engine: script, blueprint, audio, render and report stages
//! run in that order for each job.

pub mod config;
pub mod error;
pub mod fallback;
pub mod progress;
pub mod runner;
pub mod stages;
pub mod state;

pub use config::PipelineConfig;
pub use error::{ChainExhausted, ProviderFailure, StageError, StageWarning, WorkflowError};
pub use fallback::{ProviderChain, Sourced};
pub use progress::{NoopProgress, ProgressReporter, RecordingProgress};
pub use runner::{PipelineOutput, Workflow};
pub use stages::{AudioOutcome, ReportOutcome, StageProviders};
pub use state::{PipelineState, WorkflowStage};
