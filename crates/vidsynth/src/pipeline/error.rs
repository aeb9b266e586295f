use std::fmt;

use thiserror::Error;

use super::state::WorkflowStage;
use crate::error::RegistryError;
use crate::providers::ProviderError;

/// One provider's failed attempt inside a fallback chain.
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Every provider in a chain failed (or the chain was empty).
#[derive(Error, Debug)]
#[error("all providers unavailable{}", describe_attempts(.failures))]
pub struct ChainExhausted {
    pub failures: Vec<ProviderFailure>,
}

fn describe_attempts(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return " (none configured)".to_string();
    }
    let attempts: Vec<String> = failures.iter().map(ToString::to_string).collect();
    format!(" ({})", attempts.join(", "))
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage} stage failed: all providers unavailable{}", describe_attempts(.failures))]
    ProviderUnavailable {
        stage: WorkflowStage,
        failures: Vec<ProviderFailure>,
    },

    #[error("{stage} stage failed: {source}")]
    Failed {
        stage: WorkflowStage,
        #[source]
        source: ProviderError,
    },
}

impl StageError {
    pub fn stage(&self) -> WorkflowStage {
        match self {
            StageError::ProviderUnavailable { stage, .. } | StageError::Failed { stage, .. } => {
                *stage
            }
        }
    }

    pub(crate) fn unavailable(stage: WorkflowStage, exhausted: ChainExhausted) -> Self {
        StageError::ProviderUnavailable {
            stage,
            failures: exhausted.failures,
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("Job registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Non-fatal problems recorded on the job.
#[derive(Debug, Clone, PartialEq)]
pub enum StageWarning {
    OptionalStageDegraded { stage: WorkflowStage, reason: String },
    ReportFailed { reason: String },
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageWarning::OptionalStageDegraded { stage, reason } => {
                write!(f, "{} stage degraded: {}", stage, reason)
            }
            StageWarning::ReportFailed { reason } => write!(f, "report not written: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(provider: &str, message: &str) -> ProviderFailure {
        ProviderFailure {
            provider: provider.to_string(),
            error: ProviderError::GenerationFailed(message.to_string()),
        }
    }

    #[test]
    fn test_provider_unavailable_lists_attempts() {
        let err = StageError::ProviderUnavailable {
            stage: WorkflowStage::Script,
            failures: vec![failure("mistral", "401"), failure("phi3", "connection refused")],
        };
        assert_eq!(
            err.to_string(),
            "script stage failed: all providers unavailable \
             (mistral: Generation failed: 401, phi3: Generation failed: connection refused)"
        );
        assert_eq!(err.stage(), WorkflowStage::Script);
    }

    #[test]
    fn test_empty_chain_message() {
        let exhausted = ChainExhausted {
            failures: Vec::new(),
        };
        assert_eq!(
            exhausted.to_string(),
            "all providers unavailable (none configured)"
        );
    }

    #[test]
    fn test_failed_includes_source() {
        let err = StageError::Failed {
            stage: WorkflowStage::Render,
            source: ProviderError::RenderFailed("ffmpeg exited with 1".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "render stage failed: Render failed: ffmpeg exited with 1"
        );
    }

    #[test]
    fn test_warning_display() {
        let warning = StageWarning::OptionalStageDegraded {
            stage: WorkflowStage::Audio,
            reason: "no voices".to_string(),
        };
        assert_eq!(warning.to_string(), "audio stage degraded: no voices");
    }
}
