use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a single provider call.
///
/// The fallback chain absorbs these; callers only see them inside
/// `ProviderFailure` records or a render `StageError`.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Report write failed: {0}")]
    ReportFailed(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProviderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
