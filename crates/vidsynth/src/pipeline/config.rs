use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;

/// Settings a workflow run needs, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_directory: PathBuf,
    pub temp_directory: PathBuf,
    pub report_directory: PathBuf,
    /// Narration language, or `auto`.
    pub tts_language: String,
    pub llm_timeout: Duration,
    pub tts_timeout: Duration,
    pub render_timeout: Duration,
    pub report_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_directory: config.output_dir(),
            temp_directory: config.temp_dir(),
            report_directory: config.report_dir(),
            tts_language: config.tts.language.clone(),
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            tts_timeout: Duration::from_secs(config.tts.timeout_secs),
            render_timeout: Duration::from_secs(config.render.timeout_secs),
            report_timeout: Duration::from_secs(config.report.timeout_secs),
        }
    }

    /// Default settings with every directory under `root`.
    pub fn rooted_at(root: &Path) -> Self {
        let mut config = Self::from_config(&Config::with_defaults());
        config.output_directory = root.join("videos");
        config.temp_directory = root.join("temp");
        config.report_directory = root.join("reports");
        config
    }

    pub fn with_timeouts(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self.tts_timeout = timeout;
        self.render_timeout = timeout;
        self.report_timeout = timeout;
        self
    }
}
