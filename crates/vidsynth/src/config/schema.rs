use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::secrets::{expand_home, SecretRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
    #[serde(default = "default_temp_directory")]
    pub temp_directory: String,
    #[serde(default = "default_report_directory")]
    pub report_directory: String,
    /// SQLite file for job records. Defaults to `~/.vidsynth/data/vidsynth.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub pipeline: PipelineDefaults,
}

impl Config {
    /// A config with every section at its default.
    pub fn with_defaults() -> Self {
        Self {
            version: "1.0".to_string(),
            output_directory: default_output_directory(),
            temp_directory: default_temp_directory(),
            report_directory: default_report_directory(),
            database_path: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
            render: RenderConfig::default(),
            report: ReportConfig::default(),
            pipeline: PipelineDefaults::default(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.output_directory))
    }

    pub fn temp_dir(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.temp_directory))
    }

    pub fn report_dir(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.report_directory))
    }

    pub fn database_file(&self) -> Option<PathBuf> {
        self.database_path
            .as_deref()
            .map(|p| PathBuf::from(expand_home(p)))
    }
}

fn default_output_directory() -> String {
    "generated_videos".to_string()
}

fn default_temp_directory() -> String {
    "temp_files".to_string()
}

fn default_report_directory() -> String {
    "analysis_reports".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get()
}

// ─── LLM ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Fallback order. A request starts at its selected provider and
    /// continues down this list.
    #[serde(default = "default_llm_providers")]
    pub providers: Vec<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_script_temperature")]
    pub script_temperature: f32,
    #[serde(default = "default_blueprint_temperature")]
    pub blueprint_temperature: f32,
    #[serde(default)]
    pub mistral: MistralConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_llm_providers() -> Vec<String> {
    vec!["mistral".to_string(), "phi3".to_string()]
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_script_temperature() -> f32 {
    0.7
}

fn default_blueprint_temperature() -> f32 {
    0.6
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: default_llm_providers(),
            timeout_secs: default_llm_timeout(),
            max_tokens: default_max_tokens(),
            script_temperature: default_script_temperature(),
            blueprint_temperature: default_blueprint_temperature(),
            mistral: MistralConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralConfig {
    #[serde(default = "default_mistral_url")]
    pub base_url: String,
    #[serde(default = "default_mistral_model")]
    pub model: String,
    #[serde(default = "default_mistral_key")]
    pub api_key: SecretRef,
}

fn default_mistral_url() -> String {
    "https://api.mistral.ai/v1".to_string()
}

fn default_mistral_model() -> String {
    "mistral-large-latest".to_string()
}

fn default_mistral_key() -> SecretRef {
    SecretRef::from_env("MISTRAL_API_KEY")
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            base_url: default_mistral_url(),
            model: default_mistral_model(),
            api_key: default_mistral_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "phi3:mini".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_ollama_model(),
        }
    }
}

// ─── TTS ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_providers")]
    pub providers: Vec<String>,
    /// Language code, or `auto` to detect from the narration script.
    #[serde(default = "default_tts_language")]
    pub language: String,
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub piper: PiperConfig,
    #[serde(default)]
    pub sarvam: SarvamConfig,
    #[serde(default)]
    pub gtts: GttsConfig,
}

fn default_tts_providers() -> Vec<String> {
    vec!["sarvam".to_string(), "gtts".to_string(), "piper".to_string()]
}

fn default_tts_language() -> String {
    "auto".to_string()
}

fn default_tts_timeout() -> u64 {
    120
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            providers: default_tts_providers(),
            language: default_tts_language(),
            timeout_secs: default_tts_timeout(),
            piper: PiperConfig::default(),
            sarvam: SarvamConfig::default(),
            gtts: GttsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiperConfig {
    #[serde(default = "default_piper_binary")]
    pub binary: String,
    /// Directory holding the `.onnx` voice models. Bare voice names are
    /// passed through when unset.
    #[serde(default)]
    pub model_directory: Option<String>,
}

fn default_piper_binary() -> String {
    "piper".to_string()
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            binary: default_piper_binary(),
            model_directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarvamConfig {
    #[serde(default = "default_sarvam_url")]
    pub endpoint: String,
    #[serde(default = "default_sarvam_model")]
    pub model: String,
    #[serde(default = "default_sarvam_key")]
    pub api_key: SecretRef,
}

fn default_sarvam_url() -> String {
    "https://api.sarvam.ai/text-to-speech".to_string()
}

fn default_sarvam_model() -> String {
    "bulbul:v2".to_string()
}

fn default_sarvam_key() -> SecretRef {
    SecretRef::from_env("SARVAM_API_KEY")
}

impl Default for SarvamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_sarvam_url(),
            model: default_sarvam_model(),
            api_key: default_sarvam_key(),
        }
    }
}

/// Google Translate speech. Needs no key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GttsConfig {
    #[serde(default = "default_gtts_url")]
    pub endpoint: String,
}

fn default_gtts_url() -> String {
    "https://translate.google.com/translate_tts".to_string()
}

impl Default for GttsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gtts_url(),
        }
    }
}

// ─── Render ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_bookend_secs")]
    pub intro_secs: f64,
    #[serde(default = "default_bookend_secs")]
    pub outro_secs: f64,
    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_fps() -> u32 {
    30
}

fn default_bookend_secs() -> f64 {
    3.0
}

fn default_render_timeout() -> u64 {
    600
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            intro_secs: default_bookend_secs(),
            outro_secs: default_bookend_secs(),
            timeout_secs: default_render_timeout(),
        }
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub google_docs: GoogleDocsConfig,
    #[serde(default = "default_report_timeout")]
    pub timeout_secs: u64,
}

fn default_report_timeout() -> u64 {
    30
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            google_docs: GoogleDocsConfig::default(),
            timeout_secs: default_report_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleDocsConfig {
    #[serde(default = "default_docs_url")]
    pub api_base: String,
    #[serde(default = "default_docs_token")]
    pub access_token: SecretRef,
}

fn default_docs_url() -> String {
    "https://docs.googleapis.com/v1".to_string()
}

fn default_docs_token() -> SecretRef {
    SecretRef::from_env("GOOGLE_DOCS_ACCESS_TOKEN")
}

impl Default for GoogleDocsConfig {
    fn default() -> Self {
        Self {
            api_base: default_docs_url(),
            access_token: default_docs_token(),
        }
    }
}

// ─── Pipeline ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefaults {
    #[serde(default = "default_duration")]
    pub default_duration_secs: u32,
}

fn default_duration() -> u32 {
    crate::worker::job::DEFAULT_DURATION_SECS
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            default_duration_secs: default_duration(),
        }
    }
}
