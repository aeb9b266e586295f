pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, KNOWN_LLM_PROVIDERS, KNOWN_TTS_PROVIDERS};
pub use schema::{
    Config, GoogleDocsConfig, LlmConfig, MistralConfig, OllamaConfig, PipelineDefaults,
    GttsConfig, PiperConfig, RenderConfig, ReportConfig, SarvamConfig, TtsConfig,
};
