use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// LLM backends the script and blueprint stages can be wired to.
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["mistral", "phi3"];

/// Speech backends the audio stage can be wired to.
pub const KNOWN_TTS_PROVIDERS: &[&str] = &["gtts", "piper", "sarvam"];

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_provider_list(
    section: &str,
    providers: &[String],
    known: &[&str],
) -> Result<(), ConfigError> {
    if providers.is_empty() {
        return Err(ConfigError::Validation {
            message: format!("{}.providers must list at least one provider", section),
        });
    }

    let mut seen = HashSet::new();
    for name in providers {
        if !known.contains(&name.as_str()) {
            return Err(ConfigError::Validation {
                message: format!(
                    "Unknown {} provider '{}' (known: {})",
                    section,
                    name,
                    known.join(", ")
                ),
            });
        }
        if !seen.insert(name) {
            return Err(ConfigError::Validation {
                message: format!("Duplicate {} provider '{}'", section, name),
            });
        }
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.max_concurrent_jobs == 0 {
        return Err(ConfigError::Validation {
            message: "max_concurrent_jobs must be at least 1".to_string(),
        });
    }

    validate_provider_list("llm", &config.llm.providers, KNOWN_LLM_PROVIDERS)?;
    // An empty TTS list is allowed; every job then gets placeholder audio.
    if !config.tts.providers.is_empty() {
        validate_provider_list("tts", &config.tts.providers, KNOWN_TTS_PROVIDERS)?;
    }

    if config.render.width % 2 != 0 || config.render.height % 2 != 0 {
        return Err(ConfigError::Validation {
            message: format!(
                "render size {}x{} must have even dimensions",
                config.render.width, config.render.height
            ),
        });
    }

    for (name, secret) in [
        ("llm.mistral.api_key", &config.llm.mistral.api_key),
        ("tts.sarvam.api_key", &config.tts.sarvam.api_key),
        ("report.google_docs.access_token", &config.report.google_docs.access_token),
    ] {
        // A configured file that cannot be read is a mistake worth failing on;
        // an unset env var just disables the provider.
        secret
            .resolve_optional()
            .map_err(|source| ConfigError::Secret {
                name: name.to_string(),
                source,
            })?;
    }

    Ok(())
}
