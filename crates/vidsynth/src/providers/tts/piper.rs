use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::truncate_text;
use crate::config::PiperConfig;
use crate::providers::error::{ProviderError, Result};
use crate::providers::{Provider, SpeechProvider};
use crate::secrets::expand_home;

/// Offline speech through the `piper` command-line synthesizer.
pub struct PiperSpeech {
    binary: String,
    model_directory: Option<PathBuf>,
}

impl PiperSpeech {
    pub fn new(config: &PiperConfig) -> Self {
        Self {
            binary: expand_home(&config.binary),
            model_directory: config
                .model_directory
                .as_deref()
                .map(|d| PathBuf::from(expand_home(d))),
        }
    }

    /// Voice model name for a language; unknown languages use the English voice.
    pub fn voice_for(language: &str) -> &'static str {
        match language {
            "hi" => "hi_IN-medium",
            "ta" => "ta_IN-medium",
            "te" => "te_IN-medium",
            _ => "en_US-lessac-medium",
        }
    }

    fn model_arg(&self, language: &str) -> String {
        let voice = Self::voice_for(language);
        match &self.model_directory {
            Some(dir) => dir.join(format!("{}.onnx", voice)).display().to_string(),
            None => voice.to_string(),
        }
    }
}

impl Provider for PiperSpeech {
    fn name(&self) -> &str {
        "piper"
    }
}

#[async_trait]
impl SpeechProvider for PiperSpeech {
    async fn synthesize(&self, text: &str, language: &str, output_path: &Path) -> Result<PathBuf> {
        let model = self.model_arg(language);
        log::info!("Synthesizing {} narration with piper voice {}", language, model);

        let mut child = Command::new(&self.binary)
            .arg("--model")
            .arg(&model)
            .arg("--output_file")
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProviderError::SynthesisFailed(format!("Failed to start '{}': {}", self.binary, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(truncate_text(text).as_bytes())
                .await
                .map_err(|e| ProviderError::SynthesisFailed(format!("piper stdin: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProviderError::SynthesisFailed(format!("piper did not finish: {}", e)))?;

        if !output.status.success() {
            return Err(ProviderError::SynthesisFailed(format!(
                "piper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let written = tokio::fs::metadata(output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(ProviderError::SynthesisFailed(
                "piper produced no audio".to_string(),
            ));
        }

        Ok(output_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_map() {
        assert_eq!(PiperSpeech::voice_for("en"), "en_US-lessac-medium");
        assert_eq!(PiperSpeech::voice_for("hi"), "hi_IN-medium");
        assert_eq!(PiperSpeech::voice_for("ta"), "ta_IN-medium");
        assert_eq!(PiperSpeech::voice_for("te"), "te_IN-medium");
        assert_eq!(PiperSpeech::voice_for("bn"), "en_US-lessac-medium");
    }

    #[test]
    fn test_model_arg_with_directory() {
        let piper = PiperSpeech::new(&PiperConfig {
            binary: "piper".to_string(),
            model_directory: Some("/opt/voices".to_string()),
        });
        assert_eq!(piper.model_arg("hi"), "/opt/voices/hi_IN-medium.onnx");
    }

    #[tokio::test]
    async fn test_missing_binary_is_synthesis_failure() {
        let piper = PiperSpeech::new(&PiperConfig {
            binary: "/nonexistent/bin/piper".to_string(),
            model_directory: None,
        });
        let dir = tempfile::tempdir().unwrap();

        let err = piper
            .synthesize("hello", "en", &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::SynthesisFailed(_)));
    }
}
