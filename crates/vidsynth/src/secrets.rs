//! Provider credential resolution.
//!
//! Every API key or token in the config is a [`SecretRef`] that can point
//! at up to three sources, tried in order:
//!
//! 1. an inline `value` (handy for local runs)
//! 2. a `file` whose trimmed contents are the secret (mounted secrets)
//! 3. an `env` variable name

use std::env::{self, VarError};
use std::fs;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("no credential source set (expected one of value, file, env)")]
    NoSourceProvided,

    #[error("cannot read credential file {path}: {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("credential variable {name} is not set")]
    EnvVarNotSet { name: String },

    #[error("credential variable {name} is not valid unicode")]
    EnvVarNotUnicode { name: String },

    #[error("credential is blank")]
    Empty,
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where to find one credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

impl SecretRef {
    pub fn from_env(name: &str) -> Self {
        Self {
            env: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn from_value(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Default::default()
        }
    }

    pub fn from_file(path: &str) -> Self {
        Self {
            file: Some(path.to_string()),
            ..Default::default()
        }
    }

    /// Whether any source is named. Says nothing about whether it resolves.
    pub fn is_configured(&self) -> bool {
        [&self.value, &self.file, &self.env]
            .into_iter()
            .any(|field| present(field).is_some())
    }

    /// Resolves the secret from the first named source.
    ///
    /// Later sources are not consulted when an earlier one is set but
    /// unreadable.
    pub fn resolve(&self) -> Result<SecretString> {
        if let Some(value) = present(&self.value) {
            return Ok(SecretString::from(value.to_string()));
        }

        if let Some(path) = present(&self.file) {
            let path = expand_home(path);
            let contents = fs::read_to_string(&path)
                .map_err(|source| SecretError::FileReadError { path, source })?;
            return non_empty(contents.trim());
        }

        if let Some(name) = present(&self.env) {
            return match env::var(name) {
                Ok(value) => non_empty(value.trim()),
                Err(VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            };
        }

        Err(SecretError::NoSourceProvided)
    }

    /// Like [`SecretRef::resolve`], but an unset env var or missing source
    /// yields `None` instead of an error.
    ///
    /// Optional providers (a paid TTS service, a cloud report writer) are
    /// left out of their chain when their key is absent.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NoSourceProvided)
            | Err(SecretError::EnvVarNotSet { .. })
            | Err(SecretError::Empty) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn non_empty(value: &str) -> Result<SecretString> {
    if value.is_empty() {
        return Err(SecretError::Empty);
    }
    Ok(SecretString::from(value.to_string()))
}

/// Replaces a leading `~` with the user's home directory.
///
/// `~user/...` is left alone.
pub fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
        Some(home) => format!("{}{}", home.to_string_lossy(), rest),
        None => path.to_string(),
    }
}
