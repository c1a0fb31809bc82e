//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Project configuration not found: {path}")]
    ProjectNotFound { path: String },

    #[error("Invalid berth.yaml: {message}")]
    InvalidProject { message: String },

    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart: {message}")]
    InvalidChart { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("Values merge error: {message}")]
    ValuesMerge { message: String },

    #[error("Unknown tag strategy '{0}' (expected custom, git-branch, git-tag, git-commit or content-digest)")]
    UnknownTagStrategy(String),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// Errors raised while loading or decrypting secret values.
///
/// `origin` names the input that failed (a file path or `<inline #n>`),
/// never the secret content itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("cannot access secrets for {origin}: {reason}")]
    Access { origin: String, reason: String },

    #[error("malformed secret values in {origin}: {reason}")]
    Parse { origin: String, reason: String },
}

impl SecretError {
    pub fn access(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Access {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
