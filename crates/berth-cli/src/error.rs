//! CLI error types with exit code handling

use berth_core::{CoreError, SecretError};
use berth_deploy::DeployError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Pipeline failure, with the pipeline's own diagnostic
    #[error(transparent)]
    #[diagnostic(transparent)]
    Deploy(#[from] DeployError),

    /// Project configuration could not be loaded
    #[error("Project error: {message}")]
    #[diagnostic(code(berth::cli::project))]
    Project {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Invalid command-line input
    #[error("Invalid input: {message}")]
    #[diagnostic(code(berth::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Secret key or secret file handling failed
    #[error("Secret error: {message}")]
    #[diagnostic(code(berth::cli::secret))]
    Secret { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(berth::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(berth::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Deploy(err) => match err {
                DeployError::SecretAccess { .. } | DeployError::SecretParse { .. } => {
                    exit_codes::SECRET_ERROR
                }
                DeployError::ImageResolution { .. } => exit_codes::REGISTRY_ERROR,
                DeployError::DuplicateImage { .. }
                | DeployError::ServiceValue { .. }
                | DeployError::InvalidOverride { .. } => exit_codes::VALIDATION_ERROR,
                DeployError::ChartPrep { .. } => exit_codes::CHART_ERROR,
                DeployError::DeployApply { message, .. }
                    if message.starts_with("template error") =>
                {
                    exit_codes::TEMPLATE_ERROR
                }
                DeployError::DeployApply { .. } => exit_codes::DEPLOY_ERROR,
                DeployError::DeployTimeout { .. } | DeployError::DeadlineExceeded { .. } => {
                    exit_codes::TIMEOUT_ERROR
                }
            },
            CliError::Project { .. } => exit_codes::CHART_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Secret { .. } => exit_codes::SECRET_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a usage error with help text
    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn secret(message: impl Into<String>) -> Self {
        Self::Secret {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProjectNotFound { .. } => CliError::Project {
                message: err.to_string(),
                help: Some("Run berth from the project directory or pass --dir".to_string()),
            },
            CoreError::Secret(secret) => secret.into(),
            CoreError::Io(io) => io.into(),
            CoreError::UnknownTagStrategy(_) => CliError::Usage {
                message: err.to_string(),
                help: None,
            },
            other => CliError::Project {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<SecretError> for CliError {
    fn from(err: SecretError) -> Self {
        CliError::secret(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
