//! Deployment pipeline errors

use berth_core::SecretError;
use berth_registry::RegistryError;
use miette::Diagnostic;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    ResolvingImages,
    LoadingSecrets,
    ComposingValues,
    MaterializingChart,
    Deploying,
    Done,
    Failed,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ResolvingImages => "resolving images",
            Self::LoadingSecrets => "loading secrets",
            Self::ComposingValues => "composing values",
            Self::MaterializingChart => "materializing chart",
            Self::Deploying => "deploying",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the deployment pipeline
///
/// Each variant belongs to exactly one stage (see [`DeployError::stage`]).
#[derive(Error, Debug, Diagnostic)]
pub enum DeployError {
    #[error("Cannot access secret values in {origin}: {reason}")]
    #[diagnostic(
        code(berth::deploy::secret_access),
        help("set BERTH_SECRET_KEY or create .berth_secret_key in the project directory")
    )]
    SecretAccess { origin: String, reason: String },

    #[error("Malformed secret values in {origin}: {reason}")]
    #[diagnostic(
        code(berth::deploy::secret_parse),
        help("secret values must be a YAML mapping of encrypted strings")
    )]
    SecretParse { origin: String, reason: String },

    #[error("Cannot resolve image '{image}': {message}")]
    #[diagnostic(code(berth::deploy::image_resolution))]
    ImageResolution { image: String, message: String },

    #[error("Duplicate image name '{name}'")]
    #[diagnostic(
        code(berth::deploy::duplicate_image),
        help("image names in berth.yaml must be unique")
    )]
    DuplicateImage { name: String },

    #[error("Invalid service values: {message}")]
    #[diagnostic(code(berth::deploy::service_value))]
    ServiceValue { message: String },

    #[error("Cannot prepare chart at {}: {message}", path.display())]
    #[diagnostic(code(berth::deploy::chart_prep))]
    ChartPrep { path: PathBuf, message: String },

    #[error("Invalid override: {reason}")]
    #[diagnostic(code(berth::deploy::invalid_override))]
    InvalidOverride { reason: String },

    #[error("Release '{release}' was not ready within {timeout:?}")]
    #[diagnostic(
        code(berth::deploy::timeout),
        help("raise --timeout, or inspect the workloads with kubectl")
    )]
    DeployTimeout { release: String, timeout: Duration },

    #[error("Failed to deploy release '{release}': {message}")]
    #[diagnostic(code(berth::deploy::apply))]
    DeployApply { release: String, message: String },

    #[error("Deadline of {deadline:?} exceeded while {stage}")]
    #[diagnostic(code(berth::deploy::deadline))]
    DeadlineExceeded { stage: Stage, deadline: Duration },
}

impl DeployError {
    /// Stage that produced this error
    pub fn stage(&self) -> Stage {
        match self {
            Self::ImageResolution { .. } | Self::DuplicateImage { .. } => Stage::ResolvingImages,
            Self::SecretAccess { .. } | Self::SecretParse { .. } => Stage::LoadingSecrets,
            Self::ServiceValue { .. } => Stage::ComposingValues,
            Self::ChartPrep { .. } => Stage::MaterializingChart,
            Self::InvalidOverride { .. }
            | Self::DeployTimeout { .. }
            | Self::DeployApply { .. } => Stage::Deploying,
            Self::DeadlineExceeded { stage, .. } => *stage,
        }
    }

    pub(crate) fn service_value(message: impl Into<String>) -> Self {
        Self::ServiceValue {
            message: message.into(),
        }
    }

    pub(crate) fn chart_prep(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::ChartPrep {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<SecretError> for DeployError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::Access { origin, reason } => Self::SecretAccess { origin, reason },
            SecretError::Parse { origin, reason } => Self::SecretParse { origin, reason },
        }
    }
}

impl From<RegistryError> for DeployError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::DuplicateImage { name } => Self::DuplicateImage { name },
            RegistryError::ImageResolution { image, source } => Self::ImageResolution {
                image,
                message: source.to_string(),
            },
            other => Self::ImageResolution {
                image: "*".to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Failure to delete a materialized chart
///
/// Never fatal: it is reported through the diagnostic sink and the pipeline's
/// own result is returned unchanged.
#[derive(Error, Debug)]
#[error("Failed to remove temporary chart {}: {source}", path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
