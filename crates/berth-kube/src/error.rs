//! Error types for berth-kube

use thiserror::Error;

/// Result type for berth-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Kubeconfig could not be loaded or the context does not exist
    #[error("cannot load kubeconfig: {0}")]
    Kubeconfig(String),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Resource type not served by the cluster
    #[error("unknown resource type: {api_version}/{kind}")]
    UnknownResource { api_version: String, kind: String },

    /// Apply rejected by the API server
    #[error("failed to apply {resource}: {message}")]
    ApplyFailed { resource: String, message: String },

    /// Template rendering error
    #[error("template error: {0}")]
    Template(String),

    /// Chart loading error
    #[error("chart error: {0}")]
    Chart(String),

    /// Workloads did not become ready in time
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::InvalidManifest(e.to_string())
    }
}

impl From<berth_core::CoreError> for KubeError {
    fn from(e: berth_core::CoreError) -> Self {
        KubeError::Chart(e.to_string())
    }
}

impl From<berth_engine::EngineError> for KubeError {
    fn from(e: berth_engine::EngineError) -> Self {
        KubeError::Template(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }
}
