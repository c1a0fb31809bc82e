//! Release deployment: final overrides, engine invocation, timeout

use async_trait::async_trait;
use berth_core::{Values, parse_set_string_values, parse_set_values};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::DeployError;
use crate::materialize::MaterializedChart;

/// User overrides, applied on top of everything else
///
/// Precedence within the set: value files (in order) < `set` < `set_string`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSet {
    /// Value files
    pub values: Vec<PathBuf>,
    /// `key=value` pairs, typed
    pub set: Vec<String>,
    /// `key=value` pairs, always strings
    pub set_string: Vec<String>,
}

impl OverrideSet {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.set.is_empty() && self.set_string.is_empty()
    }

    /// Read and merge all overrides into one layer
    pub async fn load(&self) -> Result<Values, DeployError> {
        let invalid = |reason: String| DeployError::InvalidOverride { reason };

        let contents = futures::future::try_join_all(self.values.iter().map(|path| async move {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| invalid(format!("cannot read {}: {}", path.display(), e)))
        }))
        .await?;

        let mut layer = Values::new();
        for (path, content) in self.values.iter().zip(contents) {
            let file_values = Values::from_yaml(&content)
                .map_err(|e| invalid(format!("{}: {}", path.display(), e)))?;
            layer.merge(&file_values);
        }

        let set = parse_set_values(&self.set).map_err(|e| invalid(e.to_string()))?;
        layer.merge(&set);

        let set_string =
            parse_set_string_values(&self.set_string).map_err(|e| invalid(e.to_string()))?;
        layer.merge(&set_string);

        Ok(layer)
    }
}

/// Where and how long to deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub release: String,
    pub namespace: String,
    /// Kubeconfig context; `None` uses the current context
    pub kube_context: Option<String>,
    pub timeout: Duration,
}

/// Everything the engine needs for one apply
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub chart_path: PathBuf,
    pub release: String,
    pub namespace: String,
    pub kube_context: Option<String>,
    /// Final values: chart values with the override set applied
    pub values: Values,
    /// Overrides as the user gave them
    pub overrides: OverrideSet,
    pub timeout: Duration,
}

/// What the engine reports back on success
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Applied resources, as `Kind/name`
    pub resources: Vec<String>,
    /// Rendered NOTES.txt
    pub notes: Option<String>,
}

/// Engine-side failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineFailure {
    /// Resources were applied but did not become ready in time
    #[error("rollout did not complete: {0}")]
    Timeout(String),

    #[error("{0}")]
    Apply(String),
}

/// Templating and cluster-apply engine
#[async_trait]
pub trait ReleaseEngine: Send + Sync {
    /// Apply the chart and wait until it is stable
    async fn apply(&self, request: &EngineRequest) -> Result<EngineReport, EngineFailure>;
}

/// Submits a materialized chart to the engine
#[derive(Clone)]
pub struct ReleaseDeployer {
    engine: Arc<dyn ReleaseEngine>,
}

impl ReleaseDeployer {
    pub fn new(engine: Arc<dyn ReleaseEngine>) -> Self {
        Self { engine }
    }

    /// Deploy once; never retries
    pub async fn deploy(
        &self,
        chart: &MaterializedChart,
        target: &DeploymentTarget,
        overrides: &OverrideSet,
    ) -> Result<EngineReport, DeployError> {
        let mut values = chart.values().clone();
        values.merge(&overrides.load().await?);

        let request = EngineRequest {
            chart_path: chart.path().to_path_buf(),
            release: target.release.clone(),
            namespace: target.namespace.clone(),
            kube_context: target.kube_context.clone(),
            values,
            overrides: overrides.clone(),
            timeout: target.timeout,
        };

        tracing::debug!(
            release = %target.release,
            namespace = %target.namespace,
            timeout = ?target.timeout,
            "submitting chart"
        );

        let timed_out = || DeployError::DeployTimeout {
            release: target.release.clone(),
            timeout: target.timeout,
        };

        match tokio::time::timeout(target.timeout, self.engine.apply(&request)).await {
            Err(_) => Err(timed_out()),
            Ok(Err(EngineFailure::Timeout(detail))) => {
                tracing::debug!(%detail, "engine reported rollout timeout");
                Err(timed_out())
            }
            Ok(Err(EngineFailure::Apply(message))) => Err(DeployError::DeployApply {
                release: target.release.clone(),
                message,
            }),
            Ok(Ok(report)) => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_override_precedence() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.yaml");
        let second = dir.path().join("b.yaml");
        fs::write(&first, "x: from-a\ny: from-a\nz: from-a\nw: from-a\n").unwrap();
        fs::write(&second, "y: from-b\nz: from-b\nw: from-b\n").unwrap();

        let overrides = OverrideSet {
            values: vec![first, second],
            set: vec!["z=5".to_string(), "w=5".to_string()],
            set_string: vec!["w=5".to_string()],
        };
        let layer = overrides.load().await.unwrap();

        assert_eq!(layer.get("x").unwrap(), "from-a");
        assert_eq!(layer.get("y").unwrap(), "from-b");
        assert_eq!(layer.get("z").unwrap(), 5);
        assert_eq!(layer.get("w").unwrap(), "5");
    }

    #[tokio::test]
    async fn test_invalid_overrides() {
        let missing = OverrideSet {
            values: vec![PathBuf::from("/nonexistent/values.yaml")],
            ..Default::default()
        };
        assert!(matches!(
            missing.load().await.unwrap_err(),
            DeployError::InvalidOverride { .. }
        ));

        let malformed = OverrideSet {
            set: vec!["no-equals-sign".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            malformed.load().await.unwrap_err(),
            DeployError::InvalidOverride { .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_overrides() {
        let overrides = OverrideSet::default();
        assert!(overrides.is_empty());
        assert!(overrides.load().await.unwrap().is_empty());
    }
}
