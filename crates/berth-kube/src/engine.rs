//! Cluster implementation of the release engine

use async_trait::async_trait;
use berth_core::ChartSource;
use berth_deploy::{EngineFailure, EngineReport, EngineRequest, ReleaseEngine};
use berth_engine::{Engine, ReleaseInfo, RenderContext, RenderResult};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{KubeError, Result};
use crate::manifest::parse_manifests;
use crate::resources::ResourceManager;
use crate::rollout::{RolloutWatcher, workloads};

/// Renders the materialized chart and applies it to a cluster
#[derive(Debug, Clone)]
pub struct KubeEngine {
    strict: bool,
    poll_interval: Option<Duration>,
}

impl Default for KubeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KubeEngine {
    pub fn new() -> Self {
        Self {
            strict: true,
            poll_interval: None,
        }
    }

    /// Allow undefined template variables
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Render the chart with the request's final values
    pub fn render(&self, request: &EngineRequest) -> Result<RenderResult> {
        let chart = ChartSource::load(&request.chart_path)?;
        let context = RenderContext::new(
            request.values.clone(),
            ReleaseInfo::new(&request.release, &request.namespace),
            chart.metadata_or_default(&request.release),
        );
        Ok(Engine::new(self.strict).render_chart(&chart, &context)?)
    }

    async fn run(&self, request: &EngineRequest) -> Result<EngineReport> {
        let deadline = Instant::now() + request.timeout;

        let rendered = self.render(request)?;
        let manifests = parse_manifests(&rendered.manifests)?;

        let client = connect(request.kube_context.as_deref()).await?;
        let manager = ResourceManager::new(client.clone()).await?;
        manager.ensure_namespace(&request.namespace).await?;
        let resources = manager.apply(&manifests, &request.namespace).await?;
        tracing::info!(
            release = %request.release,
            count = resources.len(),
            "applied resources"
        );

        let mut watcher = RolloutWatcher::new(client);
        if let Some(interval) = self.poll_interval {
            watcher = watcher.with_interval(interval);
        }
        watcher
            .wait(&workloads(&manifests, &request.namespace), deadline)
            .await?;

        Ok(EngineReport {
            resources,
            notes: rendered.notes,
        })
    }
}

#[async_trait]
impl ReleaseEngine for KubeEngine {
    async fn apply(
        &self,
        request: &EngineRequest,
    ) -> std::result::Result<EngineReport, EngineFailure> {
        self.run(request).await.map_err(|e| match e {
            KubeError::Timeout(pending) => EngineFailure::Timeout(pending),
            other => EngineFailure::Apply(other.to_string()),
        })
    }
}

/// Client for a kubeconfig context, or the inferred configuration
pub async fn connect(context: Option<&str>) -> Result<Client> {
    let config = match context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            Config::from_kubeconfig(&options)
                .await
                .map_err(|e| KubeError::Kubeconfig(format!("context '{}': {}", context, e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| KubeError::Kubeconfig(e.to_string()))?,
    };
    Ok(Client::try_from(config)?)
}
