//! Rollout wait for workloads
//!
//! A workload is ready when every replica runs the new spec and passes its
//! readiness probe. Only Deployments, StatefulSets and DaemonSets are
//! watched; other kinds are ready as soon as they are applied.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use kube::api::Api;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{KubeError, Result};
use crate::manifest::Manifest;

/// Default delay between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Workload kinds with a rollout to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(Self::Deployment),
            "StatefulSet" => Some(Self::StatefulSet),
            "DaemonSet" => Some(Self::DaemonSet),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
        }
    }
}

/// A workload to watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
}

impl Workload {
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.kind.as_str(), self.name)
    }
}

/// Readiness of one workload at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Workloads among applied manifests
pub fn workloads(manifests: &[Manifest], namespace: &str) -> Vec<Workload> {
    manifests
        .iter()
        .filter_map(|m| {
            let kind = WorkloadKind::from_kind(m.kind())?;
            Some(Workload {
                kind,
                name: m.name().to_string(),
                namespace: m
                    .object
                    .metadata
                    .namespace
                    .clone()
                    .unwrap_or_else(|| namespace.to_string()),
            })
        })
        .collect()
}

/// Deployment: all replicas updated, ready and available for the latest generation
pub fn deployment_readiness(deployment: &Deployment) -> Readiness {
    let Some(status) = deployment.status.as_ref() else {
        return Readiness::Pending("no status yet".to_string());
    };

    let generation = deployment.metadata.generation.unwrap_or(0);
    if status.observed_generation.unwrap_or(0) < generation {
        return Readiness::Pending("spec update not observed yet".to_string());
    }

    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = status.ready_replicas.unwrap_or(0);
    let updated = status.updated_replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);

    if ready >= desired && updated >= desired && available >= desired {
        return Readiness::Ready;
    }

    let conditions = status
        .conditions
        .iter()
        .flatten()
        .filter(|c| c.status == "False")
        .filter_map(|c| c.message.as_ref().map(|m| format!("{}: {}", c.type_, m)))
        .collect::<Vec<_>>()
        .join("; ");

    if conditions.is_empty() {
        Readiness::Pending(format!(
            "{}/{} ready, {}/{} updated, {}/{} available",
            ready, desired, updated, desired, available, desired
        ))
    } else {
        Readiness::Pending(conditions)
    }
}

/// StatefulSet: all replicas ready and on the update revision
pub fn statefulset_readiness(sts: &StatefulSet) -> Readiness {
    let Some(status) = sts.status.as_ref() else {
        return Readiness::Pending("no status yet".to_string());
    };

    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready = status.ready_replicas.unwrap_or(0);
    let revision_match = status.current_revision == status.update_revision;

    if ready >= desired && revision_match {
        Readiness::Ready
    } else {
        Readiness::Pending(format!(
            "{}/{} ready, revision match: {}",
            ready, desired, revision_match
        ))
    }
}

/// DaemonSet: every scheduled pod updated and ready
pub fn daemonset_readiness(ds: &DaemonSet) -> Readiness {
    let Some(status) = ds.status.as_ref() else {
        return Readiness::Pending("no status yet".to_string());
    };

    let desired = status.desired_number_scheduled;
    let ready = status.number_ready;
    let updated = status.updated_number_scheduled.unwrap_or(0);

    if ready >= desired && updated >= desired {
        Readiness::Ready
    } else {
        Readiness::Pending(format!(
            "{}/{} ready, {}/{} updated",
            ready, desired, updated, desired
        ))
    }
}

/// Polls workloads until all are ready or time runs out
pub struct RolloutWatcher {
    client: kube::Client,
    interval: Duration,
}

impl RolloutWatcher {
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait for every workload; `KubeError::Timeout` names the stragglers
    pub async fn wait(&self, workloads: &[Workload], deadline: Instant) -> Result<()> {
        let mut pending: Vec<&Workload> = workloads.iter().collect();

        loop {
            let mut still_pending = Vec::new();
            for workload in pending {
                match self.readiness(workload).await? {
                    Readiness::Ready => {
                        tracing::debug!(workload = %workload.display_name(), "ready");
                    }
                    Readiness::Pending(reason) => {
                        tracing::debug!(workload = %workload.display_name(), %reason, "waiting");
                        still_pending.push(workload);
                    }
                }
            }
            pending = still_pending;

            if pending.is_empty() {
                return Ok(());
            }

            if Instant::now() + self.interval >= deadline {
                let names: Vec<_> = pending.iter().map(|w| w.display_name()).collect();
                return Err(KubeError::Timeout(names.join(", ")));
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn readiness(&self, workload: &Workload) -> Result<Readiness> {
        let client = self.client.clone();
        let ns = workload.namespace.as_str();
        let name = workload.name.as_str();

        let readiness = match workload.kind {
            WorkloadKind::Deployment => Api::<Deployment>::namespaced(client, ns)
                .get_opt(name)
                .await?
                .map(|d| deployment_readiness(&d)),
            WorkloadKind::StatefulSet => Api::<StatefulSet>::namespaced(client, ns)
                .get_opt(name)
                .await?
                .map(|s| statefulset_readiness(&s)),
            WorkloadKind::DaemonSet => Api::<DaemonSet>::namespaced(client, ns)
                .get_opt(name)
                .await?
                .map(|d| daemonset_readiness(&d)),
        };

        Ok(readiness.unwrap_or_else(|| Readiness::Pending("not found".to_string())))
    }
}
