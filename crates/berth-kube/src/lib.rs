//! Berth Kube - Kubernetes release engine
//!
//! [`KubeEngine`] implements [`berth_deploy::ReleaseEngine`]:
//! - renders the materialized chart with the final values
//! - creates the target namespace when missing
//! - applies every object with Server-Side Apply, ordered by [`ResourceCategory`]
//! - waits for Deployments, StatefulSets and DaemonSets to roll out

pub mod category;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod resources;
pub mod rollout;

pub use category::ResourceCategory;
pub use engine::{KubeEngine, connect};
pub use error::{KubeError, Result};
pub use manifest::{Manifest, parse_manifests};
pub use resources::{FIELD_MANAGER, ResourceManager};
pub use rollout::{Readiness, RolloutWatcher, Workload, WorkloadKind};
