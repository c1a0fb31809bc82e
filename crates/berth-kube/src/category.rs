//! Apply ordering by resource category

/// Resource category, in apply order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceCategory {
    /// CustomResourceDefinition - installed first
    Crd = 0,
    /// Namespace - created before namespace-scoped resources
    Namespace = 1,
    /// ResourceQuota, LimitRange
    NamespaceConfig = 2,
    /// ClusterRole, ClusterRoleBinding
    ClusterRbac = 10,
    /// Role, RoleBinding, ServiceAccount
    NamespacedRbac = 11,
    /// ConfigMap, Secret
    Config = 20,
    /// PersistentVolume, PersistentVolumeClaim, StorageClass
    Storage = 21,
    /// NetworkPolicy, Service, Endpoints, Ingress
    Network = 30,
    /// Deployment, StatefulSet, DaemonSet, ReplicaSet, Pod
    Workload = 40,
    /// Job, CronJob
    Batch = 50,
    /// HorizontalPodAutoscaler, VerticalPodAutoscaler, PodDisruptionBudget
    Autoscaling = 60,
    /// Instances of custom resources
    CustomResource = 70,
    Other = 100,
}

/// API groups served by Kubernetes itself
const CORE_GROUPS: &[&str] = &[
    "",
    "apps",
    "batch",
    "autoscaling",
    "policy",
    "networking.k8s.io",
    "rbac.authorization.k8s.io",
    "storage.k8s.io",
    "admissionregistration.k8s.io",
    "apiextensions.k8s.io",
    "certificates.k8s.io",
    "coordination.k8s.io",
    "discovery.k8s.io",
    "events.k8s.io",
    "flowcontrol.apiserver.k8s.io",
    "node.k8s.io",
    "scheduling.k8s.io",
];

impl ResourceCategory {
    /// Categorize a resource by its kind and apiVersion
    pub fn from_resource(kind: &str, api_version: &str) -> Self {
        match kind {
            "CustomResourceDefinition" => Self::Crd,
            "Namespace" => Self::Namespace,
            "ResourceQuota" | "LimitRange" => Self::NamespaceConfig,
            "ClusterRole" | "ClusterRoleBinding" => Self::ClusterRbac,
            "Role" | "RoleBinding" | "ServiceAccount" => Self::NamespacedRbac,
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "NetworkPolicy" | "Service" | "Endpoints" | "Ingress" | "IngressClass" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Pod" => Self::Workload,
            "Job" | "CronJob" => Self::Batch,
            "HorizontalPodAutoscaler" | "VerticalPodAutoscaler" | "PodDisruptionBudget" => {
                Self::Autoscaling
            }
            _ if Self::is_custom_api_version(api_version) => Self::CustomResource,
            _ => Self::Other,
        }
    }

    /// Whether an apiVersion belongs to a non-core API group
    pub fn is_custom_api_version(api_version: &str) -> bool {
        let group = match api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        };
        !CORE_GROUPS.contains(&group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            ResourceCategory::from_resource("Deployment", "apps/v1"),
            ResourceCategory::Workload
        );
        assert_eq!(
            ResourceCategory::from_resource("ConfigMap", "v1"),
            ResourceCategory::Config
        );
        assert_eq!(
            ResourceCategory::from_resource("Certificate", "cert-manager.io/v1"),
            ResourceCategory::CustomResource
        );
        assert_eq!(
            ResourceCategory::from_resource("Binding", "v1"),
            ResourceCategory::Other
        );
    }

    #[test]
    fn test_apply_order() {
        assert!(ResourceCategory::Crd < ResourceCategory::Namespace);
        assert!(ResourceCategory::Config < ResourceCategory::Workload);
        assert!(ResourceCategory::Workload < ResourceCategory::CustomResource);
    }

    #[test]
    fn test_custom_api_version() {
        assert!(!ResourceCategory::is_custom_api_version("v1"));
        assert!(!ResourceCategory::is_custom_api_version("apps/v1"));
        assert!(!ResourceCategory::is_custom_api_version("networking.k8s.io/v1"));
        assert!(ResourceCategory::is_custom_api_version("monitoring.coreos.com/v1"));
    }
}
