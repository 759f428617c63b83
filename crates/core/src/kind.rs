//! Tracked resource kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A class of cluster objects mirrored by kview.
///
/// The set is fixed at build time; which members are actually tracked is chosen
/// once at startup from configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Namespace,
    Ingress,
    Service,
    Secret,
    StatefulSet,
    Deployment,
    Pod,
    ConfigMap,
    ReplicaSet,
    Endpoints,
    Node,
    StorageClass,
    PersistentVolumeClaim,
    Event,
    HorizontalPodAutoscaler,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 15] = [
        ResourceKind::Namespace,
        ResourceKind::Ingress,
        ResourceKind::Service,
        ResourceKind::Secret,
        ResourceKind::StatefulSet,
        ResourceKind::Deployment,
        ResourceKind::Pod,
        ResourceKind::ConfigMap,
        ResourceKind::ReplicaSet,
        ResourceKind::Endpoints,
        ResourceKind::Node,
        ResourceKind::StorageClass,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::Event,
        ResourceKind::HorizontalPodAutoscaler,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::Ingress => "ingress",
            ResourceKind::Service => "service",
            ResourceKind::Secret => "secret",
            ResourceKind::StatefulSet => "statefulset",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Pod => "pod",
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::ReplicaSet => "replicaset",
            ResourceKind::Endpoints => "endpoints",
            ResourceKind::Node => "node",
            ResourceKind::StorageClass => "storageclass",
            ResourceKind::PersistentVolumeClaim => "persistentvolumeclaim",
            ResourceKind::Event => "event",
            ResourceKind::HorizontalPodAutoscaler => "horizontalpodautoscaler",
        }
    }

    /// Cluster-scoped kinds live under the empty namespace.
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Namespace | ResourceKind::Node | ResourceKind::StorageClass)
    }

    /// The event kind keeps only the latest message per target object.
    pub fn is_projection(&self) -> bool { matches!(self, ResourceKind::Event) }

    /// Parse a comma separated list such as `pod,svc,deploy`. Empty items are skipped.
    pub fn parse_list(s: &str) -> Result<Vec<ResourceKind>, ParseKindError> {
        let mut out = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let kind = part.parse::<ResourceKind>()?;
            if !out.contains(&kind) { out.push(kind); }
        }
        Ok(out)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource kind: {0}")]
pub struct ParseKindError(pub String);

impl FromStr for ResourceKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "namespace" | "namespaces" | "ns" => ResourceKind::Namespace,
            "ingress" | "ingresses" | "ing" => ResourceKind::Ingress,
            "service" | "services" | "svc" => ResourceKind::Service,
            "secret" | "secrets" => ResourceKind::Secret,
            "statefulset" | "statefulsets" | "sts" => ResourceKind::StatefulSet,
            "deployment" | "deployments" | "deploy" => ResourceKind::Deployment,
            "pod" | "pods" | "po" => ResourceKind::Pod,
            "configmap" | "configmaps" | "cm" => ResourceKind::ConfigMap,
            "replicaset" | "replicasets" | "rs" => ResourceKind::ReplicaSet,
            "endpoints" | "endpoint" | "ep" => ResourceKind::Endpoints,
            "node" | "nodes" | "no" => ResourceKind::Node,
            "storageclass" | "storageclasses" | "sc" => ResourceKind::StorageClass,
            "persistentvolumeclaim" | "persistentvolumeclaims" | "pvc" => ResourceKind::PersistentVolumeClaim,
            "event" | "events" | "ev" => ResourceKind::Event,
            "horizontalpodautoscaler" | "horizontalpodautoscalers" | "hpa" => ResourceKind::HorizontalPodAutoscaler,
            _ => return Err(ParseKindError(s.to_string())),
        };
        Ok(kind)
    }
}
