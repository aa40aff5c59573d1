//! The external HorizontalPodAutoscaler entity. Grounded in
//! `resources::objects::hpa::HorizontalPodAutoscaler`, trimmed down to the
//! fields this engine actually reads/writes (`spec.minReplicas`,
//! `spec.maxReplicas`, `spec.scaleTargetRef`) — the metric/behavior
//! configuration belongs to the HPA runtime, a separate out-of-scope
//! collaborator this engine never talks to.

use serde::{Deserialize, Serialize};

use super::common::{Metadata, Object, ObjectRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscaler {
    pub metadata: Metadata,
    pub spec: HorizontalPodAutoscalerSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscalerSpec {
    #[serde(default = "default_min_replicas")]
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub scale_target_ref: ObjectRef,
}

fn default_min_replicas() -> i32 {
    1
}

impl Object for HorizontalPodAutoscaler {
    fn kind(&self) -> &'static str {
        "HorizontalPodAutoscaler"
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

impl HorizontalPodAutoscaler {
    /// Whether this HPA's `scaleTargetRef` points at the given Deployment.
    /// An absent `scaleTargetRef.namespace` means "same namespace as this
    /// HPA", not "any namespace".
    pub fn targets(&self, namespace: &str, name: &str) -> bool {
        self.spec.scale_target_ref.kind == "Deployment"
            && self.spec.scale_target_ref.matches(self.namespace(), namespace, name)
    }
}
