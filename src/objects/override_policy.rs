//! The `Override` policy kind: a per-workload replacement or refinement of
//! the global sizing policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{Labels, Metadata, Object, ObjectRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    pub metadata: Metadata,
    pub spec: OverrideSpec,
    #[serde(default)]
    pub status: Option<OverrideStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideType {
    Override,
    Additive,
}

impl Default for OverrideType {
    fn default() -> Self {
        OverrideType::Override
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSpec {
    #[serde(default)]
    pub selector: Option<Labels>,
    #[serde(default)]
    pub deployment_ref: Option<ObjectRef>,
    #[serde(default)]
    pub hpa_ref: Option<ObjectRef>,
    #[serde(default)]
    pub override_type: OverrideType,
    #[serde(default = "default_replicas_percentage")]
    pub replicas_percentage: i32,
    #[serde(default)]
    pub min_replicas: Option<i32>,
    #[serde(default)]
    pub max_replicas: Option<i32>,
}

fn default_replicas_percentage() -> i32 {
    100
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideStatus {
    #[serde(default)]
    pub affected_deployments: Vec<AffectedDeployment>,
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedDeployment {
    pub name: String,
    pub namespace: String,
    pub original_replicas: i32,
    pub current_replicas: i32,
    pub current_percentage: i32,
}

impl Object for Override {
    fn kind(&self) -> &'static str {
        "Override"
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

impl Override {
    /// Overrides that carry only an `hpaRef` are resolved through the HPA
    /// Driver path directly, not through the Deployment-centric resolver.
    pub fn is_hpa_only(&self) -> bool {
        self.spec.hpa_ref.is_some()
            && self.spec.deployment_ref.is_none()
            && self.spec.selector.as_ref().map_or(true, Labels::is_empty)
    }

    /// Whether this Override selects the given Deployment via direct
    /// reference or label selector.
    pub fn selects_deployment(&self, namespace: &str, name: &str, labels: &Labels) -> bool {
        if self.is_hpa_only() {
            return false;
        }
        if let Some(deployment_ref) = &self.spec.deployment_ref {
            if deployment_ref.matches(self.namespace(), namespace, name) {
                return true;
            }
        }
        if let Some(selector) = &self.spec.selector {
            if !selector.is_empty() && selector.is_subset_of(labels) {
                return true;
            }
        }
        false
    }
}
