//! The `Ignore` policy kind: exempts matching Deployments from management.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{Metadata, Object};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ignore {
    pub metadata: Metadata,
    pub spec: IgnoreSpec,
    #[serde(default)]
    pub status: Option<IgnoreStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreSpec {
    #[serde(default)]
    pub ignore_namespaces: BTreeSet<String>,
    #[serde(default)]
    pub ignore_resources: Vec<IgnoreResource>,
    #[serde(default)]
    pub ignore_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum IgnoredKind {
    Deployment,
    StatefulSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreResource {
    pub kind: IgnoredKind,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreStatus {
    #[serde(default)]
    pub ignored_deployments: Vec<IgnoredDeployment>,
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoredDeployment {
    pub name: String,
    pub namespace: String,
}

impl Object for Ignore {
    fn kind(&self) -> &'static str {
        "Ignore"
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}
