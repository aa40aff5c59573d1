//! The external Deployment entity. This engine only ever reads
//! `spec.replicas`/`metadata.labels` and writes `spec.replicas` plus its own
//! annotations — grounded in `resources::objects::replica_set::ReplicaSet`,
//! generalized from ReplicaSet's pod-scaling shape to a full Deployment.

use serde::{Deserialize, Serialize};

use super::common::{Metadata, Object};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub metadata: Metadata,
    pub spec: DeploymentSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

fn default_replicas() -> i32 {
    1
}

impl Object for Deployment {
    fn kind(&self) -> &'static str {
        "Deployment"
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

impl Deployment {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, replicas: i32) -> Self {
        Deployment {
            metadata: Metadata::new(namespace, name),
            spec: DeploymentSpec { replicas },
        }
    }
}
