//! The Event Mapper: translates object-change notifications into
//! reconciliation requests.
//!
//! Grounded in the teacher's own event-to-work-queue translation in
//! `podautoscaler::horizontal::PodAutoscaler` (`EventHandler` callbacks
//! pushing a key onto `rx`), generalized from "push a name" to "compute the
//! set of policy-scoped requests a single change fans out to".

use crate::cluster::DeploymentApi;
use crate::eligibility;
use crate::error::ClusterError;
use crate::objects::{Deployment, HorizontalPodAutoscaler, Object};
use crate::policy_store::Snapshot;

/// What the Reconciler dequeues and acts on. A global-config fallback
/// triggered by a Deployment change is modeled as its own variant,
/// [`ReconcileRequest::GlobalPath`], keyed by the Deployment itself, rather
/// than overloading `Override`'s key with a request that has no Override.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReconcileRequest {
    /// Policy-driven pass scoped to one Override.
    Override { namespace: String, name: String },
    /// Policy-driven pass scoped to one Ignore (reversion/eligibility only;
    /// Ignore objects don't drive sizing, but their change still requires a
    /// pass to revert newly-ignored workloads and refresh their status).
    Ignore { namespace: String, name: String },
    /// GlobalConfig document changed: every non-ignored Deployment is
    /// re-evaluated under the global path.
    GlobalConfigChanged,
    /// A Deployment or HPA changed and no Override selects it: fall back to
    /// the global-config path for this one Deployment.
    GlobalPath { namespace: String, name: String },
}

/// Translate a Deployment change into zero or more requests. Ignored
/// Deployments yield no requests.
pub fn map_deployment_change(deployment: &Deployment, snapshot: &Snapshot) -> Vec<ReconcileRequest> {
    if eligibility::evaluate(deployment, &snapshot.ignores).ignored {
        return Vec::new();
    }

    let matching: Vec<_> = snapshot
        .overrides
        .iter()
        .filter(|o| o.selects_deployment(deployment.namespace(), deployment.name(), &deployment.metadata.labels))
        .collect();

    if matching.is_empty() {
        vec![ReconcileRequest::GlobalPath {
            namespace: deployment.namespace().to_string(),
            name: deployment.name().to_string(),
        }]
    } else {
        matching
            .into_iter()
            .map(|o| ReconcileRequest::Override {
                namespace: o.namespace().to_string(),
                name: o.name().to_string(),
            })
            .collect()
    }
}

/// Translate an HPA change: resolve its target Deployment first, then apply
/// the Deployment rule. An HPA whose target can't be resolved (deleted, or
/// not a Deployment) yields no requests.
pub async fn map_hpa_change(
    hpa: &HorizontalPodAutoscaler,
    deployments: &dyn DeploymentApi,
    snapshot: &Snapshot,
) -> Result<Vec<ReconcileRequest>, ClusterError> {
    let target = &hpa.spec.scale_target_ref;
    if target.kind != "Deployment" {
        return Ok(Vec::new());
    }
    let target_namespace = target.namespace.clone().unwrap_or_else(|| hpa.namespace().to_string());
    match deployments.get(&target_namespace, &target.name).await? {
        Some(deployment) => Ok(map_deployment_change(&deployment, snapshot)),
        None => Ok(Vec::new()),
    }
}

/// Translate a GlobalConfig-document change: one request per non-ignored
/// Deployment in the cluster.
pub fn map_global_config_change(all_deployments: &[Deployment], snapshot: &Snapshot) -> Vec<ReconcileRequest> {
    all_deployments
        .iter()
        .filter(|d| !eligibility::evaluate(d, &snapshot.ignores).ignored)
        .map(|d| ReconcileRequest::GlobalPath {
            namespace: d.namespace().to_string(),
            name: d.name().to_string(),
        })
        .collect()
}
