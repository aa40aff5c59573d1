//! Orchestrates the eligibility filter, policy resolver, sizing calculator,
//! annotator, and the two drivers for every dequeued request, and owns the
//! cleanup (reversion) and status-writeback passes.
//!
//! Grounded in `podautoscaler::horizontal::PodAutoscaler::reconcile`'s
//! overall shape (fetch related objects, compute, write, log outcome) and
//! in `replica_set::controller`'s read-modify-write-with-retry status
//! update, generalized to this engine's several request kinds.

use std::sync::Arc;

use anyhow::Result;

use crate::annotator;
use crate::cluster::ClusterHandle;
use crate::eligibility;
use crate::error::ClusterError;
use crate::event_mapper::{self, ReconcileRequest};
use crate::objects::{AffectedDeployment, Deployment, HorizontalPodAutoscaler, IgnoredDeployment, Object, Override};
use crate::policy_store::PolicyStore;
use crate::resolver;
use crate::workload_driver::WorkloadDriver;

pub struct Reconciler {
    cluster: ClusterHandle,
    policy_store: Arc<PolicyStore>,
    workload_driver: WorkloadDriver,
    conflict_retry_limit: u32,
}

impl Reconciler {
    pub fn new(cluster: ClusterHandle, policy_store: Arc<PolicyStore>, conflict_retry_limit: u32) -> Self {
        Reconciler {
            cluster,
            policy_store,
            workload_driver: WorkloadDriver::new(conflict_retry_limit),
            conflict_retry_limit,
        }
    }

    pub async fn process(&self, request: &ReconcileRequest) -> Result<()> {
        match request {
            ReconcileRequest::Override { namespace, name } => self.reconcile_override(namespace, name).await,
            ReconcileRequest::Ignore { namespace, name } => self.reconcile_ignore(namespace, name).await,
            ReconcileRequest::GlobalConfigChanged => self.reconcile_global_config_changed().await,
            ReconcileRequest::GlobalPath { namespace, name } => self.reconcile_global_path(namespace, name).await,
        }
    }

    /// Policy-driven pass scoped to one Override.
    async fn reconcile_override(&self, namespace: &str, name: &str) -> Result<()> {
        let snapshot = self.policy_store.snapshot().await;
        let Some(override_obj) = snapshot.overrides.iter().find(|o| o.namespace() == namespace && o.name() == name)
        else {
            tracing::warn!(namespace, name, "override not found in policy store, skipping pass");
            return Ok(());
        };

        if override_obj.is_hpa_only() {
            return self.reconcile_hpa_only_override(override_obj).await;
        }

        let all_deployments = self.cluster.deployments.list().await?;
        let matched: Vec<&Deployment> = all_deployments
            .iter()
            .filter(|d| override_obj.selects_deployment(d.namespace(), d.name(), &d.metadata.labels))
            .collect();

        if let Some(status) = &override_obj.status {
            for previous in &status.affected_deployments {
                let still_matches = matched.iter().any(|d| d.namespace() == previous.namespace && d.name() == previous.name);
                if still_matches {
                    continue;
                }
                if let Err(e) = self.revert_workload(&previous.namespace, &previous.name).await {
                    tracing::error!(namespace = previous.namespace, name = previous.name, error = %e, "failed reverting previously-affected deployment");
                }
            }
        }

        let mut affected = Vec::new();
        for deployment in matched {
            if eligibility::evaluate(deployment, &snapshot.ignores).ignored {
                continue;
            }
            let (policy, _selected) = resolver::resolve(deployment, &snapshot.global, &snapshot.overrides);
            match self
                .workload_driver
                .drive(&*self.cluster.deployments, &*self.cluster.hpas, deployment.clone(), &policy)
                .await
            {
                Ok(_) => match self.affected_record(deployment.namespace(), deployment.name(), policy.percentage).await {
                    Ok(record) => affected.push(record),
                    Err(e) => tracing::error!(namespace = deployment.namespace(), name = deployment.name(), error = %e, "failed reading back driven deployment for status"),
                },
                Err(e) => {
                    tracing::error!(namespace = deployment.namespace(), name = deployment.name(), error = %e, "failed driving deployment under override");
                },
            }
        }

        self.write_override_status(override_obj.clone(), affected).await
    }

    /// HPA-only Overrides bypass the Deployment-centric resolver entirely
    /// and are driven directly against the named HPA.
    async fn reconcile_hpa_only_override(&self, override_obj: &Override) -> Result<()> {
        let Some(hpa_ref) = &override_obj.spec.hpa_ref else {
            return Ok(());
        };
        let namespace = hpa_ref.namespace.clone().unwrap_or_else(|| override_obj.namespace().to_string());
        let Some(hpa) = self.cluster.hpas.get(&namespace, &hpa_ref.name).await? else {
            tracing::warn!(namespace, name = hpa_ref.name, "hpa-only override target not found");
            return Ok(());
        };

        let snapshot = self.policy_store.snapshot().await;
        let policy = resolver::compose(&snapshot.global, override_obj);
        let driver = crate::hpa_driver::HpaDriver::new(self.conflict_retry_limit);
        driver.drive(&*self.cluster.hpas, hpa, &policy).await?;
        Ok(())
    }

    /// Policy-driven pass scoped to one Ignore: recomputes which
    /// Deployments this specific rule currently ignores and writes status.
    /// Ignore rules never drive sizing.
    async fn reconcile_ignore(&self, namespace: &str, name: &str) -> Result<()> {
        let snapshot = self.policy_store.snapshot().await;
        let Some(ignore_obj) = snapshot.ignores.iter().find(|i| i.namespace() == namespace && i.name() == name) else {
            tracing::warn!(namespace, name, "ignore not found in policy store, skipping pass");
            return Ok(());
        };

        let all_deployments = self.cluster.deployments.list().await?;
        let ignored: Vec<IgnoredDeployment> = all_deployments
            .iter()
            .filter(|d| eligibility::evaluate(d, std::slice::from_ref(ignore_obj)).ignored)
            .map(|d| IgnoredDeployment {
                name: d.name().to_string(),
                namespace: d.namespace().to_string(),
            })
            .collect();

        self.write_ignore_status(ignore_obj.clone(), ignored).await
    }

    /// GlobalConfig-document change: fan out to one global-path request per
    /// non-ignored Deployment.
    async fn reconcile_global_config_changed(&self) -> Result<()> {
        let snapshot = self.policy_store.snapshot().await;
        let all_deployments = self.cluster.deployments.list().await?;
        for request in event_mapper::map_global_config_change(&all_deployments, &snapshot) {
            if let ReconcileRequest::GlobalPath { namespace, name } = request {
                if let Err(e) = self.reconcile_global_path(&namespace, &name).await {
                    tracing::error!(namespace, name, error = %e, "failed global-path reconciliation fanned out from global config change");
                }
            }
        }
        Ok(())
    }

    /// Object-driven pass, global-config fallback: a Deployment or HPA
    /// changed and no Override selects it.
    async fn reconcile_global_path(&self, namespace: &str, name: &str) -> Result<()> {
        let snapshot = self.policy_store.snapshot().await;
        let Some(deployment) = self.cluster.deployments.get(namespace, name).await? else {
            return Ok(());
        };
        if eligibility::evaluate(&deployment, &snapshot.ignores).ignored {
            return Ok(());
        }

        let (policy, _selected) = resolver::resolve(&deployment, &snapshot.global, &snapshot.overrides);
        self.workload_driver
            .drive(&*self.cluster.deployments, &*self.cluster.hpas, deployment, &policy)
            .await?;
        Ok(())
    }

    /// Invoked directly from the bootstrap's Override-delete handler,
    /// bypassing `ReconcileRequest::Override` entirely: once an Override is
    /// removed from the policy store its prior `status.affected_deployments`
    /// is no longer available there, only in the watch event's old payload.
    pub async fn revert_override(&self, old: &Override) {
        let Some(status) = &old.status else { return };
        for affected in &status.affected_deployments {
            if let Err(e) = self.revert_workload(&affected.namespace, &affected.name).await {
                tracing::error!(
                    namespace = affected.namespace,
                    name = affected.name,
                    error = %e,
                    "failed reverting deployment after override deletion"
                );
            }
        }
    }

    async fn revert_workload(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        if let Some(mut deployment) = self.cluster.deployments.get(namespace, name).await? {
            annotator::revert_deployment(&mut deployment);
            self.update_deployment_with_retry(deployment).await?;
        }
        if let Some(mut hpa) = self.cluster.hpas.find_target_of(namespace, name).await? {
            annotator::revert_hpa(&mut hpa);
            self.update_hpa_with_retry(hpa).await?;
        }
        Ok(())
    }

    async fn update_deployment_with_retry(&self, mut deployment: Deployment) -> Result<(), ClusterError> {
        for attempt in 0..=self.conflict_retry_limit {
            match self.cluster.deployments.update(&deployment).await {
                Ok(_) => return Ok(()),
                Err(ClusterError::Conflict) if attempt < self.conflict_retry_limit => {
                    deployment = self
                        .cluster
                        .deployments
                        .get(deployment.namespace(), deployment.name())
                        .await?
                        .ok_or(ClusterError::NotFound)?;
                },
                Err(ClusterError::NotFound) => return Ok(()),
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    async fn update_hpa_with_retry(&self, mut hpa: HorizontalPodAutoscaler) -> Result<(), ClusterError> {
        for attempt in 0..=self.conflict_retry_limit {
            match self.cluster.hpas.update(&hpa).await {
                Ok(_) => return Ok(()),
                Err(ClusterError::Conflict) if attempt < self.conflict_retry_limit => {
                    hpa = self.cluster.hpas.get(hpa.namespace(), hpa.name()).await?.ok_or(ClusterError::NotFound)?;
                },
                Err(ClusterError::NotFound) => return Ok(()),
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    async fn affected_record(&self, namespace: &str, name: &str, percentage: i32) -> Result<AffectedDeployment, ClusterError> {
        let deployment = self.cluster.deployments.get(namespace, name).await?.ok_or(ClusterError::NotFound)?;
        let original = annotator::original_replicas(&deployment).unwrap_or(deployment.spec.replicas);
        Ok(AffectedDeployment {
            name: name.to_string(),
            namespace: namespace.to_string(),
            original_replicas: original,
            current_replicas: deployment.spec.replicas,
            current_percentage: percentage,
        })
    }

    /// Read-modify-write Override status with conflict retry.
    async fn write_override_status(&self, mut override_obj: Override, affected: Vec<AffectedDeployment>) -> Result<()> {
        for attempt in 0..=self.conflict_retry_limit {
            override_obj.status = Some(crate::objects::OverrideStatus {
                affected_deployments: affected.clone(),
                last_update_time: Some(chrono::Utc::now()),
            });
            match self.cluster.policies.update_override_status(&override_obj).await {
                Ok(_) => return Ok(()),
                Err(ClusterError::Conflict) if attempt < self.conflict_retry_limit => {
                    let refreshed = self
                        .cluster
                        .policies
                        .list_overrides()
                        .await?
                        .into_iter()
                        .find(|o| o.key() == override_obj.key());
                    let Some(refreshed) = refreshed else { return Ok(()) };
                    override_obj = refreshed;
                },
                Err(ClusterError::NotFound) => return Ok(()),
                Err(other) => return Err(other.into()),
            }
        }
        Ok(())
    }

    async fn write_ignore_status(&self, mut ignore_obj: crate::objects::Ignore, ignored: Vec<IgnoredDeployment>) -> Result<()> {
        for attempt in 0..=self.conflict_retry_limit {
            ignore_obj.status = Some(crate::objects::IgnoreStatus {
                ignored_deployments: ignored.clone(),
                last_update_time: Some(chrono::Utc::now()),
            });
            match self.cluster.policies.update_ignore_status(&ignore_obj).await {
                Ok(_) => return Ok(()),
                Err(ClusterError::Conflict) if attempt < self.conflict_retry_limit => {
                    let refreshed = self
                        .cluster
                        .policies
                        .list_ignores()
                        .await?
                        .into_iter()
                        .find(|i| i.key() == ignore_obj.key());
                    let Some(refreshed) = refreshed else { return Ok(()) };
                    ignore_obj = refreshed;
                },
                Err(ClusterError::NotFound) => return Ok(()),
                Err(other) => return Err(other.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use crate::cluster::DeploymentApi as _;
    use crate::objects::{GlobalConfig, Ignore, IgnoreSpec, Metadata, ObjectRef, OverrideSpec, OverrideType};

    fn handle(cluster: Arc<FakeCluster>) -> ClusterHandle {
        ClusterHandle {
            deployments: Box::new(FakeClusterRef(cluster.clone())),
            hpas: Box::new(FakeClusterRef(cluster.clone())),
            policies: Box::new(FakeClusterRef(cluster.clone())),
            namespaces: Box::new(FakeClusterRef(cluster)),
        }
    }

    /// Adapts a shared `Arc<FakeCluster>` to the four capability traits so
    /// the same backing store can be handed to `ClusterHandle`'s four boxed
    /// slots without cloning the whole fake (its collections are already
    /// internally shared via `DashMap`).
    struct FakeClusterRef(Arc<FakeCluster>);

    #[async_trait::async_trait]
    impl crate::cluster::DeploymentApi for FakeClusterRef {
        async fn get(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, ClusterError> {
            crate::cluster::DeploymentApi::get(&*self.0, namespace, name).await
        }
        async fn list(&self) -> Result<Vec<Deployment>, ClusterError> {
            crate::cluster::DeploymentApi::list(&*self.0).await
        }
        async fn update(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
            crate::cluster::DeploymentApi::update(&*self.0, deployment).await
        }
    }

    #[async_trait::async_trait]
    impl crate::cluster::HpaApi for FakeClusterRef {
        async fn get(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>, ClusterError> {
            crate::cluster::HpaApi::get(&*self.0, namespace, name).await
        }
        async fn list(&self) -> Result<Vec<HorizontalPodAutoscaler>, ClusterError> {
            crate::cluster::HpaApi::list(&*self.0).await
        }
        async fn update(&self, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ClusterError> {
            crate::cluster::HpaApi::update(&*self.0, hpa).await
        }
    }

    #[async_trait::async_trait]
    impl crate::cluster::PolicyApi for FakeClusterRef {
        async fn get_global_config(&self, namespace: &str, name: &str) -> anyhow::Result<GlobalConfig> {
            crate::cluster::PolicyApi::get_global_config(&*self.0, namespace, name).await
        }
        async fn list_overrides(&self) -> Result<Vec<Override>, ClusterError> {
            crate::cluster::PolicyApi::list_overrides(&*self.0).await
        }
        async fn list_ignores(&self) -> Result<Vec<Ignore>, ClusterError> {
            crate::cluster::PolicyApi::list_ignores(&*self.0).await
        }
        async fn update_override_status(&self, o: &Override) -> Result<Override, ClusterError> {
            crate::cluster::PolicyApi::update_override_status(&*self.0, o).await
        }
        async fn update_ignore_status(&self, i: &Ignore) -> Result<Ignore, ClusterError> {
            crate::cluster::PolicyApi::update_ignore_status(&*self.0, i).await
        }
    }

    #[async_trait::async_trait]
    impl crate::cluster::NamespaceApi for FakeClusterRef {
        async fn exists(&self, namespace: &str) -> Result<bool, ClusterError> {
            crate::cluster::NamespaceApi::exists(&*self.0, namespace).await
        }
    }

    fn override_for(name: &str, deployment_name: &str, percentage: i32) -> Override {
        Override {
            metadata: Metadata::new("prod", name),
            spec: OverrideSpec {
                selector: None,
                deployment_ref: Some(ObjectRef {
                    kind: "Deployment".to_string(),
                    name: deployment_name.to_string(),
                    namespace: None,
                }),
                hpa_ref: None,
                override_type: OverrideType::Override,
                replicas_percentage: percentage,
                min_replicas: None,
                max_replicas: None,
            },
            status: None,
        }
    }

    #[tokio::test]
    async fn override_drives_deployment_and_writes_status() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_deployment(Deployment::new("prod", "web", 4));
        cluster.insert_override(override_for("o1", "web", 50));

        let policy_store = Arc::new(PolicyStore::new());
        policy_store
            .publish_global(GlobalConfig {
                global_percentage: 150,
                ..GlobalConfig::default()
            })
            .await;
        policy_store.upsert_override(override_for("o1", "web", 50)).await;

        let reconciler = Reconciler::new(handle(cluster.clone()), policy_store, 3);
        reconciler.reconcile_override("prod", "o1").await.unwrap();

        let persisted = cluster.get("prod", "web").await.unwrap().unwrap();
        assert_eq!(persisted.spec.replicas, 2);
        assert_eq!(
            persisted.metadata.annotations.get(crate::annotations::OVERRIDE_CONTROLLER).map(String::as_str),
            Some("true")
        );

        let status_override = cluster.overrides.get("prod/o1").unwrap();
        let status = status_override.status.as_ref().unwrap();
        assert_eq!(status.affected_deployments.len(), 1);
        assert_eq!(status.affected_deployments[0].current_replicas, 2);
    }

    #[tokio::test]
    async fn override_deletion_reverts_previously_affected() {
        let cluster = Arc::new(FakeCluster::new());
        let mut d = Deployment::new("prod", "web", 4);
        crate::annotator::mark_deployment_managed(&mut d, crate::annotations::ManagedBy::Override, crate::annotations::ManagementMode::Direct, None);
        d.spec.replicas = 2;
        cluster.insert_deployment(d);

        let mut o = override_for("o1", "web", 50);
        o.status = Some(crate::objects::OverrideStatus {
            affected_deployments: vec![AffectedDeployment {
                name: "web".to_string(),
                namespace: "prod".to_string(),
                original_replicas: 4,
                current_replicas: 2,
                current_percentage: 50,
            }],
            last_update_time: None,
        });
        cluster.insert_override(o.clone());

        // Override removed from the snapshot (simulating deletion), but an
        // empty replacement Override with the matching key is kept in the
        // snapshot so the pass still runs: the cluster fake doesn't model
        // watch-driven deletion, so the test exercises the reversion path
        // directly via an Override that no longer selects the Deployment.
        let policy_store = Arc::new(PolicyStore::new());
        let mut non_matching = o.clone();
        non_matching.spec.deployment_ref = Some(ObjectRef {
            kind: "Deployment".to_string(),
            name: "someone-else".to_string(),
            namespace: None,
        });
        policy_store.upsert_override(non_matching).await;

        let reconciler = Reconciler::new(handle(cluster.clone()), policy_store, 3);
        reconciler.reconcile_override("prod", "o1").await.unwrap();

        let reverted = cluster.get("prod", "web").await.unwrap().unwrap();
        assert_eq!(reverted.spec.replicas, 4);
        assert!(reverted.metadata.annotations.is_empty());
    }

    #[tokio::test]
    async fn ignore_rule_status_lists_ignored_deployment_without_driving_it() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_deployment(Deployment::new("prod", "web", 4));

        let mut spec = IgnoreSpec::default();
        spec.ignore_namespaces.insert("prod".to_string());
        let ignore_obj = Ignore {
            metadata: Metadata::new("kubedynamicscaler-system", "rules"),
            spec,
            status: None,
        };
        cluster.insert_ignore(ignore_obj.clone());

        let policy_store = Arc::new(PolicyStore::new());
        policy_store.upsert_ignore(ignore_obj).await;

        let reconciler = Reconciler::new(handle(cluster.clone()), policy_store, 3);
        reconciler.reconcile_ignore("kubedynamicscaler-system", "rules").await.unwrap();

        let persisted_deployment = cluster.get("prod", "web").await.unwrap().unwrap();
        assert_eq!(persisted_deployment.spec.replicas, 4);
        assert!(persisted_deployment.metadata.annotations.is_empty());

        let status_ignore = cluster.ignores.get("kubedynamicscaler-system/rules").unwrap();
        let status = status_ignore.status.as_ref().unwrap();
        assert_eq!(status.ignored_deployments.len(), 1);
        assert_eq!(status.ignored_deployments[0].name, "web");
    }

    #[tokio::test]
    async fn global_path_drives_deployment_with_no_override() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_deployment(Deployment::new("prod", "web", 4));

        let policy_store = Arc::new(PolicyStore::new());
        policy_store
            .publish_global(GlobalConfig {
                global_percentage: 150,
                ..GlobalConfig::default()
            })
            .await;

        let reconciler = Reconciler::new(handle(cluster.clone()), policy_store, 3);
        reconciler.reconcile_global_path("prod", "web").await.unwrap();

        let persisted = cluster.get("prod", "web").await.unwrap().unwrap();
        assert_eq!(persisted.spec.replicas, 6);
        assert_eq!(
            persisted.metadata.annotations.get(crate::annotations::GLOBAL_CONFIG_MANAGED).map(String::as_str),
            Some("true")
        );
    }
}
