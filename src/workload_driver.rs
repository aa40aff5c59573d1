//! The Workload Driver: applies an effective policy to a Deployment,
//! delegating to the HPA Driver when an HPA already targets it (HPA
//! precedence: an HPA-driven Deployment is never sized directly).

use crate::annotations::ManagedBy;
use crate::annotator;
use crate::cluster::{DeploymentApi, HpaApi};
use crate::error::ClusterError;
use crate::hpa_driver::{self, HpaDriver};
use crate::objects::{Deployment, Object};
use crate::resolver::{EffectivePolicy, PolicyMode};
use crate::sizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Skipped,
    Direct { target: i32 },
    DelegatedToHpa(hpa_driver::DriveOutcome),
}

pub struct WorkloadDriver {
    conflict_retry_limit: u32,
    hpa_driver: HpaDriver,
}

impl WorkloadDriver {
    pub fn new(conflict_retry_limit: u32) -> Self {
        WorkloadDriver {
            conflict_retry_limit,
            hpa_driver: HpaDriver::new(conflict_retry_limit),
        }
    }

    /// Drive `deployment` toward `policy`, retrying annotation/replica writes
    /// on conflict up to the configured bound.
    pub async fn drive(
        &self,
        deployments: &dyn DeploymentApi,
        hpas: &dyn HpaApi,
        mut deployment: Deployment,
        policy: &EffectivePolicy,
    ) -> Result<DriveOutcome, ClusterError> {
        let managed_by = match policy.mode {
            PolicyMode::DirectOverride => ManagedBy::Override,
            PolicyMode::Global => ManagedBy::Global,
        };

        if let Some(hpa) = hpas.find_target_of(deployment.namespace(), deployment.name()).await? {
            let hpa_outcome = self.hpa_driver.drive(hpas, hpa.clone(), policy).await?;
            self.mark_and_persist_deployment(
                deployments,
                deployment,
                managed_by,
                crate::annotations::ManagementMode::Hpa,
                Some(hpa.spec.min_replicas),
            )
            .await?;
            return Ok(DriveOutcome::DelegatedToHpa(hpa_outcome));
        }

        for attempt in 0..=self.conflict_retry_limit {
            let original = deployment.clone();
            annotator::mark_deployment_managed(&mut deployment, managed_by, crate::annotations::ManagementMode::Direct, None);
            let original_replicas = annotator::original_replicas(&deployment).unwrap_or(deployment.spec.replicas);
            let target = sizing::calculate_target(original_replicas, policy.percentage, policy.min, policy.max);

            if deployment.spec.replicas == target && deployment == original {
                return Ok(DriveOutcome::Skipped);
            }

            deployment.spec.replicas = target;
            annotator::stamp_deployment_update(&mut deployment);

            match deployments.update(&deployment).await {
                Ok(_) => return Ok(DriveOutcome::Direct { target }),
                Err(ClusterError::Conflict) if attempt < self.conflict_retry_limit => {
                    deployment = deployments
                        .get(original.namespace(), original.name())
                        .await?
                        .ok_or(ClusterError::NotFound)?;
                    tracing::warn!(
                        namespace = deployment.namespace(),
                        name = deployment.name(),
                        attempt,
                        "deployment update conflict, retrying"
                    );
                },
                Err(other) => return Err(other),
            }
        }
        unreachable!("loop always returns within conflict_retry_limit + 1 attempts")
    }

    /// HPA-precedence path still owes the Deployment its management
    /// annotations even though `spec.replicas` is left untouched. Bounded
    /// conflict-retry mirrors the direct path.
    async fn mark_and_persist_deployment(
        &self,
        deployments: &dyn DeploymentApi,
        mut deployment: Deployment,
        managed_by: ManagedBy,
        mode: crate::annotations::ManagementMode,
        hpa_original_min: Option<i32>,
    ) -> Result<bool, ClusterError> {
        for attempt in 0..=self.conflict_retry_limit {
            let original = deployment.clone();
            annotator::mark_deployment_managed(&mut deployment, managed_by, mode, hpa_original_min);
            if deployment == original {
                return Ok(false);
            }
            match deployments.update(&deployment).await {
                Ok(_) => return Ok(true),
                Err(ClusterError::Conflict) if attempt < self.conflict_retry_limit => {
                    deployment = deployments
                        .get(original.namespace(), original.name())
                        .await?
                        .ok_or(ClusterError::NotFound)?;
                    tracing::warn!(
                        namespace = deployment.namespace(),
                        name = deployment.name(),
                        attempt,
                        "deployment annotation update conflict, retrying"
                    );
                },
                Err(other) => return Err(other),
            }
        }
        unreachable!("loop always returns within conflict_retry_limit + 1 attempts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use crate::objects::{HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, Metadata, ObjectRef};

    #[tokio::test]
    async fn direct_scaling_writes_target_and_captures_original() {
        let cluster = FakeCluster::new();
        cluster.insert_deployment(Deployment::new("prod", "web", 4));
        let fetched = DeploymentApi::get(&cluster, "prod", "web").await.unwrap().unwrap();

        let driver = WorkloadDriver::new(3);
        let policy = EffectivePolicy {
            percentage: 150,
            min: 1,
            max: 100,
            mode: PolicyMode::Global,
        };
        let outcome = driver.drive(&cluster, &cluster, fetched, &policy).await.unwrap();
        assert_eq!(outcome, DriveOutcome::Direct { target: 6 });

        let persisted = DeploymentApi::get(&cluster, "prod", "web").await.unwrap().unwrap();
        assert_eq!(persisted.spec.replicas, 6);
        assert_eq!(annotator::original_replicas(&persisted), Some(4));
    }

    #[tokio::test]
    async fn skips_write_when_already_at_target_with_annotations_set() {
        let cluster = FakeCluster::new();
        let mut seeded = Deployment::new("prod", "web", 6);
        annotator::mark_deployment_managed(&mut seeded, ManagedBy::Global, crate::annotations::ManagementMode::Direct, None);
        cluster.insert_deployment(seeded);
        let fetched = DeploymentApi::get(&cluster, "prod", "web").await.unwrap().unwrap();
        let before_version = fetched.metadata.resource_version.clone();

        let driver = WorkloadDriver::new(3);
        let policy = EffectivePolicy {
            percentage: 150,
            min: 1,
            max: 100,
            mode: PolicyMode::Global,
        };
        let outcome = driver.drive(&cluster, &cluster, fetched, &policy).await.unwrap();
        assert_eq!(outcome, DriveOutcome::Skipped);

        let persisted = DeploymentApi::get(&cluster, "prod", "web").await.unwrap().unwrap();
        assert_eq!(persisted.metadata.resource_version, before_version);
    }

    #[tokio::test]
    async fn hpa_precedence_leaves_deployment_replicas_untouched() {
        let cluster = FakeCluster::new();
        cluster.insert_deployment(Deployment::new("prod", "web", 4));
        cluster.insert_hpa(HorizontalPodAutoscaler {
            metadata: Metadata::new("prod", "web-hpa"),
            spec: HorizontalPodAutoscalerSpec {
                min_replicas: 2,
                max_replicas: 10,
                scale_target_ref: ObjectRef {
                    kind: "Deployment".to_string(),
                    name: "web".to_string(),
                    namespace: None,
                },
            },
        });
        let fetched = DeploymentApi::get(&cluster, "prod", "web").await.unwrap().unwrap();

        let driver = WorkloadDriver::new(3);
        let policy = EffectivePolicy {
            percentage: 150,
            min: 1,
            max: 100,
            mode: PolicyMode::Global,
        };
        let outcome = driver.drive(&cluster, &cluster, fetched, &policy).await.unwrap();
        assert!(matches!(outcome, DriveOutcome::DelegatedToHpa(_)));

        let persisted_deployment = DeploymentApi::get(&cluster, "prod", "web").await.unwrap().unwrap();
        assert_eq!(persisted_deployment.spec.replicas, 4);
        assert_eq!(
            persisted_deployment
                .metadata
                .annotations
                .get(crate::annotations::MANAGEMENT_MODE)
                .map(String::as_str),
            Some("hpa")
        );
        assert_eq!(annotator::original_replicas(&persisted_deployment), Some(2));

        let persisted_hpa = HpaApi::get(&cluster, "prod", "web-hpa").await.unwrap().unwrap();
        assert_eq!(persisted_hpa.spec.min_replicas, 3);
        assert_eq!(persisted_hpa.spec.max_replicas, 15);
    }
}
