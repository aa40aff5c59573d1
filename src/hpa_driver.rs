//! The HPA Driver: applies an effective policy to an HPA's min/max bounds.
//!
//! Grounded in the same `post_update`-then-conflict-retry shape the teacher
//! uses in `podautoscaler::horizontal::PodAutoscaler::reconcile`, narrowed
//! to the two fields this engine is allowed to touch.

use crate::annotator;
use crate::cluster::HpaApi;
use crate::error::ClusterError;
use crate::objects::{HorizontalPodAutoscaler, Object};
use crate::resolver::EffectivePolicy;
use crate::sizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Skipped,
    Updated { min: i32, max: i32 },
}

pub struct HpaDriver {
    conflict_retry_limit: u32,
}

impl HpaDriver {
    pub fn new(conflict_retry_limit: u32) -> Self {
        HpaDriver { conflict_retry_limit }
    }

    /// Drive `hpa` toward `policy`'s bounds, retrying on conflict up to the
    /// configured bound — the same retry rule the Workload Driver uses.
    pub async fn drive(
        &self,
        hpas: &dyn HpaApi,
        mut hpa: HorizontalPodAutoscaler,
        policy: &EffectivePolicy,
    ) -> Result<DriveOutcome, ClusterError> {
        for attempt in 0..=self.conflict_retry_limit {
            let original = hpa.clone();

            annotator::mark_hpa_managed(&mut hpa);
            let (original_min, original_max) =
                annotator::hpa_original_bounds(&hpa).unwrap_or((hpa.spec.min_replicas, hpa.spec.max_replicas));
            let (new_min, new_max) = sizing::calculate_hpa_bounds(original_min, original_max, policy.percentage);

            if hpa.spec.min_replicas == new_min && hpa.spec.max_replicas == new_max && hpa == original {
                return Ok(DriveOutcome::Skipped);
            }

            hpa.spec.min_replicas = new_min;
            hpa.spec.max_replicas = new_max;
            annotator::stamp_hpa_update(&mut hpa);

            match hpas.update(&hpa).await {
                Ok(_) => return Ok(DriveOutcome::Updated { min: new_min, max: new_max }),
                Err(ClusterError::Conflict) if attempt < self.conflict_retry_limit => {
                    hpa = hpas
                        .get(original.namespace(), original.name())
                        .await?
                        .ok_or(ClusterError::NotFound)?;
                    tracing::warn!(namespace = hpa.namespace(), name = hpa.name(), attempt, "hpa update conflict, retrying");
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
    use crate::objects::{Metadata, ObjectRef};
    use crate::resolver::PolicyMode;

    fn hpa(min: i32, max: i32) -> HorizontalPodAutoscaler {
        HorizontalPodAutoscaler {
            metadata: Metadata::new("prod", "web-hpa"),
            spec: crate::objects::HorizontalPodAutoscalerSpec {
                min_replicas: min,
                max_replicas: max,
                scale_target_ref: ObjectRef {
                    kind: "Deployment".to_string(),
                    name: "web".to_string(),
                    namespace: None,
                },
            },
        }
    }

    #[tokio::test]
    async fn scales_hpa_bounds_and_stamps_annotations() {
        let cluster = FakeCluster::new();
        cluster.insert_hpa(hpa(2, 10));
        let fetched = cluster.get("prod", "web-hpa").await.unwrap().unwrap();

        let driver = HpaDriver::new(3);
        let policy = EffectivePolicy {
            percentage: 150,
            min: 1,
            max: 100,
            mode: PolicyMode::Global,
        };
        let outcome = driver.drive(&cluster, fetched, &policy).await.unwrap();
        assert_eq!(outcome, DriveOutcome::Updated { min: 3, max: 15 });

        let persisted = cluster.get("prod", "web-hpa").await.unwrap().unwrap();
        assert_eq!(persisted.spec.min_replicas, 3);
        assert_eq!(persisted.spec.max_replicas, 15);
        assert!(annotator::hpa_original_bounds(&persisted).is_some());
        assert_eq!(annotator::hpa_original_bounds(&persisted), Some((2, 10)));
    }

    #[tokio::test]
    async fn skips_write_when_bounds_and_annotations_already_match() {
        let cluster = FakeCluster::new();
        let mut seeded = hpa(3, 15);
        annotator::mark_hpa_managed(&mut seeded);
        seeded.metadata.annotations.insert(
            crate::annotations::HPA_ORIGINAL_MIN.to_string(),
            "2".to_string(),
        );
        seeded
            .metadata
            .annotations
            .insert(crate::annotations::HPA_ORIGINAL_MAX.to_string(), "10".to_string());
        cluster.insert_hpa(seeded);
        let fetched = cluster.get("prod", "web-hpa").await.unwrap().unwrap();
        let before_version = fetched.metadata.resource_version.clone();

        let driver = HpaDriver::new(3);
        let policy = EffectivePolicy {
            percentage: 150,
            min: 1,
            max: 100,
            mode: PolicyMode::Global,
        };
        let outcome = driver.drive(&cluster, fetched, &policy).await.unwrap();
        assert_eq!(outcome, DriveOutcome::Skipped);

        let persisted = cluster.get("prod", "web-hpa").await.unwrap().unwrap();
        assert_eq!(persisted.metadata.resource_version, before_version);
    }
}
