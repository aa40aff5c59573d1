//! The Annotator: reads and writes the management annotation set on
//! Deployments and HPAs. Captures original sizes exactly once, stamps update
//! timestamps, and reverts objects back to their pre-management state.

use crate::annotations::{
    self, ManagedBy, ManagementMode, GLOBAL_CONFIG_MANAGED, HPA_MANAGED, HPA_ORIGINAL_MAX,
    HPA_ORIGINAL_MIN, LAST_HPA_UPDATE, LAST_UPDATE, MANAGED, MANAGEMENT_MODE, ORIGINAL_REPLICAS,
    OVERRIDE_CONTROLLER, TRUE,
};
use crate::objects::{Deployment, HorizontalPodAutoscaler};

/// Capture the Deployment's original replica count into `original-replicas`
/// the first time it is seen. This capture never happens twice: once an
/// original is recorded it is preserved across every later management mode
/// change until the Deployment is reverted.
///
/// If `hpa_original_min` is `Some`, the Deployment is already selected by an
/// HPA at capture time, so the captured original comes from the HPA's
/// `spec.minReplicas` rather than the Deployment's own `spec.replicas`.
pub fn mark_deployment_managed(
    deployment: &mut Deployment,
    managed_by: ManagedBy,
    mode: ManagementMode,
    hpa_original_min: Option<i32>,
) {
    let annotations = &mut deployment.metadata.annotations;
    if !annotations.contains_key(ORIGINAL_REPLICAS) {
        let original = hpa_original_min.unwrap_or(deployment.spec.replicas);
        annotations.insert(ORIGINAL_REPLICAS.to_string(), original.to_string());
    }
    annotations.insert(MANAGED.to_string(), TRUE.to_string());
    annotations.insert(MANAGEMENT_MODE.to_string(), mode.to_string());
    managed_by.stamp(annotations);
}

pub fn stamp_deployment_update(deployment: &mut Deployment) {
    deployment
        .metadata
        .annotations
        .insert(LAST_UPDATE.to_string(), annotations::now_rfc3339());
}

/// Revert a Deployment to its annotated original replica count and remove
/// every management annotation. No-op if the annotations are absent.
pub fn revert_deployment(deployment: &mut Deployment) {
    let annotations = &mut deployment.metadata.annotations;
    let Some(original) = annotations.get(ORIGINAL_REPLICAS).cloned() else {
        return;
    };
    if let Ok(original) = original.parse::<i32>() {
        deployment.spec.replicas = original;
    }
    for key in [
        ORIGINAL_REPLICAS,
        OVERRIDE_CONTROLLER,
        GLOBAL_CONFIG_MANAGED,
        MANAGED,
        MANAGEMENT_MODE,
        LAST_UPDATE,
    ] {
        annotations.remove(key);
    }
}

/// Capture the HPA's original min/max on first management.
pub fn mark_hpa_managed(hpa: &mut HorizontalPodAutoscaler) {
    let annotations = &mut hpa.metadata.annotations;
    if !annotations.contains_key(HPA_ORIGINAL_MIN) {
        annotations.insert(HPA_ORIGINAL_MIN.to_string(), hpa.spec.min_replicas.to_string());
        annotations.insert(HPA_ORIGINAL_MAX.to_string(), hpa.spec.max_replicas.to_string());
    }
    annotations.insert(HPA_MANAGED.to_string(), TRUE.to_string());
}

pub fn stamp_hpa_update(hpa: &mut HorizontalPodAutoscaler) {
    hpa.metadata
        .annotations
        .insert(LAST_HPA_UPDATE.to_string(), annotations::now_rfc3339());
}

/// Revert an HPA to its annotated original min/max and remove every
/// management annotation. No-op if the annotations are absent.
pub fn revert_hpa(hpa: &mut HorizontalPodAutoscaler) {
    let annotations = &mut hpa.metadata.annotations;
    let (Some(min), Some(max)) = (
        annotations.get(HPA_ORIGINAL_MIN).cloned(),
        annotations.get(HPA_ORIGINAL_MAX).cloned(),
    ) else {
        return;
    };
    if let (Ok(min), Ok(max)) = (min.parse::<i32>(), max.parse::<i32>()) {
        hpa.spec.min_replicas = min;
        hpa.spec.max_replicas = max;
    }
    for key in [HPA_ORIGINAL_MIN, HPA_ORIGINAL_MAX, HPA_MANAGED, LAST_HPA_UPDATE] {
        annotations.remove(key);
    }
}

/// Read back the captured original replica count, if any (used by the HPA
/// precedence capture path and by tests).
pub fn original_replicas(deployment: &Deployment) -> Option<i32> {
    deployment
        .metadata
        .annotations
        .get(ORIGINAL_REPLICAS)
        .and_then(|v| v.parse().ok())
}

/// Read back the captured original (min, max) bounds, if any.
pub fn hpa_original_bounds(hpa: &HorizontalPodAutoscaler) -> Option<(i32, i32)> {
    let annotations = &hpa.metadata.annotations;
    let min = annotations.get(HPA_ORIGINAL_MIN)?.parse().ok()?;
    let max = annotations.get(HPA_ORIGINAL_MAX)?.parse().ok()?;
    Some((min, max))
}
