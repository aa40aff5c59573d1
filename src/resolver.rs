//! Composes a `GlobalConfig` with any matching `Override` into an effective
//! policy, picking deterministically among multiple matches.

use crate::objects::{Deployment, GlobalConfig, Object, Override, OverrideType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    DirectOverride,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub percentage: i32,
    pub min: i32,
    pub max: i32,
    pub mode: PolicyMode,
}

/// Select the matching Override (if any) for `deployment` and compose it
/// with `global` into an effective policy. Returns the selected Override's
/// index into `overrides` for status writeback, or `None` under the global
/// path.
pub fn resolve<'a>(
    deployment: &Deployment,
    global: &GlobalConfig,
    overrides: &'a [Override],
) -> (EffectivePolicy, Option<&'a Override>) {
    let mut candidates: Vec<&Override> = overrides
        .iter()
        .filter(|o| o.selects_deployment(deployment.namespace(), deployment.name(), &deployment.metadata.labels))
        .collect();

    // Deterministic tie-break: lexicographic (namespace, name).
    candidates.sort_by(|a, b| (a.namespace(), a.name()).cmp(&(b.namespace(), b.name())));

    match candidates.into_iter().next() {
        Some(selected) => (compose(global, selected), Some(selected)),
        None => (
            EffectivePolicy {
                percentage: global.global_percentage,
                min: global.min_replicas,
                max: global.max_replicas,
                mode: PolicyMode::Global,
            },
            None,
        ),
    }
}

/// Compose `global` with a single selected Override into an effective
/// policy. Shared by the Deployment-centric resolver above and by the
/// HPA-only Override path, which never goes through [`resolve`].
pub fn compose(global: &GlobalConfig, selected: &Override) -> EffectivePolicy {
    let percentage = compose_percentage(global, selected);
    let mut min = selected.spec.min_replicas.unwrap_or(global.min_replicas);
    let max = selected.spec.max_replicas.unwrap_or(global.max_replicas);
    if min > max {
        min = max;
    }
    EffectivePolicy {
        percentage,
        min,
        max,
        mode: PolicyMode::DirectOverride,
    }
}

fn compose_percentage(global: &GlobalConfig, selected: &Override) -> i32 {
    match selected.spec.override_type {
        OverrideType::Override => selected.spec.replicas_percentage,
        OverrideType::Additive => {
            (global.global_percentage + selected.spec.replicas_percentage - 100).max(0)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Metadata, ObjectRef, OverrideSpec};

    fn override_for(namespace: &str, name: &str, deployment_name: &str, percentage: i32, override_type: OverrideType) -> Override {
        Override {
            metadata: Metadata::new(namespace, name),
            spec: OverrideSpec {
                selector: None,
                deployment_ref: Some(ObjectRef {
                    kind: "Deployment".to_string(),
                    name: deployment_name.to_string(),
                    namespace: None,
                }),
                hpa_ref: None,
                override_type,
                replicas_percentage: percentage,
                min_replicas: None,
                max_replicas: None,
            },
            status: None,
        }
    }

    #[test]
    fn falls_back_to_global_with_no_matching_override() {
        let d = Deployment::new("prod", "web", 4);
        let global = GlobalConfig {
            global_percentage: 150,
            min_replicas: 1,
            max_replicas: 100,
        };
        let (policy, selected) = resolve(&d, &global, &[]);
        assert_eq!(policy.mode, PolicyMode::Global);
        assert_eq!(policy.percentage, 150);
        assert!(selected.is_none());
    }

    #[test]
    fn override_type_override_ignores_global_percentage() {
        let d = Deployment::new("prod", "web", 4);
        let global = GlobalConfig {
            global_percentage: 150,
            ..GlobalConfig::default()
        };
        let overrides = vec![override_for("prod", "o1", "web", 50, OverrideType::Override)];
        let (policy, _) = resolve(&d, &global, &overrides);
        assert_eq!(policy.percentage, 50);
        assert_eq!(policy.mode, PolicyMode::DirectOverride);
    }

    #[test]
    fn additive_composition_floors_at_zero() {
        let d = Deployment::new("prod", "web", 4);
        let global = GlobalConfig {
            global_percentage: 50,
            ..GlobalConfig::default()
        };
        let overrides = vec![override_for("prod", "o1", "web", 10, OverrideType::Additive)];
        // 50 + 10 - 100 = -40 -> floored at 0
        let (policy, _) = resolve(&d, &global, &overrides);
        assert_eq!(policy.percentage, 0);
    }

    #[test]
    fn multiple_matches_pick_lexicographically_first() {
        let d = Deployment::new("prod", "web", 4);
        let global = GlobalConfig::default();
        let overrides = vec![
            override_for("prod", "zzz", "web", 10, OverrideType::Override),
            override_for("prod", "aaa", "web", 90, OverrideType::Override),
        ];
        let (policy, selected) = resolve(&d, &global, &overrides);
        assert_eq!(policy.percentage, 90);
        assert_eq!(selected.unwrap().name(), "aaa");
    }

    #[test]
    fn resolution_is_deterministic_across_invocations() {
        let d = Deployment::new("prod", "web", 4);
        let global = GlobalConfig::default();
        let overrides = vec![
            override_for("prod", "zzz", "web", 10, OverrideType::Override),
            override_for("prod", "aaa", "web", 90, OverrideType::Override),
        ];
        let (first, _) = resolve(&d, &global, &overrides);
        let (second, _) = resolve(&d, &global, &overrides);
        assert_eq!(first, second);
    }

    #[test]
    fn inverted_bounds_clamp_min_to_max() {
        let d = Deployment::new("prod", "web", 4);
        let global = GlobalConfig::default();
        let mut o = override_for("prod", "o1", "web", 100, OverrideType::Override);
        o.spec.min_replicas = Some(10);
        o.spec.max_replicas = Some(5);
        let (policy, _) = resolve(&d, &global, &[o]);
        assert_eq!(policy.min, 5);
        assert_eq!(policy.max, 5);
    }
}
