//! The Eligibility Filter: decides whether any `Ignore` rule exempts a
//! Deployment from management, and why.

use crate::objects::{Deployment, Ignore, IgnoredKind, Object};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub ignored: bool,
    pub reason: Option<&'static str>,
}

impl Eligibility {
    fn eligible() -> Self {
        Eligibility {
            ignored: false,
            reason: None,
        }
    }

    fn ignored(reason: &'static str) -> Self {
        Eligibility {
            ignored: true,
            reason: Some(reason),
        }
    }
}

/// Evaluate the ordered, short-circuiting Ignore match rules: namespace,
/// then named resource, then label, in that order. The first match wins.
pub fn evaluate(deployment: &Deployment, ignores: &[Ignore]) -> Eligibility {
    let namespace = deployment.namespace();
    let name = deployment.name();

    if ignores
        .iter()
        .any(|ignore| ignore.spec.ignore_namespaces.contains(namespace))
    {
        return Eligibility::ignored("Namespace is in ignore list");
    }

    if ignores.iter().any(|ignore| {
        ignore.spec.ignore_resources.iter().any(|entry| {
            entry.kind == IgnoredKind::Deployment
                && entry.name == name
                && entry.namespace.as_deref().map_or(true, |ns| ns == namespace)
        })
    }) {
        return Eligibility::ignored("Deployment is in ignore list");
    }

    if ignores.iter().any(|ignore| {
        ignore
            .spec
            .ignore_labels
            .iter()
            .any(|(k, v)| deployment.metadata.labels.get(k) == Some(v.as_str()))
    }) {
        return Eligibility::ignored("Deployment has ignored label");
    }

    Eligibility::eligible()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{IgnoreResource, IgnoreSpec, Metadata};

    fn ignore_with(spec: IgnoreSpec) -> Ignore {
        Ignore {
            metadata: Metadata::new("kubedynamicscaler-system", "rules"),
            spec,
            status: None,
        }
    }

    #[test]
    fn namespace_rule_short_circuits_first() {
        let mut spec = IgnoreSpec::default();
        spec.ignore_namespaces.insert("prod".to_string());
        spec.ignore_labels.insert("team".to_string(), "anything".to_string());
        let ignores = vec![ignore_with(spec)];

        let mut d = Deployment::new("prod", "web", 4);
        d.metadata.labels = [("team", "anything")].into();

        let result = evaluate(&d, &ignores);
        assert!(result.ignored);
        assert_eq!(result.reason, Some("Namespace is in ignore list"));
    }

    #[test]
    fn resource_rule_matches_same_or_empty_namespace() {
        let spec = IgnoreSpec {
            ignore_resources: vec![IgnoreResource {
                kind: IgnoredKind::Deployment,
                name: "web".to_string(),
                namespace: None,
            }],
            ..Default::default()
        };
        let ignores = vec![ignore_with(spec)];
        let d = Deployment::new("prod", "web", 4);
        assert!(evaluate(&d, &ignores).ignored);
    }

    #[test]
    fn resource_rule_does_not_match_other_namespace_when_pinned() {
        let spec = IgnoreSpec {
            ignore_resources: vec![IgnoreResource {
                kind: IgnoredKind::Deployment,
                name: "web".to_string(),
                namespace: Some("staging".to_string()),
            }],
            ..Default::default()
        };
        let ignores = vec![ignore_with(spec)];
        let d = Deployment::new("prod", "web", 4);
        assert!(!evaluate(&d, &ignores).ignored);
    }

    #[test]
    fn label_rule_requires_exact_value_match() {
        let mut spec = IgnoreSpec::default();
        spec.ignore_labels.insert("tier".to_string(), "batch".to_string());
        let ignores = vec![ignore_with(spec)];

        let mut d = Deployment::new("prod", "web", 4);
        d.metadata.labels = [("tier", "online")].into();
        assert!(!evaluate(&d, &ignores).ignored);

        d.metadata.labels = [("tier", "batch")].into();
        let result = evaluate(&d, &ignores);
        assert!(result.ignored);
        assert_eq!(result.reason, Some("Deployment has ignored label"));
    }

    #[test]
    fn no_matching_rule_is_eligible() {
        let ignores = vec![ignore_with(IgnoreSpec::default())];
        let d = Deployment::new("prod", "web", 4);
        assert!(!evaluate(&d, &ignores).ignored);
    }
}
