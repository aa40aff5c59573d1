//! Shared object plumbing: metadata, label maps, and the `Object` trait that
//! lets the generic informer/work-queue machinery key on any kind.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A label or annotation map. Kept as a `BTreeMap` (not `HashMap`) so
/// `Display` and serialization are deterministic, which matters for the
/// resolver's lexicographic tie-break and for stable test output.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(pub BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if every (key, value) pair in `self` is present in `other` with
    /// the same value. Used both for Override selector matching and Ignore
    /// label matching.
    pub fn is_subset_of(&self, other: &Labels) -> bool {
        self.0.iter().all(|(k, v)| other.0.get(k) == Some(v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{rendered}")
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Labels {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Labels(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Metadata common to every namespaced object the engine reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Opaque optimistic-concurrency token. `None` for objects not yet
    /// fetched from the cluster (e.g. freshly constructed test fixtures).
    #[serde(default)]
    pub resource_version: Option<String>,
}

impl Metadata {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Metadata {
            name: name.into(),
            namespace: namespace.into(),
            labels: Labels::new(),
            annotations: BTreeMap::new(),
            resource_version: None,
        }
    }
}

/// A reference to another namespaced object, used by `deploymentRef` /
/// `hpaRef` / `scaleTargetRef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub kind: String,
    pub name: String,
    /// Empty/absent means "same namespace as the referencing object".
    #[serde(default)]
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Whether this reference matches a namespaced object identified by
    /// `(candidate_namespace, name)`. An absent ref namespace resolves to
    /// `referencing_namespace` (the namespace of the object that holds this
    /// ref) rather than matching any namespace.
    pub fn matches(&self, referencing_namespace: &str, candidate_namespace: &str, name: &str) -> bool {
        let resolved_namespace = self.namespace.as_deref().unwrap_or(referencing_namespace);
        self.name == name && resolved_namespace == candidate_namespace
    }
}

/// Any object kind the engine manages or consults: Deployments, HPAs, and
/// the three policy kinds. Lets the informer/queue layer stay generic.
pub trait Object {
    fn kind(&self) -> &'static str;
    fn name(&self) -> &str;
    fn namespace(&self) -> &str;

    fn key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_subset_matching() {
        let want: Labels = [("app", "web")].into();
        let have: Labels = [("app", "web"), ("tier", "frontend")].into();
        assert!(want.is_subset_of(&have));

        let mismatched: Labels = [("app", "worker")].into();
        assert!(!mismatched.is_subset_of(&have));
    }

    #[test]
    fn object_ref_matches_empty_namespace_as_same_ns_as_referencer() {
        let r = ObjectRef {
            kind: "Deployment".to_string(),
            name: "web".to_string(),
            namespace: None,
        };
        assert!(r.matches("prod", "prod", "web"));
        assert!(!r.matches("prod", "staging", "web"));
        assert!(!r.matches("prod", "prod", "other"));
    }

    #[test]
    fn object_ref_matches_explicit_namespace_overrides_referencer() {
        let r = ObjectRef {
            kind: "Deployment".to_string(),
            name: "web".to_string(),
            namespace: Some("prod".to_string()),
        };
        assert!(r.matches("staging", "prod", "web"));
        assert!(!r.matches("staging", "staging", "web"));
    }
}
