//! The cluster-wide `GlobalConfig` document.
//!
//! Unlike Override/Ignore this is not a CRD the engine watches through the
//! generic informer — it is a single YAML document (`config.yaml`) inside a
//! named configuration object, loaded the way the teacher loads
//! `ClusterConfig` in `resources::config` (`config` crate, `serde_yaml`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalConfig {
    pub global_percentage: i32,
    pub min_replicas: i32,
    pub max_replicas: i32,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            global_percentage: 100,
            min_replicas: 1,
            max_replicas: 100,
        }
    }
}

impl GlobalConfig {
    /// Parse the `config.yaml` payload of the configuration document.
    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let parsed: GlobalConfig = serde_yaml::from_str(raw)?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_no_op() {
        let cfg = GlobalConfig::default();
        assert_eq!(cfg.global_percentage, 100);
        assert_eq!(cfg.min_replicas, 1);
        assert_eq!(cfg.max_replicas, 100);
    }

    #[test]
    fn parses_partial_document_with_defaults() {
        let cfg = GlobalConfig::from_yaml("globalPercentage: 150\n").unwrap();
        assert_eq!(cfg.global_percentage, 150);
        assert_eq!(cfg.min_replicas, 1);
        assert_eq!(cfg.max_replicas, 100);
    }

    #[test]
    fn rejects_unparseable_yaml() {
        assert!(GlobalConfig::from_yaml("not: [valid\n").is_err());
    }
}
