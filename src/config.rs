//! Process bootstrap configuration, distinct from the cluster-held
//! `GlobalConfig` document. Grounded in `resources::config::ClusterConfig`:
//! a `config`-crate layered load (file, optional, then environment),
//! deserialized with `serde`.

use anyhow::Context;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_NAMESPACE: &str = "kubedynamicscaler-system";
const DEFAULT_CONFIG_NAME: &str = "replicas-controller-config";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub api_server_url: String,
    pub api_server_watch_url: String,
    pub config_namespace: String,
    pub config_name: String,
    pub sync_period_secs: u64,
    pub conflict_retry_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            api_server_url: "http://localhost:8080".to_string(),
            api_server_watch_url: "ws://localhost:8080".to_string(),
            config_namespace: DEFAULT_CONFIG_NAMESPACE.to_string(),
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            sync_period_secs: 300,
            conflict_retry_limit: 3,
        }
    }
}

impl EngineConfig {
    /// Load from an optional YAML file layered under environment variables,
    /// then apply the `CONFIG_NAMESPACE` environment override by name.
    pub fn load(file_path: &str) -> anyhow::Result<Self> {
        let mut cfg: EngineConfig = Config::builder()
            .add_source(File::with_name(file_path).required(false))
            .add_source(Environment::default())
            .build()
            .with_context(|| "failed to assemble configuration sources")?
            .try_deserialize()
            .with_context(|| "failed to parse engine configuration")?;

        if let Ok(namespace) = std::env::var("CONFIG_NAMESPACE") {
            cfg.config_namespace = namespace;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.config_namespace, "kubedynamicscaler-system");
        assert_eq!(cfg.config_name, "replicas-controller-config");
        assert_eq!(cfg.sync_period_secs, 300);
        assert_eq!(cfg.conflict_retry_limit, 3);
    }
}
