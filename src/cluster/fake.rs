//! In-memory cluster double used by every test in this crate. Grounded in
//! the teacher's `dashmap::DashMap` store usage throughout `resources`/
//! `controllers`.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ClusterError;
use crate::objects::{Deployment, GlobalConfig, HorizontalPodAutoscaler, Ignore, Object, Override};

use super::{DeploymentApi, NamespaceApi, PolicyApi};
// `HpaApi` is deliberately not imported here: it shares method names
// (`get`/`list`/`update`) with `DeploymentApi`, both implemented below for
// `FakeCluster`. Importing both would make every `.get()`/`.update()` call
// on a `FakeCluster` ambiguous wherever this module's items are re-exported
// with `use super::*` (the test module). The impl below spells out
// `super::HpaApi` instead of relying on an import.

/// Bumps `resource_version` on every write and rejects an update whose
/// incoming `resource_version` doesn't match, simulating the cluster's
/// optimistic concurrency.
fn next_version(current: &Option<String>) -> String {
    let n: u64 = current.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
    (n + 1).to_string()
}

pub struct FakeCluster {
    pub deployments: DashMap<String, Deployment>,
    pub hpas: DashMap<String, HorizontalPodAutoscaler>,
    pub overrides: DashMap<String, Override>,
    pub ignores: DashMap<String, Ignore>,
    pub namespaces: DashMap<String, ()>,
    pub global_config: parking_lot::Mutex<GlobalConfig>,
}

impl FakeCluster {
    pub fn new() -> Self {
        FakeCluster {
            deployments: DashMap::new(),
            hpas: DashMap::new(),
            overrides: DashMap::new(),
            ignores: DashMap::new(),
            namespaces: DashMap::new(),
            global_config: parking_lot::Mutex::new(GlobalConfig::default()),
        }
    }

    pub fn insert_deployment(&self, mut d: Deployment) {
        d.metadata.resource_version = Some("1".to_string());
        self.namespaces.insert(d.namespace().to_string(), ());
        self.deployments.insert(d.key(), d);
    }

    pub fn insert_hpa(&self, mut h: HorizontalPodAutoscaler) {
        h.metadata.resource_version = Some("1".to_string());
        self.namespaces.insert(h.namespace().to_string(), ());
        self.hpas.insert(h.key(), h);
    }

    pub fn insert_override(&self, mut o: Override) {
        o.metadata.resource_version = Some("1".to_string());
        self.overrides.insert(o.key(), o);
    }

    pub fn insert_ignore(&self, mut i: Ignore) {
        i.metadata.resource_version = Some("1".to_string());
        self.ignores.insert(i.key(), i);
    }

    pub fn set_global_config(&self, config: GlobalConfig) {
        *self.global_config.lock() = config;
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeploymentApi for FakeCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, ClusterError> {
        Ok(self.deployments.get(&format!("{namespace}/{name}")).map(|d| d.clone()))
    }

    async fn list(&self) -> Result<Vec<Deployment>, ClusterError> {
        Ok(self.deployments.iter().map(|e| e.value().clone()).collect())
    }

    async fn update(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        let key = deployment.key();
        let mut entry = self.deployments.get_mut(&key).ok_or(ClusterError::NotFound)?;
        if entry.metadata.resource_version != deployment.metadata.resource_version {
            return Err(ClusterError::Conflict);
        }
        let mut updated = deployment.clone();
        updated.metadata.resource_version = Some(next_version(&entry.metadata.resource_version));
        *entry = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl super::HpaApi for FakeCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>, ClusterError> {
        Ok(self.hpas.get(&format!("{namespace}/{name}")).map(|h| h.clone()))
    }

    async fn list(&self) -> Result<Vec<HorizontalPodAutoscaler>, ClusterError> {
        Ok(self.hpas.iter().map(|e| e.value().clone()).collect())
    }

    async fn update(&self, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ClusterError> {
        let key = hpa.key();
        let mut entry = self.hpas.get_mut(&key).ok_or(ClusterError::NotFound)?;
        if entry.metadata.resource_version != hpa.metadata.resource_version {
            return Err(ClusterError::Conflict);
        }
        let mut updated = hpa.clone();
        updated.metadata.resource_version = Some(next_version(&entry.metadata.resource_version));
        *entry = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl PolicyApi for FakeCluster {
    async fn get_global_config(&self, _namespace: &str, _name: &str) -> anyhow::Result<GlobalConfig> {
        Ok(*self.global_config.lock())
    }

    async fn list_overrides(&self) -> Result<Vec<Override>, ClusterError> {
        Ok(self.overrides.iter().map(|e| e.value().clone()).collect())
    }

    async fn list_ignores(&self) -> Result<Vec<Ignore>, ClusterError> {
        Ok(self.ignores.iter().map(|e| e.value().clone()).collect())
    }

    async fn update_override_status(&self, override_obj: &Override) -> Result<Override, ClusterError> {
        let key = override_obj.key();
        let mut entry = self.overrides.get_mut(&key).ok_or(ClusterError::NotFound)?;
        let mut updated = override_obj.clone();
        updated.metadata.resource_version = Some(next_version(&entry.metadata.resource_version));
        *entry = updated.clone();
        Ok(updated)
    }

    async fn update_ignore_status(&self, ignore: &Ignore) -> Result<Ignore, ClusterError> {
        let key = ignore.key();
        let mut entry = self.ignores.get_mut(&key).ok_or(ClusterError::NotFound)?;
        let mut updated = ignore.clone();
        updated.metadata.resource_version = Some(next_version(&entry.metadata.resource_version));
        *entry = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl NamespaceApi for FakeCluster {
    async fn exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        Ok(self.namespaces.contains_key(namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Metadata;

    #[tokio::test]
    async fn update_conflicts_on_stale_resource_version() {
        let cluster = FakeCluster::new();
        cluster.insert_deployment(Deployment::new("prod", "web", 4));

        let mut stale = cluster.get("prod", "web").await.unwrap().unwrap();
        stale.metadata.resource_version = Some("0".to_string());
        let err = cluster.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn update_succeeds_with_matching_version_and_bumps_it() {
        let cluster = FakeCluster::new();
        cluster.insert_deployment(Deployment::new("prod", "web", 4));

        let mut current = cluster.get("prod", "web").await.unwrap().unwrap();
        current.spec.replicas = 6;
        let updated = cluster.update(&current).await.unwrap();
        assert_eq!(updated.spec.replicas, 6);
        assert_ne!(updated.metadata.resource_version, Some("1".to_string()));
    }

    #[tokio::test]
    async fn namespace_api_reflects_inserted_workloads() {
        let cluster = FakeCluster::new();
        cluster.insert_deployment(Deployment::new("prod", "web", 4));
        assert!(cluster.exists("prod").await.unwrap());
        assert!(!cluster.exists("staging").await.unwrap());
    }

    #[tokio::test]
    async fn update_of_missing_object_is_not_found() {
        let cluster = FakeCluster::new();
        let ghost = Deployment::new("prod", "ghost", 1);
        assert!(cluster.update(&ghost).await.unwrap_err().is_not_found());
    }

    #[test]
    fn metadata_helper_is_usable_standalone() {
        let m = Metadata::new("prod", "web");
        assert_eq!(m.namespace, "prod");
    }
}
