//! The cluster as an external collaborator.
//!
//! The engine never talks to a real Kubernetes API server directly; it talks
//! to these traits, which name exactly the verbs the engine is allowed to
//! use. Two implementations exist, one per capability set, so cluster
//! behavior can be swapped out wholesale between production and tests:
//!
//! - [`http`]: a reqwest + websocket client grounded in
//!   `controllers::podautoscaler::utils` (`create_lister_watcher`,
//!   `get_scale_target`, `post_update`) and `resources::controller`'s
//!   reflector/informer pattern.
//! - [`fake`]: an in-memory, `DashMap`-backed double used by every test in
//!   this crate.

pub mod fake;
pub mod http;
pub mod informer;

use async_trait::async_trait;

use crate::error::ClusterError;
use crate::objects::{Deployment, GlobalConfig, HorizontalPodAutoscaler, Ignore, Override};

#[async_trait]
pub trait DeploymentApi: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, ClusterError>;
    async fn list(&self) -> Result<Vec<Deployment>, ClusterError>;
    /// Conditional on `metadata.resource_version`; returns
    /// `ClusterError::Conflict` if the object changed since it was read.
    async fn update(&self, deployment: &Deployment) -> Result<Deployment, ClusterError>;
}

#[async_trait]
pub trait HpaApi: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>, ClusterError>;
    async fn list(&self) -> Result<Vec<HorizontalPodAutoscaler>, ClusterError>;
    async fn update(&self, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ClusterError>;

    /// Find the (at most one) HPA whose `scaleTargetRef` points at the given
    /// Deployment.
    async fn find_target_of(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<HorizontalPodAutoscaler>, ClusterError> {
        let hpas = self.list().await?;
        Ok(hpas.into_iter().find(|hpa| hpa.targets(namespace, name)))
    }
}

#[async_trait]
pub trait PolicyApi: Send + Sync {
    /// Fetch and parse the `config.yaml` key of the named configuration
    /// document. A failure here is a policy-load error: the caller keeps
    /// the previous snapshot and only logs.
    async fn get_global_config(&self, namespace: &str, name: &str) -> anyhow::Result<GlobalConfig>;

    async fn list_overrides(&self) -> Result<Vec<Override>, ClusterError>;
    async fn list_ignores(&self) -> Result<Vec<Ignore>, ClusterError>;

    async fn update_override_status(&self, override_obj: &Override) -> Result<Override, ClusterError>;
    async fn update_ignore_status(&self, ignore: &Ignore) -> Result<Ignore, ClusterError>;
}

#[async_trait]
pub trait NamespaceApi: Send + Sync {
    async fn exists(&self, namespace: &str) -> Result<bool, ClusterError>;
}

/// Everything the engine needs from the cluster, bundled for convenient
/// injection into the Reconciler.
pub struct ClusterHandle {
    pub deployments: Box<dyn DeploymentApi>,
    pub hpas: Box<dyn HpaApi>,
    pub policies: Box<dyn PolicyApi>,
    pub namespaces: Box<dyn NamespaceApi>,
}
