//! Real cluster client: reqwest against the configured API server endpoints.
//!
//! Grounded in `controllers::podautoscaler::utils` (`create_lister_watcher`,
//! `get_scale_target`, `post_update`) and `resources::models::Response<T>` —
//! the teacher's JSON envelope convention (`{"msg": ..., "data": ...}`) is
//! reused verbatim since the cluster API surface this engine talks to is
//! assumed to keep that shape.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use tokio_tungstenite::connect_async;

use crate::cluster::informer::{ListerWatcher, WatchStream};
use crate::error::ClusterError;
use crate::objects::{Deployment, GlobalConfig, HorizontalPodAutoscaler, Ignore, Object, Override};

use super::{DeploymentApi, HpaApi, NamespaceApi, PolicyApi};

#[derive(Debug, serde::Deserialize)]
struct Response<T> {
    #[allow(dead_code)]
    msg: Option<String>,
    data: Option<T>,
}

/// Build a [`ListerWatcher`] against this client's api-server endpoints for
/// the given resource path, grounded in
/// `controllers::podautoscaler::utils::create_lister_watcher`.
pub fn create_lister_watcher<T>(api_server_url: &str, api_server_watch_url: &str, path: &str) -> ListerWatcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let list_url = format!("{api_server_url}/api/v1/{path}");
    let watch_url = format!("{api_server_watch_url}/api/v1/watch/{path}");
    ListerWatcher {
        lister: Box::new(move |_| {
            let list_url = list_url.clone();
            Box::pin(async move {
                let response = reqwest::get(list_url).await?.json::<Response<Vec<T>>>().await?;
                response.data.ok_or_else(|| anyhow!("lister returned no data"))
            }) as BoxFuture<'static, Result<Vec<T>>>
        }),
        watcher: Box::new(move |_| {
            let watch_url = watch_url.clone();
            Box::pin(async move {
                let url = reqwest::Url::parse(&watch_url)?;
                let (stream, _) = connect_async(url).await?;
                Ok::<WatchStream, anyhow::Error>(Box::new(stream))
            }) as BoxFuture<'static, Result<WatchStream>>
        }),
    }
}

/// Cheap to clone: `reqwest::Client` is itself an `Arc` handle to a shared
/// connection pool. `ClusterHandle`'s four trait-object slots each get their
/// own clone of the same underlying client.
#[derive(Clone)]
pub struct HttpClusterClient {
    api_server_url: String,
    http: reqwest::Client,
}

impl HttpClusterClient {
    pub fn new(api_server_url: impl Into<String>) -> Self {
        HttpClusterClient {
            api_server_url: api_server_url.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ClusterError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_server_url, path))
            .send()
            .await
            .map_err(|e| ClusterError::Transient(e.into()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: Response<T> = response
            .json()
            .await
            .map_err(|e| ClusterError::Transient(e.into()))?;
        Ok(envelope.data)
    }

    async fn list_json<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ClusterError> {
        let envelope: Response<Vec<T>> = self
            .http
            .get(format!("{}{}", self.api_server_url, path))
            .send()
            .await
            .map_err(|e| ClusterError::Transient(e.into()))?
            .json()
            .await
            .map_err(|e| ClusterError::Transient(e.into()))?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// PUT with If-Match on the object's resource version, for optimistic
    /// concurrency against the cluster. A `409 Conflict` response maps to
    /// `ClusterError::Conflict` so the Reconciler can retry.
    async fn put_json<T: Serialize + DeserializeOwned>(&self, path: &str, body: &T) -> Result<T, ClusterError> {
        let response = self
            .http
            .put(format!("{}{}", self.api_server_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| ClusterError::Transient(e.into()))?;

        match response.status() {
            reqwest::StatusCode::CONFLICT => Err(ClusterError::Conflict),
            reqwest::StatusCode::NOT_FOUND => Err(ClusterError::NotFound),
            _ => {
                let envelope: Response<T> = response
                    .json()
                    .await
                    .map_err(|e| ClusterError::Transient(e.into()))?;
                envelope.data.ok_or(ClusterError::NotFound)
            },
        }
    }
}

#[async_trait]
impl DeploymentApi for HttpClusterClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, ClusterError> {
        self.get_json(&format!("/api/v1/namespaces/{namespace}/deployments/{name}"))
            .await
    }

    async fn list(&self) -> Result<Vec<Deployment>, ClusterError> {
        self.list_json("/api/v1/deployments").await
    }

    async fn update(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        self.put_json(
            &format!("/api/v1/namespaces/{}/deployments/{}", deployment.namespace(), deployment.name()),
            deployment,
        )
        .await
    }
}

#[async_trait]
impl HpaApi for HttpClusterClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>, ClusterError> {
        self.get_json(&format!(
            "/api/v1/namespaces/{namespace}/horizontalpodautoscalers/{name}"
        ))
        .await
    }

    async fn list(&self) -> Result<Vec<HorizontalPodAutoscaler>, ClusterError> {
        self.list_json("/api/v1/horizontalpodautoscalers").await
    }

    async fn update(&self, hpa: &HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscaler, ClusterError> {
        self.put_json(
            &format!(
                "/api/v1/namespaces/{}/horizontalpodautoscalers/{}",
                hpa.namespace(),
                hpa.name()
            ),
            hpa,
        )
        .await
    }
}

#[async_trait]
impl PolicyApi for HttpClusterClient {
    async fn get_global_config(&self, namespace: &str, name: &str) -> Result<GlobalConfig> {
        let document: Option<serde_json::Value> = self
            .get_json(&format!("/api/v1/namespaces/{namespace}/configmaps/{name}"))
            .await
            .map_err(|e| anyhow!("fetching configuration document: {e}"))?;
        let document = document.with_context(|| format!("configuration document {namespace}/{name} not found"))?;
        let raw = document
            .get("data")
            .and_then(|d| d.get("config.yaml"))
            .and_then(|v| v.as_str())
            .with_context(|| "configuration document missing config.yaml key")?;
        GlobalConfig::from_yaml(raw)
    }

    async fn list_overrides(&self) -> Result<Vec<Override>, ClusterError> {
        self.list_json("/api/v1/overrides").await
    }

    async fn list_ignores(&self) -> Result<Vec<Ignore>, ClusterError> {
        self.list_json("/api/v1/ignores").await
    }

    async fn update_override_status(&self, override_obj: &Override) -> Result<Override, ClusterError> {
        self.put_json(
            &format!(
                "/api/v1/namespaces/{}/overrides/{}/status",
                override_obj.namespace(),
                override_obj.name()
            ),
            override_obj,
        )
        .await
    }

    async fn update_ignore_status(&self, ignore: &Ignore) -> Result<Ignore, ClusterError> {
        self.put_json(
            &format!("/api/v1/namespaces/{}/ignores/{}/status", ignore.namespace(), ignore.name()),
            ignore,
        )
        .await
    }
}

#[async_trait]
impl NamespaceApi for HttpClusterClient {
    async fn exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        Ok(self
            .get_json::<serde_json::Value>(&format!("/api/v1/namespaces/{namespace}"))
            .await?
            .is_some())
    }
}
