//! Process bootstrap: wires the HTTP cluster client, the Policy Store, four
//! object informers, the Event Mapper, the work queue and the Reconciler
//! into the running control loop.
//!
//! Grounded in `controllers::podautoscaler::horizontal::PodAutoscaler::run`'s
//! `select!` over an object-change channel and a `DelayQueue` receiver,
//! generalized from one object kind to four, plus a periodic poll for the
//! `GlobalConfig` document (which, unlike Override/Ignore, isn't a watchable
//! object in its own right).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kubedynamicscaler::cluster::http::{self, HttpClusterClient};
use kubedynamicscaler::cluster::informer::{Event, Informer};
use kubedynamicscaler::cluster::{ClusterHandle, DeploymentApi, PolicyApi};
use kubedynamicscaler::config::EngineConfig;
use kubedynamicscaler::event_mapper::{self, ReconcileRequest};
use kubedynamicscaler::objects::{Deployment, HorizontalPodAutoscaler, Ignore, Object, Override};
use kubedynamicscaler::policy_store::PolicyStore;
use kubedynamicscaler::queue::WorkQueue;
use kubedynamicscaler::reconciler::Reconciler;

const CONFIG_FILE: &str = "/etc/kubedynamicscaler/engine.yaml";

/// Everything the four informers forward onto the single channel the main
/// loop selects on.
enum ObjectChange {
    Deployment(Event<Deployment>),
    Hpa(Event<HorizontalPodAutoscaler>),
    Override(Event<Override>),
    Ignore(Event<Ignore>),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = EngineConfig::load(CONFIG_FILE).context("loading engine configuration")?;
    tracing::info!(api_server_url = %config.api_server_url, sync_period_secs = config.sync_period_secs, "kubedynamicscaler starting");

    let client = HttpClusterClient::new(config.api_server_url.clone());
    let policy_client: Box<dyn PolicyApi> = Box::new(client.clone());
    let deployment_lookup: Box<dyn DeploymentApi> = Box::new(client.clone());

    let policy_store = Arc::new(PolicyStore::new());
    match policy_client.get_global_config(&config.config_namespace, &config.config_name).await {
        Ok(global) => policy_store.publish_global(global).await,
        Err(e) => tracing::warn!(error = %e, "no global configuration document yet, starting from defaults"),
    }
    for override_obj in policy_client.list_overrides().await.context("listing overrides at startup")? {
        policy_store.upsert_override(override_obj).await;
    }
    for ignore_obj in policy_client.list_ignores().await.context("listing ignores at startup")? {
        policy_store.upsert_ignore(ignore_obj).await;
    }

    let cluster = ClusterHandle {
        deployments: Box::new(client.clone()),
        hpas: Box::new(client.clone()),
        policies: Box::new(client.clone()),
        namespaces: Box::new(client.clone()),
    };
    let reconciler = Reconciler::new(cluster, policy_store.clone(), config.conflict_retry_limit);

    let (tx, mut rx) = mpsc::channel::<ObjectChange>(64);
    let (deployment_informer, _) =
        Informer::new(http::create_lister_watcher(&config.api_server_url, &config.api_server_watch_url, "deployments"));
    let (hpa_informer, _) = Informer::new(http::create_lister_watcher(
        &config.api_server_url,
        &config.api_server_watch_url,
        "horizontalpodautoscalers",
    ));
    let (override_informer, _) =
        Informer::new(http::create_lister_watcher(&config.api_server_url, &config.api_server_watch_url, "overrides"));
    let (ignore_informer, _) =
        Informer::new(http::create_lister_watcher(&config.api_server_url, &config.api_server_watch_url, "ignores"));

    let deployment_handle = spawn_informer(deployment_informer, tx.clone(), ObjectChange::Deployment);
    let hpa_handle = spawn_informer(hpa_informer, tx.clone(), ObjectChange::Hpa);
    let override_handle = spawn_informer(override_informer, tx.clone(), ObjectChange::Override);
    let ignore_handle = spawn_informer(ignore_informer, tx, ObjectChange::Ignore);

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    let mut work_queue: WorkQueue<ReconcileRequest> = WorkQueue::new();
    let mut global_config_interval = tokio::time::interval(Duration::from_secs(config.sync_period_secs));
    global_config_interval.tick().await; // first tick fires immediately; the preload above already covers it

    loop {
        tokio::select! {
            Some(change) = rx.recv() => {
                if let Err(e) = handle_object_change(change, &policy_store, &*deployment_lookup, &reconciler, &mut work_queue).await {
                    tracing::error!(error = %e, "failed handling object-change notification");
                }
            },
            _ = global_config_interval.tick() => {
                match policy_client.get_global_config(&config.config_namespace, &config.config_name).await {
                    Ok(global) => {
                        policy_store.publish_global(global).await;
                        work_queue.enqueue_now(ReconcileRequest::GlobalConfigChanged);
                    },
                    Err(e) => tracing::warn!(error = %e, "failed reloading global configuration document, keeping previous snapshot"),
                }
            },
            Some(request) = work_queue.recv() => {
                match reconciler.process(&request).await {
                    Ok(()) => tracing::debug!(?request, "reconciliation pass completed"),
                    Err(e) => tracing::error!(?request, error = %e, "reconciliation pass failed"),
                }
                work_queue.enqueue_after(request, Duration::from_secs(config.sync_period_secs));
            },
            _ = shutdown.cancelled() => break,
            else => break,
        }
    }

    tracing::info!("kubedynamicscaler shutting down, waiting for informers to exit");
    for handle in [deployment_handle, hpa_handle, override_handle, ignore_handle] {
        handle.abort();
    }
    Ok(())
}

fn spawn_informer<T, F>(informer: Informer<T>, tx: mpsc::Sender<ObjectChange>, wrap: F) -> tokio::task::JoinHandle<()>
where
    T: Object + Clone + Send + Sync + 'static,
    F: Fn(Event<T>) -> ObjectChange + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let result = informer
            .run(move |event| {
                let tx = tx.clone();
                let change = wrap(event);
                Box::pin(async move {
                    let _ = tx.send(change).await;
                    Ok(())
                }) as futures_util::future::BoxFuture<'static, Result<()>>
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "informer loop exited");
        }
    })
}

/// Translate one object-change notification into policy-store updates and
/// work-queue enqueues.
async fn handle_object_change(
    change: ObjectChange,
    policy_store: &PolicyStore,
    deployments: &dyn DeploymentApi,
    reconciler: &Reconciler,
    work_queue: &mut WorkQueue<ReconcileRequest>,
) -> Result<()> {
    match change {
        ObjectChange::Deployment(event) => {
            let deployment = match event {
                Event::Add(d) | Event::Update(_, d) => d,
                Event::Delete(_) => return Ok(()),
            };
            let snapshot = policy_store.snapshot().await;
            for request in event_mapper::map_deployment_change(&deployment, &snapshot) {
                work_queue.enqueue_now(request);
            }
        },
        ObjectChange::Hpa(event) => {
            // An HPA deletion still needs its former target re-evaluated:
            // the Deployment falls back off HPA precedence.
            let hpa = match event {
                Event::Add(h) | Event::Update(_, h) | Event::Delete(h) => h,
            };
            let snapshot = policy_store.snapshot().await;
            for request in event_mapper::map_hpa_change(&hpa, deployments, &snapshot).await? {
                work_queue.enqueue_now(request);
            }
        },
        ObjectChange::Override(event) => match event {
            Event::Add(o) | Event::Update(_, o) => {
                work_queue.enqueue_now(ReconcileRequest::Override {
                    namespace: o.namespace().to_string(),
                    name: o.name().to_string(),
                });
                policy_store.upsert_override(o).await;
            },
            Event::Delete(old) => {
                policy_store.remove_override(&old.key()).await;
                reconciler.revert_override(&old).await;
            },
        },
        ObjectChange::Ignore(event) => match event {
            Event::Add(i) | Event::Update(_, i) => {
                work_queue.enqueue_now(ReconcileRequest::Ignore {
                    namespace: i.namespace().to_string(),
                    name: i.name().to_string(),
                });
                policy_store.upsert_ignore(i).await;
            },
            Event::Delete(old) => {
                policy_store.remove_ignore(&old.key()).await;
                // Deployments this rule used to ignore are eligible again;
                // re-run the normal mapping so each lands on whichever path
                // (Override or GlobalPath) currently applies to it, rather
                // than assuming the global path.
                if let Some(status) = &old.status {
                    let snapshot = policy_store.snapshot().await;
                    for ignored in &status.ignored_deployments {
                        if let Some(deployment) = deployments.get(&ignored.namespace, &ignored.name).await? {
                            for request in event_mapper::map_deployment_change(&deployment, &snapshot) {
                                work_queue.enqueue_now(request);
                            }
                        }
                    }
                }
            },
        },
    }
    Ok(())
}
