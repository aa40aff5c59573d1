//! Generic reflector/informer: turns cluster list/watch traffic into a
//! stream of object-change notifications.
//!
//! Grounded in `resources::controller`'s `ListerWatcher`/`Reflector`/
//! `Informer` trio: list once to prime a local store, then fold a watch
//! stream of put/delete events into `Event::Add`/`Update`/`Delete`
//! notifications on a channel. Generalized from the teacher's single
//! `KubeObject` union to any `T: Clone + Object`.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::stream::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::objects::Object;

pub type Store<T> = Arc<DashMap<String, T>>;

pub type Cls<Arg, Res> = Box<dyn Fn(Arg) -> BoxFuture<'static, Result<Res>> + Send + Sync>;

pub struct ListerWatcher<T> {
    pub lister: Cls<(), Vec<T>>,
    pub watcher: Cls<(), WatchStream>,
}

/// Placeholder for the teacher's `tokio_tungstenite::WebSocketStream`
/// connection to the api-server watch endpoint; boxed so `http` and `fake`
/// can each supply their own transport.
pub type WatchStream = Box<dyn futures_util::Stream<Item = tokio_tungstenite::tungstenite::Result<Message>> + Unpin + Send>;

#[derive(Debug, Clone)]
pub enum Event<T> {
    Add(T),
    Update(T, T),
    Delete(T),
}

pub struct Informer<T> {
    lw: ListerWatcher<T>,
    store: Store<T>,
}

impl<T: Object + Clone + Send + Sync + 'static> Informer<T> {
    pub fn new(lw: ListerWatcher<T>) -> (Self, Store<T>) {
        let store = Arc::new(DashMap::new());
        (Informer { lw, store: store.clone() }, store)
    }

    /// Run the reflector loop, invoking `on_event` for every change. Exits
    /// (and returns an error) if the watch connection drops — the caller is
    /// expected to retry/backoff and re-run.
    pub async fn run<F>(&self, mut on_event: F) -> Result<()>
    where
        F: FnMut(Event<T>) -> BoxFuture<'static, Result<()>>,
    {
        let objects = (self.lw.lister)(()).await?;
        for object in objects {
            self.store.insert(object.key(), object);
        }

        let mut watch = (self.lw.watcher)(()).await?;
        tracing::info!("informer started");

        let (tx, mut rx) = mpsc::channel::<Event<T>>(64);
        let store = self.store.clone();
        let forward = async move {
            while let Some(msg) = watch.next().await {
                let msg = msg.map_err(|e| anyhow!("watch transport error: {e}"))?;
                if msg.is_close() {
                    return Err(anyhow!("api-server watch disconnected"));
                }
                let Message::Text(text) = msg else {
                    tracing::warn!("ignoring non-text watch message");
                    continue;
                };
                let notification: WatchNotification<T> = serde_json::from_str(&text)?;
                let event = match notification {
                    WatchNotification::Put(object) => {
                        let key = object.key();
                        match store.get(&key) {
                            Some(existing) => {
                                let old = existing.clone();
                                drop(existing);
                                store.insert(key, object.clone());
                                Event::Update(old, object)
                            },
                            None => {
                                store.insert(key, object.clone());
                                Event::Add(object)
                            },
                        }
                    },
                    WatchNotification::Delete(key) => match store.remove(&key) {
                        Some((_, old)) => Event::Delete(old),
                        None => {
                            tracing::warn!(key, "watch inconsistent: delete of unknown key");
                            continue;
                        },
                    },
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok::<(), anyhow::Error>(())
        };

        tokio::pin!(forward);
        loop {
            tokio::select! {
                result = &mut forward => return result,
                Some(event) = rx.recv() => on_event(event).await?,
                else => break,
            }
        }
        Ok(())
    }
}

/// Wire shape of a watch notification, mirroring `resources::models::etcd::WatchEvent`
/// generalized to a typed payload rather than a JSON string.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
enum WatchNotification<T> {
    Put(T),
    Delete(String),
}
