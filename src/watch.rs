//! Watch-stream notification source.
//!
//! Adapts a `kube-runtime` watcher to the operator's notification boundary:
//! bound at registration, started with the other starters, delivering
//! add/update/delete callbacks until the stop token fires. Watch errors are
//! logged; the watcher re-lists and recovers on its own.

use std::fmt::Debug;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use kube::runtime::watcher;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::operator::{Identified, NotificationSource, ResourceEvents, Starter};

/// Notification source backed by a Kubernetes watch on one resource kind.
pub struct WatchSource<K> {
    api: Api<K>,
    events: Mutex<Option<ResourceEvents>>,
}

impl<K> WatchSource<K> {
    pub fn new(api: Api<K>) -> Self {
        Self {
            api,
            events: Mutex::new(None),
        }
    }
}

impl<K> NotificationSource for WatchSource<K>
where
    K: Resource + Send + Sync + 'static,
{
    fn bind(&self, events: ResourceEvents) -> Result<()> {
        let mut slot = self.events.lock().expect("watch source mutex poisoned");
        if slot.is_some() {
            return Err(Error::registration("watch source already bound"));
        }
        *slot = Some(events);
        Ok(())
    }
}

#[async_trait]
impl<K> Starter for WatchSource<K>
where
    K: Resource + Identified + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    async fn start(&self, stop: CancellationToken) -> Result<()> {
        let events = self
            .events
            .lock()
            .expect("watch source mutex poisoned")
            .clone()
            .ok_or_else(|| Error::registration("watch source started before registration"))?;

        let api = self.api.clone();
        tokio::spawn(async move {
            let mut stream = watcher::watcher(api, watcher::Config::default()).boxed();
            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        info!("watch source stopping");
                        return;
                    }
                    event = stream.next() => match event {
                        Some(Ok(watcher::Event::InitApply(obj))) => events.on_add(Some(&obj)),
                        Some(Ok(watcher::Event::Apply(obj))) => {
                            events.on_update(Some(&obj), Some(&obj));
                        }
                        Some(Ok(watcher::Event::Delete(obj))) => events.on_delete(Some(&obj)),
                        Some(Ok(watcher::Event::Init | watcher::Event::InitDone)) => {}
                        Some(Err(err)) => warn!(error = %err, "watch error, stream will re-list"),
                        None => {
                            warn!("watch stream ended");
                            return;
                        }
                    }
                }
            }
        });

        Ok(())
    }
}
