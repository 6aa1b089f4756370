//! Periodic refetching of cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::cache::{CacheEventKind, RefreshPolicy, ResourceCache, ResourceKey};

/// Spawned background loops, aborted when dropped.
#[derive(Default)]
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Keeps periodic entries fresh.
///
/// Each periodic key gets one loop that refetches on its interval and
/// immediately after the key is invalidated. On-demand keys are skipped.
#[derive(Clone)]
pub struct Refresher {
    cache: ResourceCache,
}

impl Refresher {
    pub fn new(cache: ResourceCache) -> Self {
        Self { cache }
    }

    pub fn spawn(&self, keys: &[ResourceKey]) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::default();
        for key in keys {
            match self.cache.policy(key) {
                RefreshPolicy::Periodic(period) => {
                    tasks.push(tokio::spawn(refresh_loop(self.cache.clone(), *key, period)));
                }
                RefreshPolicy::OnDemand => {
                    debug!(key = key.as_str(), "on-demand key; no refresh loop");
                }
            }
        }
        tasks
    }
}

async fn refresh_loop(cache: ResourceCache, key: ResourceKey, period: Duration) {
    let wake = Arc::new(Notify::new());
    let _subscription = cache.subscribe(key, {
        let wake = Arc::clone(&wake);
        move |event| {
            if event.kind == CacheEventKind::Invalidated {
                wake.notify_one();
            }
        }
    });

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = wake.notified() => interval.reset(),
        }
        if let Err(e) = cache.fetch(key).await {
            warn!(key = key.as_str(), error = %e, transient = e.is_transient(), "refresh failed");
        }
    }
}
