//! Keyed store of fetched resources with invalidation and change notification.
//!
//! Every entry is replaced wholesale by a successful fetch; there is no
//! partial merge. Subscribers are called synchronously after the replacement
//! (or invalidation) with the cache lock already released, so a callback may
//! read the cache again.
//!
//! Concurrent fetches for one key collapse: while a fetch for `K` is in flight,
//! further fetches of `K` await the same shared future instead of issuing
//! another request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};
use verigate_core::{
    AgentLog, Configuration, DashboardStats, Discrepancy, JobStatus, Provider, SystemStatus,
    ValidationId, ValidationReport,
};

use crate::api::ConsoleApi;
use crate::error::SyncError;

/// Identifies one cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Stats,
    Providers,
    ActiveJob,
    Logs,
    Config,
    SystemStatus,
    Report(ValidationId),
    Discrepancies(ValidationId),
}

impl ResourceKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stats => "stats",
            Self::Providers => "providers",
            Self::ActiveJob => "active_job",
            Self::Logs => "logs",
            Self::Config => "config",
            Self::SystemStatus => "system_status",
            Self::Report(_) => "report",
            Self::Discrepancies(_) => "discrepancies",
        }
    }
}

/// A fetched resource.
#[derive(Debug, Clone)]
pub enum Resource {
    Stats(DashboardStats),
    Providers(Vec<Provider>),
    ActiveJob(JobStatus),
    Logs(Vec<AgentLog>),
    Config(Configuration),
    SystemStatus(SystemStatus),
    Report(ValidationReport),
    Discrepancies(Vec<Discrepancy>),
}

impl Resource {
    pub fn as_stats(&self) -> Option<&DashboardStats> {
        match self {
            Self::Stats(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_providers(&self) -> Option<&[Provider]> {
        match self {
            Self::Providers(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_job(&self) -> Option<&JobStatus> {
        match self {
            Self::ActiveJob(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_logs(&self) -> Option<&[AgentLog]> {
        match self {
            Self::Logs(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&Configuration> {
        match self {
            Self::Config(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_system_status(&self) -> Option<&SystemStatus> {
        match self {
            Self::SystemStatus(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Report(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_discrepancies(&self) -> Option<&[Discrepancy]> {
        match self {
            Self::Discrepancies(v) => Some(v),
            _ => None,
        }
    }
}

/// How an entry is kept fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Refetch only after an explicit invalidation.
    OnDemand,
    /// Refetch on this interval regardless of invalidation, to pick up server
    /// changes this console did not cause.
    Periodic(Duration),
}

/// Refresh policy per key.
#[derive(Debug, Clone)]
pub struct RefreshPolicies {
    /// Stats and providers.
    pub collections: Duration,
    pub logs: Duration,
}

impl Default for RefreshPolicies {
    fn default() -> Self {
        Self {
            collections: Duration::from_secs(5),
            logs: Duration::from_secs(2),
        }
    }
}

impl RefreshPolicies {
    pub fn policy(&self, key: &ResourceKey) -> RefreshPolicy {
        match key {
            ResourceKey::Stats | ResourceKey::Providers => RefreshPolicy::Periodic(self.collections),
            ResourceKey::Logs => RefreshPolicy::Periodic(self.logs),
            _ => RefreshPolicy::OnDemand,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    /// The entry was replaced by a new value.
    Replaced,
    /// The entry was marked stale and should be refetched.
    Invalidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: ResourceKey,
    pub kind: CacheEventKind,
}

type Callback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Resource>, Arc<SyncError>>>>;

struct Entry {
    value: Option<Arc<Resource>>,
    stale: bool,
    /// Bumped on every invalidation; a fetch that started under an older
    /// generation cannot clear the stale flag.
    generation: u64,
    fetched_at: Option<Instant>,
}

impl Entry {
    fn empty() -> Self {
        Self {
            value: None,
            stale: false,
            generation: 0,
            fetched_at: None,
        }
    }
}

struct Subscriber {
    id: u64,
    key: ResourceKey,
    callback: Callback,
}

struct Inner {
    api: Arc<dyn ConsoleApi>,
    policies: RefreshPolicies,
    entries: Mutex<HashMap<ResourceKey, Entry>>,
    in_flight: Mutex<HashMap<ResourceKey, SharedFetch>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
}

/// Shared handle to the resource cache. Cloning is cheap.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<Inner>,
}

/// Keeps a subscription alive; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}

impl ResourceCache {
    pub fn new(api: Arc<dyn ConsoleApi>, policies: RefreshPolicies) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                policies,
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    pub fn api(&self) -> &Arc<dyn ConsoleApi> {
        &self.inner.api
    }

    pub fn policy(&self, key: &ResourceKey) -> RefreshPolicy {
        self.inner.policies.policy(key)
    }

    /// Cached value, stale or not. `None` when nothing was ever stored.
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<Resource>> {
        self.inner
            .entries
            .lock()
            .get(key)
            .and_then(|e| e.value.clone())
    }

    pub fn is_stale(&self, key: &ResourceKey) -> bool {
        self.inner.entries.lock().get(key).is_some_and(|e| e.stale)
    }

    /// Time since the entry was last replaced.
    pub fn age(&self, key: &ResourceKey) -> Option<Duration> {
        self.inner
            .entries
            .lock()
            .get(key)
            .and_then(|e| e.fetched_at)
            .map(|t| t.elapsed())
    }

    /// Replace an entry and notify its subscribers.
    pub fn set(&self, key: ResourceKey, value: Resource) -> Arc<Resource> {
        let value = Arc::new(value);
        {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(key).or_insert_with(Entry::empty);
            entry.value = Some(Arc::clone(&value));
            entry.stale = false;
            entry.fetched_at = Some(Instant::now());
        }
        self.notify(CacheEvent {
            key,
            kind: CacheEventKind::Replaced,
        });
        value
    }

    /// Mark entries stale and notify their subscribers.
    pub fn invalidate(&self, keys: &[ResourceKey]) {
        {
            let mut entries = self.inner.entries.lock();
            for key in keys {
                let entry = entries.entry(*key).or_insert_with(Entry::empty);
                entry.stale = true;
                entry.generation += 1;
            }
        }
        debug!(keys = ?keys, "invalidated cache entries");
        for key in keys {
            self.notify(CacheEvent {
                key: *key,
                kind: CacheEventKind::Invalidated,
            });
        }
    }

    /// Register a callback for changes to `key`.
    pub fn subscribe<F>(&self, key: ResourceKey, callback: F) -> Subscription
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push(Subscriber {
            id,
            key,
            callback: Arc::new(callback),
        });
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self, key: &ResourceKey) -> usize {
        self.inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.key == *key)
            .count()
    }

    /// Cached value when present and fresh, otherwise a fetch.
    pub async fn read(&self, key: ResourceKey) -> Result<Arc<Resource>, SyncError> {
        {
            let entries = self.inner.entries.lock();
            if let Some(entry) = entries.get(&key)
                && !entry.stale
                && let Some(value) = &entry.value
            {
                return Ok(Arc::clone(value));
            }
        }
        self.fetch(key).await
    }

    /// Fetch `key` from the API and replace the entry.
    ///
    /// Joins an in-flight fetch of the same key when there is one. A failed
    /// fetch leaves the entry untouched.
    pub async fn fetch(&self, key: ResourceKey) -> Result<Arc<Resource>, SyncError> {
        let shared = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!(key = key.as_str(), "joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let fut = self.start_fetch(key);
                    in_flight.insert(key, fut.clone());
                    fut
                }
            }
        };
        shared.await.map_err(SyncError::Shared)
    }

    fn start_fetch(&self, key: ResourceKey) -> SharedFetch {
        let cache = self.clone();
        let generation = self
            .inner
            .entries
            .lock()
            .get(&key)
            .map_or(0, |e| e.generation);

        async move {
            let result = load(cache.inner.api.as_ref(), key).await;
            let outcome = match result {
                Ok(resource) => Ok(cache.replace_fetched(key, resource, generation)),
                Err(e) => {
                    warn!(key = key.as_str(), error = %e, "fetch failed");
                    Err(Arc::new(e))
                }
            };
            cache.inner.in_flight.lock().remove(&key);
            outcome
        }
        .boxed()
        .shared()
    }

    fn replace_fetched(&self, key: ResourceKey, resource: Resource, generation: u64) -> Arc<Resource> {
        let value = Arc::new(resource);
        {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(key).or_insert_with(Entry::empty);
            entry.value = Some(Arc::clone(&value));
            entry.fetched_at = Some(Instant::now());
            // Invalidated while the request was out: keep it stale so the next
            // read sees post-mutation data.
            entry.stale = entry.generation != generation;
        }
        self.notify(CacheEvent {
            key,
            kind: CacheEventKind::Replaced,
        });
        value
    }

    fn notify(&self, event: CacheEvent) {
        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.key == event.key)
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for callback in callbacks {
            callback(&event);
        }
    }
}

async fn load(api: &dyn ConsoleApi, key: ResourceKey) -> Result<Resource, SyncError> {
    Ok(match key {
        ResourceKey::Stats => Resource::Stats(api.dashboard_stats().await?),
        ResourceKey::Providers => Resource::Providers(api.providers().await?),
        ResourceKey::ActiveJob => Resource::ActiveJob(api.active_job().await?),
        ResourceKey::Logs => Resource::Logs(api.logs().await?),
        ResourceKey::Config => Resource::Config(api.config().await?),
        ResourceKey::SystemStatus => Resource::SystemStatus(api.system_status().await?),
        ResourceKey::Report(id) => Resource::Report(api.validation_report(id).await?),
        ResourceKey::Discrepancies(id) => Resource::Discrepancies(api.discrepancies(id).await?),
    })
}
