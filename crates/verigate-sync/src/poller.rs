//! Background tracking of the single active validation job.
//!
//! The poller fetches `/jobs/active` through the cache on a fixed interval,
//! whether or not a job is running. Completion is only ever inferred from a poll that
//! reports no active job; a failed poll keeps the previous state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use verigate_core::{Job, JobId, JobStatus};

use crate::cache::{CacheEventKind, ResourceCache, ResourceKey};
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PollerState {
    #[default]
    Idle,
    Polling(Job),
}

impl PollerState {
    pub fn job(&self) -> Option<&Job> {
        match self {
            Self::Idle => None,
            Self::Polling(job) => Some(job),
        }
    }
}

impl From<&JobStatus> for PollerState {
    fn from(status: &JobStatus) -> Self {
        match status.job() {
            Some(job) => Self::Polling(job.clone()),
            None => Self::Idle,
        }
    }
}

/// Tracks the active job and publishes its state on a watch channel.
#[derive(Clone)]
pub struct JobPoller {
    cache: ResourceCache,
    interval: Duration,
    state: Arc<watch::Sender<PollerState>>,
}

impl JobPoller {
    pub fn new(cache: ResourceCache, interval: Duration) -> Self {
        let (state, _) = watch::channel(PollerState::Idle);
        Self {
            cache,
            interval,
            state: Arc::new(state),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PollerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    /// Id of the job currently shown; cancellation targets this id.
    pub fn displayed_job_id(&self) -> Option<JobId> {
        self.state.borrow().job().map(|j| j.job_id)
    }

    /// Run one poll and apply its result.
    ///
    /// On error the state is left as it was and the error is returned; the
    /// caller decides whether to retry. When the fetch joined one that was
    /// invalidated while in flight, one more fetch is issued.
    pub async fn tick(&self) -> Result<PollerState, SyncError> {
        let mut resource = self.cache.fetch(ResourceKey::ActiveJob).await?;
        if self.cache.is_stale(&ResourceKey::ActiveJob) {
            debug!("active job invalidated during poll; fetching again");
            resource = self.cache.fetch(ResourceKey::ActiveJob).await?;
        }
        let next = resource
            .as_job()
            .map(PollerState::from)
            .unwrap_or_default();

        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            match (&*current, &next) {
                (PollerState::Idle, PollerState::Polling(job)) => {
                    info!(job_id = job.job_id, filename = %job.filename, "tracking validation job");
                }
                (PollerState::Polling(job), PollerState::Idle) => {
                    info!(job_id = job.job_id, "validation job no longer active");
                }
                (_, PollerState::Polling(job)) => {
                    debug!(
                        job_id = job.job_id,
                        processed = job.processed_providers,
                        total = job.total_providers,
                        step = %job.current_step,
                        "job progress"
                    );
                }
                _ => {}
            }
            *current = next.clone();
            true
        });
        Ok(next)
    }

    /// Poll forever. An invalidation of the active-job entry triggers an
    /// immediate poll and restarts the interval.
    pub async fn run(self) {
        let wake = Arc::new(Notify::new());
        let _subscription = self.cache.subscribe(ResourceKey::ActiveJob, {
            let wake = Arc::clone(&wake);
            move |event| {
                if event.kind == CacheEventKind::Invalidated {
                    wake.notify_one();
                }
            }
        });

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = wake.notified() => interval.reset(),
            }
            if let Err(e) = self.tick().await {
                warn!(error = %e, transient = e.is_transient(), "job poll failed; keeping state");
            }
        }
    }
}
