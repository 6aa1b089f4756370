//! Client side of the verigate console: HTTP transport, resource cache,
//! job poller and mutation coordination.

pub mod api;
pub mod cache;
pub mod config;
pub mod console;
pub mod error;
pub mod export;
pub mod http;
pub mod mutation;
pub mod poller;
pub mod refresh;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ConsoleApi, UploadFile};
pub use cache::{
    CacheEvent, CacheEventKind, RefreshPolicies, RefreshPolicy, Resource, ResourceCache,
    ResourceKey, Subscription,
};
pub use config::{ConfigOverrides, ConsoleConfig};
pub use console::{Console, ReportView, StatsOverview, LIVE_KEYS};
pub use error::SyncError;
pub use export::{export_file_name, export_report};
pub use http::HttpApi;
pub use mutation::{CacheEffect, CancelOutcome, Mutation, MutationCoordinator};
pub use poller::{JobPoller, PollerState};
pub use refresh::{BackgroundTasks, Refresher};
