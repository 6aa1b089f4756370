//! One handle bundling everything a console front end needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;
use verigate_core::classify::{self, DEFAULT_THRESHOLD_PERCENT};
use verigate_core::{
    AgentLog, ClassCounts, Configuration, DashboardStats, FieldComparison, JobStatus, Provider,
    RenderedDiscrepancy, StatsDrift, SystemStatus, UploadReceipt, ValidationId, ValidationReport,
};

use crate::api::{ConsoleApi, UploadFile};
use crate::cache::{Resource, ResourceCache, ResourceKey};
use crate::config::ConsoleConfig;
use crate::error::SyncError;
use crate::export::export_report;
use crate::http::HttpApi;
use crate::mutation::{CancelOutcome, MutationCoordinator};
use crate::poller::JobPoller;
use crate::refresh::{BackgroundTasks, Refresher};

/// Keys kept fresh while a live view is open.
pub const LIVE_KEYS: &[ResourceKey] = &[ResourceKey::Stats, ResourceKey::Providers, ResourceKey::Logs];

/// Server counters next to the console's own classification.
#[derive(Debug, Clone)]
pub struct StatsOverview {
    pub server: DashboardStats,
    pub local: ClassCounts,
    pub threshold_percent: u8,
    pub drift: Option<StatsDrift>,
}

/// Everything shown on a report page.
#[derive(Debug, Clone)]
pub struct ReportView {
    pub report: ValidationReport,
    pub comparisons: Vec<FieldComparison>,
    pub discrepancies: Vec<RenderedDiscrepancy>,
    pub logs: Vec<AgentLog>,
}

pub struct Console {
    config: ConsoleConfig,
    cache: ResourceCache,
    poller: JobPoller,
    mutations: MutationCoordinator,
}

macro_rules! read_as {
    ($self:ident, $key:expr, $accessor:ident) => {{
        let resource = $self.cache.read($key).await?;
        let value = resource.$accessor().map(|v| v.to_owned());
        value.ok_or_else(|| unexpected($key))
    }};
}

fn unexpected(key: ResourceKey) -> SyncError {
    SyncError::ResourceMismatch(key.as_str())
}

impl Console {
    /// Connect to the backend named in `config`.
    pub fn connect(config: ConsoleConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let api = HttpApi::new(&config.api_base_url, config.request_timeout())?;
        Ok(Self::with_api(config, Arc::new(api)))
    }

    pub fn with_api(config: ConsoleConfig, api: Arc<dyn ConsoleApi>) -> Self {
        let cache = ResourceCache::new(api, config.refresh_policies());
        Self {
            poller: JobPoller::new(cache.clone(), config.job_poll_interval()),
            mutations: MutationCoordinator::new(cache.clone()),
            cache,
            config,
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn poller(&self) -> &JobPoller {
        &self.poller
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    /// Start the job poller and the refresh loops for [`LIVE_KEYS`]. Every
    /// task stops when the returned handle is dropped.
    pub fn start_background(&self) -> BackgroundTasks {
        let mut tasks = Refresher::new(self.cache.clone()).spawn(LIVE_KEYS);
        tasks.push(tokio::spawn(self.poller.clone().run()));
        tasks
    }

    pub async fn stats(&self) -> Result<DashboardStats, SyncError> {
        read_as!(self, ResourceKey::Stats, as_stats)
    }

    pub async fn providers(&self) -> Result<Vec<Provider>, SyncError> {
        read_as!(self, ResourceKey::Providers, as_providers)
    }

    pub async fn logs(&self) -> Result<Vec<AgentLog>, SyncError> {
        read_as!(self, ResourceKey::Logs, as_logs)
    }

    pub async fn configuration(&self) -> Result<Configuration, SyncError> {
        read_as!(self, ResourceKey::Config, as_config)
    }

    pub async fn system_status(&self) -> Result<SystemStatus, SyncError> {
        read_as!(self, ResourceKey::SystemStatus, as_system_status)
    }

    pub async fn active_job(&self) -> Result<JobStatus, SyncError> {
        read_as!(self, ResourceKey::ActiveJob, as_job)
    }

    /// Threshold in whole percent; falls back to the default when the
    /// configuration cannot be loaded.
    pub async fn threshold_percent(&self) -> u8 {
        match self.configuration().await {
            Ok(config) => classify::threshold_percent(Some(&config)),
            Err(e) => {
                warn!(error = %e, default = DEFAULT_THRESHOLD_PERCENT, "configuration unavailable; using default threshold");
                classify::threshold_percent(None)
            }
        }
    }

    pub async fn stats_overview(&self) -> Result<StatsOverview, SyncError> {
        let (server, providers) = tokio::try_join!(self.stats(), self.providers())?;
        let threshold_percent = self.threshold_percent().await;
        Ok(StatsOverview {
            local: classify::classify(&providers, threshold_percent),
            drift: classify::detect_drift(&server, &providers, threshold_percent),
            server,
            threshold_percent,
        })
    }

    /// Load a report with its discrepancies and related logs.
    ///
    /// The discrepancy endpoint is preferred; when it fails the entries
    /// embedded in the report are used. Missing logs are not an error.
    pub async fn report_view(&self, id: ValidationId) -> Result<ReportView, SyncError> {
        let report = self.cache.read(ResourceKey::Report(id)).await?;
        let report = report
            .as_report()
            .cloned()
            .ok_or_else(|| unexpected(ResourceKey::Report(id)))?;

        let discrepancies = match self.cache.read(ResourceKey::Discrepancies(id)).await {
            Ok(resource) => resource.as_discrepancies().map(<[_]>::to_vec),
            Err(e) => {
                warn!(validation_id = id, error = %e, "discrepancy endpoint failed; using report entries");
                None
            }
        }
        .unwrap_or_else(|| report.discrepancies.clone());

        let logs = self
            .cache
            .api()
            .validation_logs(id)
            .await
            .unwrap_or_else(|e| {
                warn!(validation_id = id, error = %e, "related logs unavailable");
                Vec::new()
            });

        Ok(ReportView {
            comparisons: verigate_core::reconcile_report(&report),
            discrepancies: discrepancies.iter().map(|d| d.render()).collect(),
            report,
            logs,
        })
    }

    /// Export report `id` into `dir`, or into the configured export directory.
    pub async fn export(&self, id: ValidationId, dir: Option<&Path>) -> Result<PathBuf, SyncError> {
        let resource = self.cache.read(ResourceKey::Report(id)).await?;
        let report = resource
            .as_report()
            .ok_or_else(|| unexpected(ResourceKey::Report(id)))?;
        export_report(report, dir.unwrap_or(self.config.export_dir.as_path())).await
    }

    /// Read a file from disk and submit it for validation.
    pub async fn upload_path(&self, path: &Path) -> Result<UploadReceipt, SyncError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());
        self.mutations.upload(UploadFile { filename, bytes }).await
    }

    /// Cancel the job the poller currently shows. `Ok(None)` when no job is
    /// displayed; the backend is not asked which job is active.
    pub async fn cancel_displayed(&self) -> Result<Option<CancelOutcome>, SyncError> {
        match self.poller.displayed_job_id() {
            Some(id) => self.mutations.cancel_job(id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Fetch an entry now, whether or not the cached copy is fresh.
    pub async fn refresh(&self, key: ResourceKey) -> Result<Arc<Resource>, SyncError> {
        self.cache.fetch(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;

    fn console(api: &Arc<FakeApi>) -> Console {
        Console::with_api(ConsoleConfig::default(), api.clone())
    }

    #[tokio::test]
    async fn overview_uses_default_threshold_without_config() {
        let api = Arc::new(FakeApi::with_providers(4));
        api.fail_next("config");
        let console = console(&api);

        let overview = console.stats_overview().await.unwrap();
        assert_eq!(overview.threshold_percent, 78);
        assert_eq!(overview.local, ClassCounts { validated: 2, flagged: 2 });
        assert!(overview.drift.is_none());
    }

    #[tokio::test]
    async fn report_view_combines_sources() {
        let api = Arc::new(FakeApi::with_providers(2));
        let console = console(&api);

        let view = console.report_view(200).await.unwrap();
        assert_eq!(view.report.provider_id, 2);
        assert_eq!(view.comparisons.len(), 5);
        assert_eq!(view.comparisons[0].registry, "Provider 2");
        assert_eq!(view.comparisons[2].extracted, "N/A");
        // Null entries are dropped; the three other shapes render.
        assert_eq!(view.discrepancies.len(), 3);
        assert_eq!(view.discrepancies[0].headline, "license: mismatch (-15%)");
    }

    #[tokio::test]
    async fn report_view_falls_back_to_embedded_discrepancies() {
        let api = Arc::new(FakeApi::with_providers(1));
        api.fail_next("discrepancies");
        let view = console(&api).report_view(100).await.unwrap();
        assert_eq!(view.discrepancies.len(), 1);
    }

    #[tokio::test]
    async fn cancel_without_job_is_none() {
        let api = Arc::new(FakeApi::with_providers(0));
        assert_eq!(console(&api).cancel_displayed().await.unwrap(), None);
    }

    #[tokio::test]
    async fn cancel_never_targets_an_undisplayed_job() {
        let api = Arc::new(FakeApi::with_providers(0));
        let console = console(&api);
        assert_eq!(console.poller().displayed_job_id(), None);
        api.start_job("newer.pdf", 3);

        assert_eq!(console.cancel_displayed().await.unwrap(), None);
        assert_eq!(api.calls("active_job"), 0);
        assert_eq!(api.calls("cancel_job"), 0);
        assert!(api.active_job().await.unwrap().job().is_some());
    }

    #[tokio::test]
    async fn cancel_targets_displayed_job() {
        let api = Arc::new(FakeApi::with_providers(0));
        let console = console(&api);
        api.start_job("roster.pdf", 3);
        console.poller().tick().await.unwrap();

        let outcome = console.cancel_displayed().await.unwrap();
        assert_eq!(outcome, Some(CancelOutcome::Cancelled));
    }

    #[tokio::test]
    async fn export_writes_into_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeApi::with_providers(1));
        let config = ConsoleConfig {
            export_dir: dir.path().to_path_buf(),
            ..ConsoleConfig::default()
        };
        let console = Console::with_api(config, api);
        let path = console.export(100, None).await.unwrap();
        assert!(path.ends_with("validation_report_100.json"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn upload_path_reads_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("roster.pdf");
        std::fs::write(&file, b"%PDF-1.7").unwrap();
        let api = Arc::new(FakeApi::with_providers(0));

        let receipt = console(&api).upload_path(&file).await.unwrap();
        assert_eq!(receipt.filename.as_deref(), Some("roster.pdf"));
    }
}
