//! The remote API boundary the console depends on.

use async_trait::async_trait;
use verigate_core::{
    AgentLog, CancelAck, Configuration, DashboardStats, Discrepancy, JobId, JobStatus, Provider,
    ProviderId, SecretsAck, SecretsUpdate, SystemStatus, UploadReceipt, ValidationId,
    ValidationReport,
};

use crate::error::SyncError;

/// A document to submit for validation.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Requests the console issues against the validation backend.
///
/// [`crate::HttpApi`] is the production implementation; everything above this
/// trait (cache, poller, coordinator) is written against it so it can run
/// against an in-memory backend in tests.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn dashboard_stats(&self) -> Result<DashboardStats, SyncError>;

    async fn providers(&self) -> Result<Vec<Provider>, SyncError>;

    async fn delete_provider(&self, id: ProviderId) -> Result<(), SyncError>;

    /// Delete every provider together with its reports.
    async fn clear_providers(&self) -> Result<(), SyncError>;

    async fn logs(&self) -> Result<Vec<AgentLog>, SyncError>;

    async fn clear_logs(&self) -> Result<(), SyncError>;

    async fn validation_report(&self, id: ValidationId) -> Result<ValidationReport, SyncError>;

    async fn discrepancies(&self, id: ValidationId) -> Result<Vec<Discrepancy>, SyncError>;

    /// Recent log entries shown alongside a report.
    async fn validation_logs(&self, id: ValidationId) -> Result<Vec<AgentLog>, SyncError>;

    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt, SyncError>;

    async fn active_job(&self) -> Result<JobStatus, SyncError>;

    async fn cancel_job(&self, id: JobId) -> Result<CancelAck, SyncError>;

    async fn config(&self) -> Result<Configuration, SyncError>;

    /// Store a configuration and return the server's canonical copy.
    async fn update_config(&self, config: &Configuration) -> Result<Configuration, SyncError>;

    async fn system_status(&self) -> Result<SystemStatus, SyncError>;

    async fn update_secrets(&self, secrets: &SecretsUpdate) -> Result<SecretsAck, SyncError>;
}
