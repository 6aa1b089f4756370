pub mod classify;
pub mod discrepancy;
pub mod error;
pub mod model;
pub mod reconcile;

pub use classify::{classify, derive_status, threshold_percent, ClassCounts, StatsDrift};
pub use discrepancy::{Discrepancy, RenderedDiscrepancy};
pub use error::ModelError;
pub use model::{
    AgentLog, CancelAck, Configuration, DashboardStats, ExtractionMode, Job, JobId, JobStatus,
    LogLevel, Provider, ProviderId, ProviderStatus, SecretsAck, SecretsUpdate, ServiceState,
    SystemStatus, UploadReceipt, ValidationId, ValidationReport,
};
pub use reconcile::{reconcile, reconcile_report, FieldComparison, NOT_AVAILABLE};
