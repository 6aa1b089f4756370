//! In-memory [`ConsoleApi`] used by this crate's tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{watch, Notify};
use verigate_core::{
    AgentLog, CancelAck, Configuration, DashboardStats, Discrepancy, Job, JobId, JobStatus,
    LogLevel, Provider, ProviderId, ProviderStatus, SecretsAck, SecretsUpdate, ServiceState,
    SystemStatus, UploadReceipt, ValidationId, ValidationReport,
};

use crate::api::{ConsoleApi, UploadFile};
use crate::error::SyncError;

#[derive(Default)]
struct FakeState {
    providers: Vec<Provider>,
    logs: Vec<AgentLog>,
    job: JobStatus,
    next_job: JobId,
    config: Configuration,
    calls: HashMap<&'static str, usize>,
    fail_next: HashSet<&'static str>,
    /// Threshold the backend applies when normalising a saved configuration.
    clamp_threshold: Option<f64>,
    cancel_refusal: Option<String>,
}

pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
    gate: watch::Sender<bool>,
    pending: AtomicUsize,
    pending_changed: Notify,
}

impl FakeApi {
    pub(crate) fn with_providers(n: usize) -> Self {
        let providers = (1..=n as i64)
            .map(|id| {
                let score = if id % 2 == 0 { 65.0 } else { 90.0 };
                Provider {
                    id,
                    full_name: format!("Provider {id}"),
                    npi: format!("{:010}", 1_000 + id),
                    specialty: Some("Cardiology".into()),
                    address: Some(format!("{id} Main St")),
                    license: Some(format!("MD-{id}")),
                    status: if score >= 78.0 {
                        ProviderStatus::Validated
                    } else {
                        ProviderStatus::Flagged
                    },
                    confidence_score: score,
                    last_updated: "2025-03-01T09:30:00".into(),
                    latest_validation_id: Some(id * 100),
                }
            })
            .collect();
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(FakeState {
                providers,
                next_job: 1,
                ..FakeState::default()
            }),
            gate,
            pending: AtomicUsize::new(0),
            pending_changed: Notify::new(),
        }
    }

    pub(crate) fn calls(&self, name: &str) -> usize {
        self.state.lock().calls.get(name).copied().unwrap_or(0)
    }

    /// Fail the next request to `name` with a 503.
    pub(crate) fn fail_next(&self, name: &'static str) {
        self.state.lock().fail_next.insert(name);
    }

    pub(crate) fn clamp_saved_threshold(&self, max: f64) {
        self.state.lock().clamp_threshold = Some(max);
    }

    /// Answer the next cancel with `success: false` and this error.
    pub(crate) fn refuse_next_cancel(&self, error: &str) {
        self.state.lock().cancel_refusal = Some(error.to_string());
    }

    /// Park every request until [`Self::release_requests`].
    pub(crate) fn hold_requests(&self) {
        self.gate.send_replace(false);
    }

    pub(crate) fn release_requests(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) async fn wait_for_pending(&self, n: usize) {
        loop {
            let notified = self.pending_changed.notified();
            if self.pending.load(Ordering::SeqCst) >= n {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn start_job(&self, filename: &str, total: u32) -> JobId {
        let mut s = self.state.lock();
        let job_id = s.next_job;
        s.next_job += 1;
        s.job = JobStatus::Active(Job {
            job_id,
            active: true,
            filename: filename.to_string(),
            total_providers: total,
            processed_providers: 0,
            current_step: "extraction".into(),
        });
        job_id
    }

    pub(crate) fn advance_job(&self, processed: u32) {
        if let JobStatus::Active(job) = &mut self.state.lock().job {
            job.processed_providers = processed;
        }
    }

    pub(crate) fn finish_job(&self) {
        self.state.lock().job = JobStatus::None;
    }

    pub(crate) fn log_count(&self) -> usize {
        self.state.lock().logs.len()
    }

    async fn enter(&self, name: &'static str) -> Result<(), SyncError> {
        *self.state.lock().calls.entry(name).or_default() += 1;

        let mut gate = self.gate.subscribe();
        let open = *gate.borrow();
        if !open {
            self.pending.fetch_add(1, Ordering::SeqCst);
            self.pending_changed.notify_waiters();
            let _ = gate.wait_for(|open| *open).await;
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }

        if self.state.lock().fail_next.remove(name) {
            return Err(SyncError::Server {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        Ok(())
    }

    fn push_log(s: &mut FakeState, level: LogLevel, message: String) {
        let id = s.logs.len() as i64 + 1;
        s.logs.push(AgentLog {
            id,
            agent_name: "System".into(),
            message,
            level,
            timestamp: "2025-03-01T09:31:00".into(),
        });
    }
}

#[async_trait]
impl ConsoleApi for FakeApi {
    async fn dashboard_stats(&self) -> Result<DashboardStats, SyncError> {
        self.enter("stats").await?;
        let s = self.state.lock();
        let validated = s
            .providers
            .iter()
            .filter(|p| p.status == ProviderStatus::Validated)
            .count() as u64;
        Ok(DashboardStats {
            total_profiles: s.providers.len() as u64,
            validated,
            action_required: s.providers.len() as u64 - validated,
            avg_confidence: 0.0,
        })
    }

    async fn providers(&self) -> Result<Vec<Provider>, SyncError> {
        self.enter("providers").await?;
        Ok(self.state.lock().providers.clone())
    }

    async fn delete_provider(&self, id: ProviderId) -> Result<(), SyncError> {
        self.enter("delete_provider").await?;
        self.state.lock().providers.retain(|p| p.id != id);
        Ok(())
    }

    async fn clear_providers(&self) -> Result<(), SyncError> {
        self.enter("clear_providers").await?;
        self.state.lock().providers.clear();
        Ok(())
    }

    async fn logs(&self) -> Result<Vec<AgentLog>, SyncError> {
        self.enter("logs").await?;
        Ok(self.state.lock().logs.clone())
    }

    async fn clear_logs(&self) -> Result<(), SyncError> {
        self.enter("clear_logs").await?;
        self.state.lock().logs.clear();
        Ok(())
    }

    async fn validation_report(&self, id: ValidationId) -> Result<ValidationReport, SyncError> {
        self.enter("report").await?;
        let s = self.state.lock();
        let provider = s
            .providers
            .iter()
            .find(|p| p.latest_validation_id == Some(id))
            .ok_or_else(|| SyncError::Server {
                status: 404,
                body: "null".into(),
            })?;
        Ok(serde_json::from_value(json!({
            "id": id,
            "provider_id": provider.id,
            "status": provider.status,
            "confidence_score": provider.confidence_score,
            "discrepancies": [{"field": "license", "penalty": 15, "extracted": "A", "registry": "B"}],
            "extracted_data": {"full_name": provider.full_name, "npi": provider.npi},
            "registry_data": {"provider_name": provider.full_name, "npi_number": provider.npi},
            "timestamp": "2025-03-01T09:30:00"
        }))?)
    }

    async fn discrepancies(&self, id: ValidationId) -> Result<Vec<Discrepancy>, SyncError> {
        self.enter("discrepancies").await?;
        let _ = id;
        Ok(verigate_core::discrepancy::parse_list(json!([
            {"field": "license", "penalty": 15, "extracted": "A", "registry": "B"},
            {"reason": "mismatch"},
            "plain text",
            null
        ])))
    }

    async fn validation_logs(&self, _id: ValidationId) -> Result<Vec<AgentLog>, SyncError> {
        self.enter("validation_logs").await?;
        Ok(self.state.lock().logs.clone())
    }

    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt, SyncError> {
        self.enter("upload").await?;
        let job_id = self.start_job(&file.filename, 4);
        let mut s = self.state.lock();
        Self::push_log(&mut s, LogLevel::Info, format!("Received {}", file.filename));
        Ok(UploadReceipt {
            message: "validation workflow started".into(),
            filename: Some(file.filename),
            job_id: Some(job_id),
        })
    }

    async fn active_job(&self) -> Result<JobStatus, SyncError> {
        self.enter("active_job").await?;
        Ok(self.state.lock().job.clone())
    }

    async fn cancel_job(&self, id: JobId) -> Result<CancelAck, SyncError> {
        self.enter("cancel_job").await?;
        let mut s = self.state.lock();
        if let Some(error) = s.cancel_refusal.take() {
            return Ok(CancelAck {
                success: false,
                message: None,
                error: Some(error),
            });
        }
        let running = s.job.job().is_some_and(|j| j.job_id == id);
        if !running {
            return Ok(CancelAck {
                success: false,
                message: None,
                error: Some("Job not found".into()),
            });
        }
        s.job = JobStatus::None;
        Self::push_log(&mut s, LogLevel::Warn, format!("Validation cancelled for job {id}"));
        Ok(CancelAck {
            success: true,
            message: Some(format!("Job {id} cancelled")),
            error: None,
        })
    }

    async fn config(&self) -> Result<Configuration, SyncError> {
        self.enter("config").await?;
        Ok(self.state.lock().config.clone())
    }

    async fn update_config(&self, config: &Configuration) -> Result<Configuration, SyncError> {
        self.enter("update_config").await?;
        let mut s = self.state.lock();
        let mut stored = config.clone();
        if let Some(max) = s.clamp_threshold {
            stored.confidence_threshold = stored.confidence_threshold.min(max);
        }
        s.config = stored.clone();
        Ok(stored)
    }

    async fn system_status(&self) -> Result<SystemStatus, SyncError> {
        self.enter("system_status").await?;
        Ok(SystemStatus {
            gemini: ServiceState::Connected,
            gemini_message: None,
            database: ServiceState::Connected,
            database_message: None,
            masked_gemini_key: Some("AIza...9xYz".into()),
            masked_db_url: Some("configured (hidden)".into()),
        })
    }

    async fn update_secrets(&self, _secrets: &SecretsUpdate) -> Result<SecretsAck, SyncError> {
        self.enter("update_secrets").await?;
        Ok(SecretsAck {
            message: "Secrets updated.".into(),
        })
    }
}
