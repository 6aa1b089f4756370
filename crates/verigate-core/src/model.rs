//! Wire types exchanged with the validation backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::discrepancy::{self, Discrepancy};
use crate::error::ModelError;

pub type ProviderId = i64;
pub type ValidationId = i64;
pub type JobId = i64;

/// Validation outcome recorded against a provider or a report.
///
/// Decoding is case-insensitive. A status the console does not recognise
/// decodes as `Pending`, so one odd row never rejects a whole list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProviderStatus {
    Validated,
    Flagged,
    /// Assigned by the backend before the first validation run completes.
    Pending,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "Validated",
            Self::Flagged => "Flagged",
            Self::Pending => "Pending",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "validated" => Ok(Self::Validated),
            "flagged" => Ok(Self::Flagged),
            "pending" => Ok(Self::Pending),
            _ => Err(ModelError::UnknownStatus(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for ProviderStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(Self::Pending);
        };
        Ok(raw.parse().unwrap_or_else(|_| {
            warn!(status = %raw, "unrecognised provider status; treating as pending");
            Self::Pending
        }))
    }
}

/// A provider identity record as held in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub full_name: String,
    pub npi: String,
    pub specialty: Option<String>,
    pub address: Option<String>,
    pub license: Option<String>,
    pub status: ProviderStatus,
    /// Score in `[0, 100]`.
    pub confidence_score: f64,
    /// ISO 8601 timestamp string.
    pub last_updated: String,
    #[serde(default)]
    pub latest_validation_id: Option<ValidationId>,
}

impl Provider {
    /// Review and download are only possible once a validation run exists.
    pub fn has_report(&self) -> bool {
        self.latest_validation_id.is_some()
    }
}

/// Immutable snapshot produced by one validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub id: ValidationId,
    pub provider_id: ProviderId,
    pub status: ProviderStatus,
    pub confidence_score: f64,
    #[serde(default, deserialize_with = "discrepancy::deserialize_list")]
    pub discrepancies: Vec<Discrepancy>,
    #[serde(default)]
    pub extracted_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub registry_data: Option<Map<String, Value>>,
    /// ISO 8601 timestamp string.
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
        }
    }
}

/// One entry of the agent execution stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLog {
    pub id: i64,
    pub agent_name: String,
    pub message: String,
    pub level: LogLevel,
    /// ISO 8601 timestamp string.
    pub timestamp: String,
}

/// A running batch-validation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_id: JobId,
    pub active: bool,
    pub filename: String,
    pub total_providers: u32,
    pub processed_providers: u32,
    pub current_step: String,
}

impl Job {
    pub fn percent(&self) -> u8 {
        progress_percent(self.processed_providers, self.total_providers)
    }
}

/// Progress as a whole percentage, clamped to `[0, 100]` and `0` when nothing
/// is known about the total yet.
pub fn progress_percent(processed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (f64::from(processed) / f64::from(total) * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Answer of `GET /jobs/active`.
///
/// The backend signals "nothing running" with `{"active": false}`; a bare
/// string or null sentinel is accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    None,
    Active(Job),
}

impl JobStatus {
    pub fn job(&self) -> Option<&Job> {
        match self {
            Self::None => None,
            Self::Active(job) => Some(job),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

#[derive(Deserialize)]
struct JobWire {
    #[serde(default)]
    active: bool,
    job_id: Option<JobId>,
    filename: Option<String>,
    total_providers: Option<u32>,
    processed_providers: Option<u32>,
    current_step: Option<String>,
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if !value.is_object() {
            return Ok(JobStatus::None);
        }
        let wire: JobWire = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
        let Some(job_id) = wire.job_id.filter(|_| wire.active) else {
            return Ok(JobStatus::None);
        };
        Ok(JobStatus::Active(Job {
            job_id,
            active: true,
            filename: wire.filename.unwrap_or_default(),
            total_providers: wire.total_providers.unwrap_or(0),
            processed_providers: wire.processed_providers.unwrap_or(0),
            current_step: wire.current_step.unwrap_or_default(),
        }))
    }
}

/// Aggregate counters shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_profiles: u64,
    pub validated: u64,
    pub action_required: u64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    #[default]
    Batch,
    Single,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Single => "single",
        }
    }
}

impl FromStr for ExtractionMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(Self::Batch),
            "single" => Ok(Self::Single),
            _ => Err(ModelError::UnknownExtractionMode(s.to_string())),
        }
    }
}

/// Shared pipeline configuration. Versionless; the last writer wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Fraction in `[0, 1]`.
    pub confidence_threshold: f64,
    pub auto_approve_high_confidence: bool,
    pub fuzzy_matching: bool,
    pub live_registry_enrichment: bool,
    #[serde(default)]
    pub extraction_mode: ExtractionMode,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.78,
            auto_approve_high_confidence: false,
            fuzzy_matching: true,
            live_registry_enrichment: true,
            extraction_mode: ExtractionMode::Batch,
        }
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ModelError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ModelError::ThresholdOutOfRange(self.confidence_threshold));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Connected,
    Error,
    #[serde(other)]
    Unknown,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// Backend health as reported by `GET /system/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub gemini: ServiceState,
    #[serde(default)]
    pub gemini_message: Option<String>,
    pub database: ServiceState,
    #[serde(default)]
    pub database_message: Option<String>,
    #[serde(default)]
    pub masked_gemini_key: Option<String>,
    #[serde(default)]
    pub masked_db_url: Option<String>,
}

/// Body of `POST /system/secrets`.
#[derive(Clone, Serialize)]
pub struct SecretsUpdate {
    pub gemini_api_key: String,
    pub database_url: String,
}

impl fmt::Debug for SecretsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsUpdate")
            .field("gemini_api_key", &"<redacted>")
            .field("database_url", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecretsAck {
    pub message: String,
}

/// Answer of `POST /validate`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub job_id: Option<JobId>,
}

/// Answer of `POST /jobs/{id}/cancel`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CancelAck {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_without_validation_has_no_report() {
        let json = r#"{
            "id": 7,
            "full_name": "Dr. Jane Roe",
            "npi": "1234567890",
            "specialty": "Cardiology",
            "address": null,
            "license": "MD-1",
            "status": "Pending",
            "confidence_score": 0.0,
            "last_updated": "2025-01-01T10:00:00"
        }"#;
        let provider: Provider = serde_json::from_str(json).unwrap();
        assert_eq!(provider.status, ProviderStatus::Pending);
        assert!(provider.address.is_none());
        assert!(!provider.has_report());
    }

    #[test]
    fn odd_statuses_do_not_reject_the_list() {
        let row = |id: i64, status: &str| {
            format!(
                r#"{{"id": {id}, "full_name": "Dr. {id}", "npi": "{id}", "specialty": null,
                    "address": null, "license": null, "status": {status},
                    "confidence_score": 80.0, "last_updated": "2025-01-01T10:00:00"}}"#
            )
        };
        let json = format!(
            "[{}, {}, {}, {}]",
            row(1, r#""Validated""#),
            row(2, r#""validated""#),
            row(3, r#""Needs Review""#),
            row(4, "null"),
        );
        let providers: Vec<Provider> = serde_json::from_str(&json).unwrap();
        let statuses: Vec<ProviderStatus> = providers.iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            [
                ProviderStatus::Validated,
                ProviderStatus::Validated,
                ProviderStatus::Pending,
                ProviderStatus::Pending,
            ]
        );
    }

    #[test]
    fn inactive_job_decodes_to_none() {
        let status: JobStatus = serde_json::from_str(r#"{"active": false}"#).unwrap();
        assert_eq!(status, JobStatus::None);

        let finished: JobStatus = serde_json::from_str(
            r#"{"active": false, "job_id": 3, "filename": "a.csv", "total_providers": 4, "processed_providers": 4}"#,
        )
        .unwrap();
        assert_eq!(finished, JobStatus::None);
    }

    #[test]
    fn sentinel_string_decodes_to_none() {
        let status: JobStatus = serde_json::from_str(r#""none""#).unwrap();
        assert!(!status.is_active());
        let null: JobStatus = serde_json::from_str("null").unwrap();
        assert!(!null.is_active());
    }

    #[test]
    fn active_job_decodes_progress() {
        let json = r#"{
            "active": true,
            "job_id": 12,
            "filename": "batch.csv",
            "status": "running",
            "current_step": "enrichment",
            "total_providers": 8,
            "processed_providers": 3
        }"#;
        let status: JobStatus = serde_json::from_str(json).unwrap();
        let job = status.job().expect("active job");
        assert_eq!(job.job_id, 12);
        assert_eq!(job.current_step, "enrichment");
        assert_eq!(job.percent(), 38);
    }

    #[test]
    fn percent_is_zero_without_total() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(17, 0), 0);
    }

    #[test]
    fn percent_stays_in_range() {
        assert_eq!(progress_percent(0, 3), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(3, 3), 100);
        // Processed can briefly overshoot while the backend recounts.
        assert_eq!(progress_percent(9, 3), 100);
        for total in 0..20u32 {
            for processed in 0..40u32 {
                assert!(progress_percent(processed, total) <= 100);
            }
        }
    }

    #[test]
    fn configuration_validation() {
        assert!(Configuration::default().validate().is_ok());
        let mut config = Configuration::default();
        config.confidence_threshold = 1.2;
        assert_eq!(
            config.validate(),
            Err(ModelError::ThresholdOutOfRange(1.2))
        );
        config.confidence_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn configuration_ignores_server_id() {
        let json = r#"{
            "id": 1,
            "confidence_threshold": 0.85,
            "auto_approve_high_confidence": true,
            "fuzzy_matching": false,
            "live_registry_enrichment": true,
            "extraction_mode": "single"
        }"#;
        let config: Configuration = serde_json::from_str(json).unwrap();
        assert_eq!(config.extraction_mode, ExtractionMode::Single);
        assert!(config.auto_approve_high_confidence);
    }

    #[test]
    fn unknown_service_state_tolerated() {
        let json = r#"{"gemini": "degraded", "database": "connected"}"#;
        let status: SystemStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.gemini, ServiceState::Unknown);
        assert_eq!(status.database, ServiceState::Connected);
    }

    #[test]
    fn secrets_debug_is_redacted() {
        let secrets = SecretsUpdate {
            gemini_api_key: "AIza-secret".into(),
            database_url: "postgres://user:pw@host/db".into(),
        };
        let debug = format!("{secrets:?}");
        assert!(!debug.contains("AIza-secret"));
        assert!(!debug.contains("pw@host"));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("flagged".parse::<ProviderStatus>(), Ok(ProviderStatus::Flagged));
        assert!("approved".parse::<ProviderStatus>().is_err());
    }

    #[test]
    fn log_levels_are_uppercase_on_the_wire() {
        let log: AgentLog = serde_json::from_str(
            r#"{"id": 1, "agent_name": "QA", "message": "done", "level": "SUCCESS", "timestamp": "2025-01-01T00:00:00"}"#,
        )
        .unwrap();
        assert_eq!(log.level, LogLevel::Success);
    }
}
