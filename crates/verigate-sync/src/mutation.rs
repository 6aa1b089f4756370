//! Write operations and the cache effects they carry.
//!
//! Each mutation has one fixed effect on the cache, applied exactly once and
//! only after the backend confirmed success. A failed mutation is returned to
//! the caller with every cache entry left as it was.

use std::fmt;

use tracing::{info, warn};
use verigate_core::{
    Configuration, JobId, ProviderId, SecretsAck, SecretsUpdate, UploadReceipt,
};

use crate::api::UploadFile;
use crate::cache::{Resource, ResourceCache, ResourceKey};
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Upload,
    DeleteProvider,
    ClearRegistry,
    ClearLogs,
    CancelJob,
    SaveConfig,
    UpdateSecrets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEffect {
    Invalidate(&'static [ResourceKey]),
    /// Store the server's answer under this key.
    ReplaceWithEcho(ResourceKey),
}

impl Mutation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::DeleteProvider => "delete_provider",
            Self::ClearRegistry => "clear_registry",
            Self::ClearLogs => "clear_logs",
            Self::CancelJob => "cancel_job",
            Self::SaveConfig => "save_config",
            Self::UpdateSecrets => "update_secrets",
        }
    }

    pub fn effect(&self) -> CacheEffect {
        use ResourceKey::*;
        match self {
            Self::Upload => CacheEffect::Invalidate(&[Stats, Providers, Logs, ActiveJob]),
            Self::DeleteProvider | Self::ClearRegistry => {
                CacheEffect::Invalidate(&[Stats, Providers])
            }
            Self::ClearLogs => CacheEffect::Invalidate(&[Logs]),
            Self::CancelJob => CacheEffect::Invalidate(&[ActiveJob, Logs]),
            Self::SaveConfig => CacheEffect::ReplaceWithEcho(Config),
            Self::UpdateSecrets => CacheEffect::Invalidate(&[SystemStatus]),
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a cancel request. Both variants are successes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The job had already completed or was unknown to the backend.
    AlreadyFinished { reason: Option<String> },
}

fn is_not_found(error: &str) -> bool {
    error.to_ascii_lowercase().contains("not found")
}

#[derive(Clone)]
pub struct MutationCoordinator {
    cache: ResourceCache,
}

impl MutationCoordinator {
    pub fn new(cache: ResourceCache) -> Self {
        Self { cache }
    }

    fn invalidate(&self, mutation: Mutation) {
        if let CacheEffect::Invalidate(keys) = mutation.effect() {
            self.cache.invalidate(keys);
        }
    }

    pub async fn upload(&self, file: UploadFile) -> Result<UploadReceipt, SyncError> {
        let receipt = self.cache.api().upload(file).await?;
        self.invalidate(Mutation::Upload);
        Ok(receipt)
    }

    pub async fn delete_provider(&self, id: ProviderId) -> Result<(), SyncError> {
        self.cache.api().delete_provider(id).await?;
        info!(provider_id = id, "provider deleted");
        self.invalidate(Mutation::DeleteProvider);
        Ok(())
    }

    /// Delete every provider and every report.
    pub async fn clear_registry(&self) -> Result<(), SyncError> {
        self.cache.api().clear_providers().await?;
        info!("registry cleared");
        self.invalidate(Mutation::ClearRegistry);
        Ok(())
    }

    pub async fn clear_logs(&self) -> Result<(), SyncError> {
        self.cache.api().clear_logs().await?;
        self.invalidate(Mutation::ClearLogs);
        Ok(())
    }

    /// Ask the backend to stop job `id`.
    ///
    /// Cancelling a job that already finished is not an error: the backend
    /// answers `success: false` with a "not found" error (or a 404) and the
    /// outcome is [`CancelOutcome::AlreadyFinished`]. The job and log
    /// entries are invalidated either way so the poller observes the final
    /// state. Any other refusal is a [`SyncError::Rejected`] and leaves the
    /// cache alone.
    pub async fn cancel_job(&self, id: JobId) -> Result<CancelOutcome, SyncError> {
        let outcome = match self.cache.api().cancel_job(id).await {
            Ok(ack) if ack.success => {
                info!(job_id = id, "job cancelled");
                CancelOutcome::Cancelled
            }
            Ok(ack) if ack.error.as_deref().is_some_and(is_not_found) => {
                warn!(job_id = id, reason = ?ack.error, "cancel target already finished");
                CancelOutcome::AlreadyFinished { reason: ack.error }
            }
            Ok(ack) => {
                let reason = ack
                    .error
                    .or(ack.message)
                    .unwrap_or_else(|| "no reason given".to_string());
                return Err(SyncError::Rejected {
                    operation: Mutation::CancelJob.as_str(),
                    reason,
                });
            }
            Err(e) if e.status() == Some(404) => {
                warn!(job_id = id, status = ?e.status(), "cancel target already finished");
                CancelOutcome::AlreadyFinished {
                    reason: Some(e.to_string()),
                }
            }
            Err(e) => return Err(e),
        };
        self.invalidate(Mutation::CancelJob);
        Ok(outcome)
    }

    /// Validate and store `config`, then cache the server's canonical copy.
    pub async fn save_config(&self, config: &Configuration) -> Result<Configuration, SyncError> {
        config.validate()?;
        let echo = self.cache.api().update_config(config).await?;
        if echo != *config {
            info!(
                sent = config.confidence_threshold,
                stored = echo.confidence_threshold,
                "backend normalised configuration"
            );
        }
        if let CacheEffect::ReplaceWithEcho(key) = Mutation::SaveConfig.effect() {
            self.cache.set(key, Resource::Config(echo.clone()));
        }
        Ok(echo)
    }

    pub async fn update_secrets(&self, secrets: &SecretsUpdate) -> Result<SecretsAck, SyncError> {
        let ack = self.cache.api().update_secrets(secrets).await?;
        info!("backend secrets updated");
        self.invalidate(Mutation::UpdateSecrets);
        Ok(ack)
    }
}
