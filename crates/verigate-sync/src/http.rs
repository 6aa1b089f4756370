//! HTTP client for the validation backend's JSON API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use verigate_core::discrepancy::parse_list;
use verigate_core::{
    AgentLog, CancelAck, Configuration, DashboardStats, Discrepancy, JobId, JobStatus, Provider,
    ProviderId, SecretsAck, SecretsUpdate, SystemStatus, UploadReceipt, ValidationId,
    ValidationReport,
};

use crate::api::{ConsoleApi, UploadFile};
use crate::error::SyncError;

/// reqwest-backed [`ConsoleApi`].
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// Create a client for the given API base URL.
    ///
    /// `base_url` should be like `http://localhost:8001/api`; a trailing slash
    /// is dropped. Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let resp = ensure_success(self.client.get(&url).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SyncError> {
        ensure_success(request.send().await?).await
    }
}

async fn ensure_success(resp: Response) -> Result<Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SyncError::Server {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ConsoleApi for HttpApi {
    async fn dashboard_stats(&self) -> Result<DashboardStats, SyncError> {
        self.get_json("/dashboard/stats").await
    }

    async fn providers(&self) -> Result<Vec<Provider>, SyncError> {
        let providers: Vec<Provider> = self.get_json("/providers").await?;
        debug!(count = providers.len(), "fetched providers");
        Ok(providers)
    }

    async fn delete_provider(&self, id: ProviderId) -> Result<(), SyncError> {
        let url = self.url(&format!("/providers/{id}"));
        info!(url = %url, "deleting provider");
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn clear_providers(&self) -> Result<(), SyncError> {
        let url = self.url("/providers");
        info!(url = %url, "clearing registry");
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn logs(&self) -> Result<Vec<AgentLog>, SyncError> {
        self.get_json("/logs").await
    }

    async fn clear_logs(&self) -> Result<(), SyncError> {
        let url = self.url("/logs");
        info!(url = %url, "clearing agent logs");
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn validation_report(&self, id: ValidationId) -> Result<ValidationReport, SyncError> {
        self.get_json(&format!("/validation/{id}")).await
    }

    async fn discrepancies(&self, id: ValidationId) -> Result<Vec<Discrepancy>, SyncError> {
        let raw: Value = self.get_json(&format!("/validation/{id}/discrepancies")).await?;
        Ok(parse_list(raw))
    }

    async fn validation_logs(&self, id: ValidationId) -> Result<Vec<AgentLog>, SyncError> {
        self.get_json(&format!("/agent-logs/{id}")).await
    }

    async fn upload(&self, file: UploadFile) -> Result<UploadReceipt, SyncError> {
        let url = self.url("/validate");
        info!(url = %url, filename = %file.filename, bytes = file.bytes.len(), "uploading document");
        let part = Part::bytes(file.bytes).file_name(file.filename);
        let form = Form::new().part("file", part);
        let resp = self.send(self.client.post(&url).multipart(form)).await?;
        let receipt: UploadReceipt = resp.json().await?;
        info!(job_id = ?receipt.job_id, "validation job started");
        Ok(receipt)
    }

    async fn active_job(&self) -> Result<JobStatus, SyncError> {
        self.get_json("/jobs/active").await
    }

    async fn cancel_job(&self, id: JobId) -> Result<CancelAck, SyncError> {
        let url = self.url(&format!("/jobs/{id}/cancel"));
        info!(url = %url, "cancelling job");
        let resp = self.send(self.client.post(&url)).await?;
        Ok(resp.json().await?)
    }

    async fn config(&self) -> Result<Configuration, SyncError> {
        self.get_json("/config").await
    }

    async fn update_config(&self, config: &Configuration) -> Result<Configuration, SyncError> {
        let url = self.url("/config");
        info!(url = %url, threshold = config.confidence_threshold, "saving configuration");
        let resp = self.send(self.client.put(&url).json(config)).await?;
        Ok(resp.json().await?)
    }

    async fn system_status(&self) -> Result<SystemStatus, SyncError> {
        self.get_json("/system/status").await
    }

    async fn update_secrets(&self, secrets: &SecretsUpdate) -> Result<SecretsAck, SyncError> {
        let url = self.url("/system/secrets");
        info!(url = %url, "updating backend secrets");
        let resp = self.send(self.client.post(&url).json(secrets)).await?;
        Ok(resp.json().await?)
    }
}
