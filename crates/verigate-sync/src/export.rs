//! Writing validation reports to disk.

use std::path::{Path, PathBuf};

use tracing::info;
use verigate_core::{ValidationId, ValidationReport};

use crate::error::SyncError;

pub fn export_file_name(id: ValidationId) -> String {
    format!("validation_report_{id}.json")
}

/// Write `report` as pretty-printed JSON into `dir` and return the file path.
///
/// Discrepancy objects are written back in the shape the backend sent them.
pub async fn export_report(report: &ValidationReport, dir: &Path) -> Result<PathBuf, SyncError> {
    let path = dir.join(export_file_name(report.id));
    let json = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(&path, json).await?;
    info!(path = %path.display(), validation_id = report.id, "exported validation report");
    Ok(path)
}
