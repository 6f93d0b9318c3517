use crate::shared::fs_atomic::atomic_write_json;
use crate::shared::time::now_utc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const AUDIT_DEGRADED_FILE_NAME: &str = "AuditDegraded.json";

/// Marker left in a session folder when audit-trail writes were lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDegraded {
    pub failures: u64,
    pub last_operation: String,
    pub last_error: String,
    pub updated_at: DateTime<Utc>,
}

pub fn audit_degraded_path(folder: &Path) -> PathBuf {
    folder.join(AUDIT_DEGRADED_FILE_NAME)
}

pub fn load_audit_degraded(folder: &Path) -> Option<AuditDegraded> {
    let raw = fs::read_to_string(audit_degraded_path(folder)).ok()?;
    serde_json::from_str(&raw).ok()
}

pub fn record_audit_failure(
    folder: &Path,
    operation: &str,
    error: &str,
) -> std::io::Result<AuditDegraded> {
    let failures = load_audit_degraded(folder).map_or(0, |marker| marker.failures);
    let marker = AuditDegraded {
        failures: failures + 1,
        last_operation: operation.to_string(),
        last_error: error.to_string(),
        updated_at: now_utc(),
    };
    atomic_write_json(&audit_degraded_path(folder), &marker)?;
    Ok(marker)
}
