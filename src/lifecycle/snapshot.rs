use super::events::{FailureDetail, LifecycleState};
use super::payload::{StepKind, StepPayload};
use super::LifecycleError;
use crate::shared::fs_atomic::atomic_write_json;
use crate::shared::ids::{ProcessId, SessionId};
use crate::store::{ActionResult, ActionSummary};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Durable record of a step's final state, one file per step type per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<ProcessId>,
    pub step: StepKind,
    pub description: String,
    pub state: LifecycleState,
    pub result: ActionResult,
    pub summary: ActionSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StepPayload>,
}

pub fn snapshot_path(folder: &Path, step: StepKind) -> PathBuf {
    folder.join(step.snapshot_file_name())
}

pub fn write_snapshot(folder: &Path, result: &StepResult) -> Result<PathBuf, LifecycleError> {
    let path = snapshot_path(folder, result.step);
    atomic_write_json(&path, result).map_err(|source| LifecycleError::ArtifactWrite {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}

pub fn read_snapshot(folder: &Path, step: StepKind) -> Result<StepResult, LifecycleError> {
    let path = snapshot_path(folder, step);
    let raw = fs::read_to_string(&path).map_err(|source| LifecycleError::ArtifactRead {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LifecycleError::ArtifactParse {
        path: path.display().to_string(),
        source,
    })
}
