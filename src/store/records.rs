use crate::shared::ids::{MessageId, ProcessId, SessionId, StatusId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result code stored on a process action. A missing code means the step is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionResult {
    Executing,
    Success,
    Error,
    Failed,
    #[serde(other)]
    Unrecognized,
}

impl ActionResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executing => "Executing",
            Self::Success => "Success",
            Self::Error => "Error",
            Self::Failed => "Failed",
            Self::Unrecognized => "Unrecognized",
        }
    }

    /// Reads a stored code; empty text is treated as unset.
    pub fn from_db(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => None,
            "Executing" => Some(Self::Executing),
            "Success" => Some(Self::Success),
            "Error" => Some(Self::Error),
            "Failed" => Some(Self::Failed),
            _ => Some(Self::Unrecognized),
        }
    }
}

impl std::fmt::Display for ActionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateName {
    Started,
    Completed,
    Failed,
}

impl StateName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "Started" => Ok(Self::Started),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            other => Err(format!("unknown state name `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanStatus {
    Pending,
    Scheduled,
    Executing,
    Done,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Scheduled => "Scheduled",
            Self::Executing => "Executing",
            Self::Done => "Done",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "Pending" => Ok(Self::Pending),
            "Scheduled" => Ok(Self::Scheduled),
            "Executing" => Ok(Self::Executing),
            "Done" => Ok(Self::Done),
            other => Err(format!("unknown plan status `{other}`")),
        }
    }
}

/// Processed/accepted/rejected counters plus the action's run window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub processed: u64,
    pub accepted: u64,
    pub rejected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl ActionSummary {
    pub fn accept(&mut self) {
        self.accepted += 1;
        self.processed = self.accepted + self.rejected;
    }

    pub fn reject(&mut self) {
        self.rejected += 1;
        self.processed = self.accepted + self.rejected;
    }

    pub fn with_counts(accepted: u64, rejected: u64) -> Self {
        Self {
            processed: accepted + rejected,
            accepted,
            rejected,
            start: None,
            end: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessAction {
    pub process_id: ProcessId,
    pub session_id: SessionId,
    pub name: String,
    pub description: String,
    pub creation: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_status: Option<ActionResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics_summary: Option<ActionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStateEvent {
    pub status_id: StatusId,
    pub process_id: ProcessId,
    pub name: StateName,
    pub creation: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMessage {
    pub message_id: MessageId,
    pub status_id: StatusId,
    pub description: String,
    pub creation: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlanEntry {
    pub session_id: SessionId,
    pub sequence: u32,
    pub action_name: String,
    pub status: PlanStatus,
    pub start_on_error: bool,
}

pub fn join_result_files(files: &[String]) -> String {
    files.join(";")
}

pub fn split_result_files(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
