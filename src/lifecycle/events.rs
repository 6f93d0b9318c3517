use super::payload::StepKind;
use crate::shared::ids::{ProcessId, SessionId};
use crate::store::{ActionResult, ActionSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Started,
    Executing,
    Completed,
    Failed,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::Executing => "Executing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    pub message: String,
    pub trace: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub event_time: DateTime<Utc>,
    pub session_id: SessionId,
    pub process_id: Option<ProcessId>,
    pub step: StepKind,
    pub state: LifecycleState,
    pub description: String,
    pub summary: ActionSummary,
    pub result: Option<ActionResult>,
    pub messages: Vec<String>,
    pub result_files: Vec<String>,
    pub failure: Option<FailureDetail>,
}

impl LifecycleEvent {
    pub fn new(
        session_id: SessionId,
        process_id: Option<ProcessId>,
        step: StepKind,
        state: LifecycleState,
        description: impl Into<String>,
        summary: ActionSummary,
    ) -> Self {
        Self {
            event_time: crate::shared::time::now_utc(),
            session_id,
            process_id,
            step,
            state,
            description: description.into(),
            summary,
            result: None,
            messages: Vec::new(),
            result_files: Vec::new(),
            failure: None,
        }
    }

    /// Text shown to viewers for this transition.
    pub fn notice_message(&self) -> String {
        match (&self.failure, self.state) {
            (Some(failure), _) => failure.message.clone(),
            (None, LifecycleState::Executing) => self
                .messages
                .last()
                .cloned()
                .unwrap_or_else(|| self.description.clone()),
            (None, _) => self.description.clone(),
        }
    }
}
