use crate::store::{ActionResult, ExecutionPlanEntry, PlanStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Single verdict for a session's run, derived on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerStatus {
    New,
    Running,
    Success,
    Error,
    Failed,
    /// No recognised result code; the run is unresolved.
    None,
}

impl ContainerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Running => "Running",
            Self::Success => "Success",
            Self::Error => "Error",
            Self::Failed => "Failed",
            Self::None => "None",
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combines a session's plan with the latest result code of each recorded action.
///
/// `results` holds one entry per action; `None` is an unset code, which counts as
/// still running. Priority is running > failed > error > success, and a pending plan
/// entry flagged `start_on_error` keeps any non-failed run open.
pub fn aggregate_status(
    plan: &[ExecutionPlanEntry],
    results: &[Option<ActionResult>],
) -> ContainerStatus {
    if results.is_empty() && plan.iter().all(|entry| entry.status == PlanStatus::Pending) {
        return ContainerStatus::New;
    }

    let distinct = results.iter().copied().collect::<HashSet<_>>();
    let status = if distinct.contains(&None) || distinct.contains(&Some(ActionResult::Executing))
    {
        ContainerStatus::Running
    } else if distinct.contains(&Some(ActionResult::Failed)) {
        ContainerStatus::Failed
    } else if distinct.contains(&Some(ActionResult::Error)) {
        ContainerStatus::Error
    } else if distinct.contains(&Some(ActionResult::Success)) {
        ContainerStatus::Success
    } else {
        ContainerStatus::None
    };

    let keeps_run_open = plan
        .iter()
        .any(|entry| entry.status == PlanStatus::Pending && entry.start_on_error);
    if status != ContainerStatus::Failed && keeps_run_open {
        return ContainerStatus::Running;
    }
    status
}
