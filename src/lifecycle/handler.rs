use super::controller::ExecutionController;
use super::events::{FailureDetail, LifecycleEvent, LifecycleState};
use super::payload::{StepKind, StepPayload};
use super::preconditions::{check_preconditions, metadata_census, MetadataVariant};
use super::snapshot::StepResult;
use super::step::{RunRecord, Step, StepError, StepRun};
use super::LifecycleError;
use crate::identity::{IdentityResolver, SessionLocation};
use crate::shared::ids::{ProcessId, SessionId, StatusId};
use crate::shared::time::now_utc;
use crate::store::{ActionResult, ActionSummary, ProcessAction};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// What a finished [`StepHandler::execute`] call recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub process_id: ProcessId,
    pub state: LifecycleState,
    pub result: ActionResult,
    pub summary: ActionSummary,
    pub failure: Option<FailureDetail>,
    pub snapshot_path: Option<PathBuf>,
}

enum RunOutcome {
    Finished(StepPayload),
    Failed(FailureDetail),
}

/// Wraps one [`Step`] with session binding and the Started/Completed/Failed lifecycle.
pub struct StepHandler<S: Step> {
    step: S,
    resolver: IdentityResolver,
    controller: Arc<ExecutionController>,
    location: Option<SessionLocation>,
    action_process_id: Option<ProcessId>,
    variant: Option<MetadataVariant>,
}

impl<S: Step> StepHandler<S> {
    pub fn new(step: S, resolver: IdentityResolver, controller: Arc<ExecutionController>) -> Self {
        Self {
            step,
            resolver,
            controller,
            location: None,
            action_process_id: None,
            variant: None,
        }
    }

    pub fn step(&self) -> &S {
        &self.step
    }

    /// Binds the handler to a session. The binding cannot change once made.
    pub fn set_session_guid(&mut self, raw: &str) -> Result<SessionId, StepError> {
        let location = self.resolver.validate_session(raw)?;
        if let Some(current) = &self.location {
            if current.session_id != location.session_id {
                return Err(StepError::SessionAlreadySet {
                    current: current.session_id.to_string(),
                });
            }
            return Ok(current.session_id);
        }
        let session_id = location.session_id;
        self.location = Some(location);
        Ok(session_id)
    }

    pub fn session_guid(&self) -> Option<SessionId> {
        self.location.as_ref().map(|location| location.session_id)
    }

    pub fn action_process_id(&self) -> Option<ProcessId> {
        self.action_process_id
    }

    pub fn is_topx(&self) -> bool {
        self.metadata_variant() == Some(MetadataVariant::Topx)
    }

    pub fn is_mdto(&self) -> bool {
        self.metadata_variant() == Some(MetadataVariant::Mdto)
    }

    fn metadata_variant(&self) -> Option<MetadataVariant> {
        if self.variant.is_some() {
            return self.variant;
        }
        let location = self.location.as_ref()?;
        metadata_census(&location.folder)
            .ok()?
            .variant(&location.folder)
            .ok()
    }

    /// Runs the step once. Step failures are recorded, not returned; the error path
    /// is limited to an unbound session and a snapshot that could not be written.
    pub fn execute(&mut self) -> Result<ExecutionOutcome, LifecycleError> {
        let location = self.location.clone().ok_or(StepError::SessionNotSet)?;
        let kind = self.step.kind();
        let description = self.step.description();
        let started_at = now_utc();
        let process_id = self.record_process_action(&location, &description, started_at);

        let started = LifecycleEvent::new(
            location.session_id,
            Some(process_id),
            kind,
            LifecycleState::Started,
            description.clone(),
            ActionSummary {
                start: Some(started_at),
                ..ActionSummary::default()
            },
        );
        self.controller.dispatch(&location, &started, None)?;

        let (outcome, record) = self.run_guarded(&location, process_id, kind, &description);

        let (state, result, mut summary, payload, failure) = match outcome {
            RunOutcome::Finished(payload) => {
                let (accepted, rejected) = payload.tally();
                let result = if record.errors.is_empty() && rejected == 0 {
                    ActionResult::Success
                } else {
                    ActionResult::Error
                };
                (
                    LifecycleState::Completed,
                    result,
                    ActionSummary::with_counts(accepted, rejected),
                    Some(payload),
                    None,
                )
            }
            RunOutcome::Failed(failure) => (
                LifecycleState::Failed,
                ActionResult::Failed,
                record.summary.clone(),
                None,
                Some(failure),
            ),
        };
        summary.start = Some(started_at);
        summary.end = Some(now_utc());

        let mut messages = record.errors;
        if let Some(failure) = &failure {
            messages.push(failure.message.clone());
        }

        let mut finished = LifecycleEvent::new(
            location.session_id,
            Some(process_id),
            kind,
            state,
            description.clone(),
            summary.clone(),
        );
        finished.result = Some(result);
        finished.messages = messages.clone();
        finished.result_files = record.result_files.clone();
        finished.failure = failure.clone();

        let snapshot = StepResult {
            session_id: location.session_id,
            process_id: Some(process_id),
            step: kind,
            description,
            state,
            result,
            summary: summary.clone(),
            messages,
            result_files: record.result_files,
            failure: failure.clone(),
            payload,
        };
        let snapshot_path = self
            .controller
            .dispatch(&location, &finished, Some(&snapshot))?;

        Ok(ExecutionOutcome {
            process_id,
            state,
            result,
            summary,
            failure,
            snapshot_path,
        })
    }

    fn run_guarded(
        &mut self,
        location: &SessionLocation,
        process_id: ProcessId,
        kind: StepKind,
        description: &str,
    ) -> (RunOutcome, RunRecord) {
        let empty = || RunRecord {
            summary: ActionSummary::default(),
            errors: Vec::new(),
            result_files: Vec::new(),
        };
        let variant = match check_preconditions(location) {
            Ok(variant) => variant,
            Err(err) => return (RunOutcome::Failed(failure_from_error(&err)), empty()),
        };
        self.variant = Some(variant);

        let controller = Arc::clone(&self.controller);
        let progress = |current: &ActionSummary, message: &str| {
            let mut event = LifecycleEvent::new(
                location.session_id,
                Some(process_id),
                kind,
                LifecycleState::Executing,
                description,
                current.clone(),
            );
            event.messages.push(message.to_string());
            let _ = controller.dispatch(location, &event, None);
        };

        let mut run = StepRun::new(location, variant, ActionSummary::default(), &progress);
        let step = &mut self.step;
        let caught = panic::catch_unwind(AssertUnwindSafe(|| step.run(&mut run)));
        let record = run.into_record();

        let outcome = match caught {
            Ok(Ok(payload)) if payload.kind() == kind => RunOutcome::Finished(payload),
            Ok(Ok(payload)) => RunOutcome::Failed(failure_from_error(&StepError::PayloadMismatch {
                step: kind,
                actual: payload.kind(),
            })),
            Ok(Err(err)) => RunOutcome::Failed(failure_from_error(&err)),
            Err(payload) => RunOutcome::Failed(failure_from_panic(&*payload)),
        };
        (outcome, record)
    }

    /// Records a new process action for the bound session and remembers its id.
    pub fn add_process_action(&mut self) -> Option<ProcessId> {
        let location = self.location.clone()?;
        let description = self.step.description();
        Some(self.record_process_action(&location, &description, now_utc()))
    }

    pub fn update_process_action(
        &self,
        result: ActionResult,
        summary: &ActionSummary,
        result_files: &[String],
    ) -> bool {
        let Some((location, process_id)) = self.bound() else {
            return false;
        };
        self.controller
            .update_process_action(location, process_id, result, summary, result_files);
        true
    }

    fn record_process_action(
        &mut self,
        location: &SessionLocation,
        description: &str,
        creation: chrono::DateTime<chrono::Utc>,
    ) -> ProcessId {
        let action = ProcessAction {
            process_id: ProcessId::generate(),
            session_id: location.session_id,
            name: self.step.kind().type_name().to_string(),
            description: description.to_string(),
            creation,
            action_status: Some(ActionResult::Executing),
            result_files: Vec::new(),
            statistics_summary: Some(ActionSummary {
                start: Some(creation),
                ..ActionSummary::default()
            }),
        };
        // A lost insert still leaves an id so the rest of the run can be traced.
        self.controller.add_process_action(location, &action);
        self.action_process_id = Some(action.process_id);
        action.process_id
    }

    pub fn add_start_state(&self) -> Option<StatusId> {
        let (location, process_id) = self.bound()?;
        self.controller.add_start_state(location, process_id)
    }

    pub fn add_complete_state(&self) -> Option<StatusId> {
        let (location, process_id) = self.bound()?;
        self.controller.add_complete_state(location, process_id)
    }

    pub fn add_failed_state(&self, message: &str) -> Option<StatusId> {
        let (location, process_id) = self.bound()?;
        self.controller
            .add_failed_state(location, process_id, &[message.to_string()])
    }

    fn bound(&self) -> Option<(&SessionLocation, ProcessId)> {
        Some((self.location.as_ref()?, self.action_process_id?))
    }
}

fn failure_from_error(err: &(dyn std::error::Error + 'static)) -> FailureDetail {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(next) = source {
        chain.push(next.to_string());
        source = next.source();
    }
    FailureDetail {
        message: err.to_string(),
        trace: chain.join("\ncaused by: "),
    }
}

fn failure_from_panic(payload: &(dyn Any + Send)) -> FailureDetail {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|value| value.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    FailureDetail {
        message: format!("step panicked: {detail}"),
        trace: format!("panic: {detail}"),
    }
}
