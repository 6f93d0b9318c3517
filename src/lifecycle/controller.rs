use super::audit::record_audit_failure;
use super::events::{LifecycleEvent, LifecycleState};
use super::snapshot::{write_snapshot, StepResult};
use super::LifecycleError;
use crate::identity::SessionLocation;
use crate::notify::{Notification, NotificationSink, StepNotice};
use crate::registry::ReadModelSource;
use crate::shared::ids::{MessageId, ProcessId, StatusId};
use crate::shared::logging::{append_log_event, lifecycle_log_path, store_log_path};
use crate::shared::time::now_utc;
use crate::store::{
    ActionResult, ActionStateEvent, ActionStore, ActionSummary, ProcessAction, StateMessage,
    StateName, StoreError,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Write side of the audit trail.
pub trait ActionSink: Send + Sync {
    fn add_action(&self, action: &ProcessAction) -> Result<(), StoreError>;

    fn update_action_result(
        &self,
        process_id: ProcessId,
        result: ActionResult,
        summary: &ActionSummary,
        result_files: &[String],
    ) -> Result<(), StoreError>;

    fn add_state(&self, state: &ActionStateEvent) -> Result<(), StoreError>;

    fn add_state_message(&self, message: &StateMessage) -> Result<(), StoreError>;
}

impl ActionSink for ActionStore {
    fn add_action(&self, action: &ProcessAction) -> Result<(), StoreError> {
        ActionStore::add_action(self, action)
    }

    fn update_action_result(
        &self,
        process_id: ProcessId,
        result: ActionResult,
        summary: &ActionSummary,
        result_files: &[String],
    ) -> Result<(), StoreError> {
        ActionStore::update_action_result(self, process_id, result, summary, result_files)
    }

    fn add_state(&self, state: &ActionStateEvent) -> Result<(), StoreError> {
        ActionStore::add_state(self, state)
    }

    fn add_state_message(&self, message: &StateMessage) -> Result<(), StoreError> {
        ActionStore::add_state_message(self, message)
    }
}

/// Turns lifecycle events into audit rows, snapshots and notifications.
///
/// Events are handled one at a time. Each is fully persisted before any of its
/// notifications are handed to the sink, and the sink receives them in dispatch order.
pub struct ExecutionController {
    persistence: Arc<dyn ActionSink>,
    notifications: Arc<dyn NotificationSink>,
    read_models: Arc<dyn ReadModelSource>,
    state_root: PathBuf,
    guard: Mutex<()>,
}

impl ExecutionController {
    pub fn new(
        persistence: Arc<dyn ActionSink>,
        notifications: Arc<dyn NotificationSink>,
        read_models: Arc<dyn ReadModelSource>,
        state_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            persistence,
            notifications,
            read_models,
            state_root: state_root.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    /// Handles one event. Only a failed snapshot write is returned to the caller.
    pub fn dispatch(
        &self,
        location: &SessionLocation,
        event: &LifecycleEvent,
        snapshot: Option<&StepResult>,
    ) -> Result<Option<PathBuf>, LifecycleError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.log_event(event);

        let Some(process_id) = event.process_id else {
            self.send(Notification::Notice(StepNotice::from_event(event)));
            return Ok(None);
        };

        match event.state {
            LifecycleState::Started => {
                self.add_start_state(location, process_id);
            }
            LifecycleState::Executing => {}
            LifecycleState::Completed => {
                self.record_outcome(location, process_id, event);
                self.add_complete_state(location, process_id);
            }
            LifecycleState::Failed => {
                self.record_outcome(location, process_id, event);
                self.add_failed_state(location, process_id, &event.messages);
            }
        }

        let written = match snapshot {
            Some(snapshot) if event.state.is_terminal() => {
                Some(write_snapshot(&location.folder, snapshot))
            }
            _ => None,
        };

        self.publish(event);

        match written {
            Some(Ok(path)) => Ok(Some(path)),
            Some(Err(err)) => {
                append_log_event(
                    &lifecycle_log_path(&self.state_root),
                    "error",
                    "step.snapshot_write_failed",
                    &[
                        ("sessionId", Value::String(event.session_id.to_string())),
                        ("step", Value::String(event.step.to_string())),
                        ("error", Value::String(err.to_string())),
                    ],
                );
                Err(err)
            }
            None => Ok(None),
        }
    }

    /// Records a new process action; `None` when the write was lost.
    pub fn add_process_action(
        &self,
        location: &SessionLocation,
        action: &ProcessAction,
    ) -> Option<ProcessId> {
        self.record(
            location,
            "add_action",
            self.persistence.add_action(action),
        )
        .map(|_| action.process_id)
    }

    pub fn update_process_action(
        &self,
        location: &SessionLocation,
        process_id: ProcessId,
        result: ActionResult,
        summary: &ActionSummary,
        result_files: &[String],
    ) {
        self.record(
            location,
            "update_action_result",
            self.persistence
                .update_action_result(process_id, result, summary, result_files),
        );
    }

    fn record_outcome(
        &self,
        location: &SessionLocation,
        process_id: ProcessId,
        event: &LifecycleEvent,
    ) {
        let result = match (event.result, event.state) {
            (Some(result), _) => result,
            (None, LifecycleState::Failed) => ActionResult::Failed,
            (None, _) => ActionResult::Success,
        };
        self.update_process_action(
            location,
            process_id,
            result,
            &event.summary,
            &event.result_files,
        );
    }

    pub fn add_start_state(
        &self,
        location: &SessionLocation,
        process_id: ProcessId,
    ) -> Option<StatusId> {
        self.add_state(location, process_id, StateName::Started)
    }

    pub fn add_complete_state(
        &self,
        location: &SessionLocation,
        process_id: ProcessId,
    ) -> Option<StatusId> {
        self.add_state(location, process_id, StateName::Completed)
    }

    /// Adds a Failed state plus one message holding every accumulated error.
    pub fn add_failed_state(
        &self,
        location: &SessionLocation,
        process_id: ProcessId,
        messages: &[String],
    ) -> Option<StatusId> {
        let status_id = self.add_state(location, process_id, StateName::Failed)?;
        let message = StateMessage {
            message_id: MessageId::generate(),
            status_id,
            description: messages.join("\n"),
            creation: now_utc(),
        };
        self.record(
            location,
            "add_state_message",
            self.persistence.add_state_message(&message),
        );
        Some(status_id)
    }

    fn add_state(
        &self,
        location: &SessionLocation,
        process_id: ProcessId,
        name: StateName,
    ) -> Option<StatusId> {
        let state = ActionStateEvent {
            status_id: StatusId::generate(),
            process_id,
            name,
            creation: now_utc(),
        };
        self.record(location, "add_state", self.persistence.add_state(&state))
            .map(|_| state.status_id)
    }

    fn record<T>(
        &self,
        location: &SessionLocation,
        operation: &str,
        outcome: Result<T, StoreError>,
    ) -> Option<T> {
        let err = match outcome {
            Ok(value) => return Some(value),
            Err(err) => err,
        };
        let mut fields = vec![
            ("sessionId", Value::String(location.session_id.to_string())),
            ("operation", Value::String(operation.to_string())),
            ("error", Value::String(err.to_string())),
        ];
        if let Err(marker_err) =
            record_audit_failure(&location.folder, operation, &err.to_string())
        {
            fields.push(("markerError", Value::String(marker_err.to_string())));
        }
        append_log_event(
            &store_log_path(&self.state_root),
            "error",
            "store.write_failed",
            &fields,
        );
        None
    }

    fn publish(&self, event: &LifecycleEvent) {
        self.send(Notification::Notice(StepNotice::from_event(event)));
        if event.state == LifecycleState::Executing {
            return;
        }

        match self.read_models.collections() {
            Ok(collections) => self.send(Notification::CollectionsStatus(collections)),
            Err(err) => self.log_read_model_failure(event, "collections", &err.to_string()),
        }
        match self.read_models.collection(event.session_id) {
            Ok(collection) => {
                if let Some(error) = &collection.settings_error {
                    self.log_read_model_failure(event, "settings", error);
                }
                self.send(Notification::CollectionStatus {
                    session_id: event.session_id,
                    collection: collection.clone(),
                });
                if event.state.is_terminal() {
                    self.send(Notification::StepFinished {
                        session_id: event.session_id,
                        collection,
                    });
                }
            }
            Err(err) => self.log_read_model_failure(event, "collection", &err.to_string()),
        }
    }

    fn send(&self, notification: Notification) {
        if let Err(err) = self.notifications.publish(&notification) {
            append_log_event(
                &lifecycle_log_path(&self.state_root),
                "warn",
                "notify.publish_failed",
                &[
                    ("method", Value::String(notification.method().to_string())),
                    ("error", Value::String(err.to_string())),
                ],
            );
        }
    }

    fn log_read_model_failure(&self, event: &LifecycleEvent, view: &str, error: &str) {
        append_log_event(
            &lifecycle_log_path(&self.state_root),
            "warn",
            "registry.read_failed",
            &[
                ("sessionId", Value::String(event.session_id.to_string())),
                ("view", Value::String(view.to_string())),
                ("error", Value::String(error.to_string())),
            ],
        );
    }

    fn log_event(&self, event: &LifecycleEvent) {
        let level = if event.state == LifecycleState::Failed {
            "error"
        } else {
            "info"
        };
        let mut fields = vec![
            ("sessionId", Value::String(event.session_id.to_string())),
            ("step", Value::String(event.step.to_string())),
            ("state", Value::String(event.state.to_string())),
            ("processed", Value::from(event.summary.processed)),
        ];
        if let Some(process_id) = event.process_id {
            fields.push(("processId", Value::String(process_id.to_string())));
        }
        if let Some(failure) = &event.failure {
            fields.push(("error", Value::String(failure.message.clone())));
            fields.push(("trace", Value::String(failure.trace.clone())));
        }
        append_log_event(
            &lifecycle_log_path(&self.state_root),
            level,
            "step.lifecycle",
            &fields,
        );
    }
}
