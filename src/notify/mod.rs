pub mod hub;
pub mod outbox;
pub mod worker;

pub use hub::ViewerHub;
pub use outbox::Outbox;
pub use worker::WorkerServiceClient;

use crate::lifecycle::{LifecycleEvent, LifecycleState};
use crate::registry::Collection;
use crate::shared::ids::SessionId;
use crate::store::ActionSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification outbox is closed")]
    OutboxClosed,
    #[error("failed to start outbox dispatcher: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode `{method}` notification: {source}")]
    Encode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("worker service call to {endpoint} failed: {reason}")]
    WorkerService { endpoint: String, reason: String },
}

/// Progress line shown to viewers for one lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNotice {
    pub event_time: DateTime<Utc>,
    pub session_id: SessionId,
    pub name: String,
    pub state: LifecycleState,
    pub message: String,
    pub summary: ActionSummary,
}

impl StepNotice {
    pub fn from_event(event: &LifecycleEvent) -> Self {
        Self {
            event_time: event.event_time,
            session_id: event.session_id,
            name: event.step.type_name().to_string(),
            state: event.state,
            message: event.notice_message(),
            summary: event.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "payload", rename_all = "camelCase")]
pub enum Notification {
    Notice(StepNotice),
    CollectionsStatus(Vec<Collection>),
    CollectionStatus {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        collection: Collection,
    },
    StepFinished {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        collection: Collection,
    },
}

impl Notification {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Notice(_) => "notice",
            Self::CollectionsStatus(_) => "collectionsStatus",
            Self::CollectionStatus { .. } => "collectionStatus",
            Self::StepFinished { .. } => "stepFinished",
        }
    }

    /// Everything except the worker-service hand-off goes to connected viewers.
    pub fn is_for_viewers(&self) -> bool {
        !matches!(self, Self::StepFinished { .. })
    }

    pub fn to_wire(&self) -> Result<String, NotifyError> {
        serde_json::to_string(self).map_err(|source| NotifyError::Encode {
            method: self.method(),
            source,
        })
    }
}

/// Destination for lifecycle notifications.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Sink that drops everything, for runs without viewers or worker service.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn publish(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }
}
