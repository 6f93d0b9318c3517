pub mod records;
pub mod repository;

pub use records::{
    join_result_files, split_result_files, ActionResult, ActionStateEvent, ActionSummary,
    ExecutionPlanEntry, PlanStatus, ProcessAction, StateMessage, StateName,
};
pub use repository::ActionStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create database parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("process action `{process_id}` not found")]
    UnknownAction { process_id: String },
    #[error("state `{status_id}` not found")]
    UnknownState { status_id: String },
    #[error("state `{status_id}` is `{name}`; only Failed states carry a message")]
    MessageRequiresFailedState { status_id: String, name: String },
    #[error("plan entry {sequence} for session `{session_id}` not found")]
    UnknownPlanEntry { session_id: String, sequence: u32 },
    #[error("invalid {column} value `{value}` in database: {reason}")]
    Corrupt {
        column: &'static str,
        value: String,
        reason: String,
    },
}
