pub mod audit;
pub mod controller;
pub mod events;
pub mod handler;
pub mod payload;
pub mod preconditions;
pub mod snapshot;
pub mod step;

pub use audit::{load_audit_degraded, record_audit_failure, AuditDegraded};
pub use controller::{ActionSink, ExecutionController};
pub use events::{FailureDetail, LifecycleEvent, LifecycleState};
pub use handler::{ExecutionOutcome, StepHandler};
pub use payload::{StepKind, StepPayload};
pub use preconditions::{check_preconditions, metadata_census, MetadataCensus, MetadataVariant};
pub use snapshot::{read_snapshot, snapshot_path, write_snapshot, StepResult};
pub use step::{Step, StepError, StepRun};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Step(#[from] StepError),
    #[error("failed to write step snapshot {path}: {source}")]
    ArtifactWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read step snapshot {path}: {source}")]
    ArtifactRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid step snapshot {path}: {source}")]
    ArtifactParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
