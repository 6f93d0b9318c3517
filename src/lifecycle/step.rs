use super::payload::{StepKind, StepPayload};
use super::preconditions::MetadataVariant;
use crate::identity::{IdentityError, SessionLocation};
use crate::shared::ids::SessionId;
use crate::store::ActionSummary;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("session validation failed: {0}")]
    Session(#[from] IdentityError),
    #[error("session id is not set")]
    SessionNotSet,
    #[error("session id is already set to `{current}`")]
    SessionAlreadySet { current: String },
    #[error("archive container {path} does not exist")]
    ContainerMissing { path: String },
    #[error("session folder {path} holds no ToPX or MDTO metadata files")]
    MissingMetadata { path: String },
    #[error(
        "session folder {path} holds {topx} ToPX and {mdto} MDTO metadata files; expected one variant"
    )]
    AmbiguousMetadata {
        path: String,
        topx: usize,
        mdto: usize,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("step `{step}` returned a `{actual}` payload")]
    PayloadMismatch { step: StepKind, actual: StepKind },
    #[error("{0}")]
    Execution(String),
}

/// One unit of pipeline work. The handler owns the lifecycle around it.
pub trait Step: Send {
    fn kind(&self) -> StepKind;

    fn description(&self) -> String {
        self.kind().type_name().to_string()
    }

    fn run(&mut self, run: &mut StepRun<'_>) -> Result<StepPayload, StepError>;
}

/// Execution context handed to [`Step::run`].
pub struct StepRun<'a> {
    location: &'a SessionLocation,
    variant: MetadataVariant,
    summary: ActionSummary,
    errors: Vec<String>,
    result_files: Vec<String>,
    progress: &'a dyn Fn(&ActionSummary, &str),
}

pub(crate) struct RunRecord {
    pub summary: ActionSummary,
    pub errors: Vec<String>,
    pub result_files: Vec<String>,
}

impl<'a> StepRun<'a> {
    pub(crate) fn new(
        location: &'a SessionLocation,
        variant: MetadataVariant,
        summary: ActionSummary,
        progress: &'a dyn Fn(&ActionSummary, &str),
    ) -> Self {
        Self {
            location,
            variant,
            summary,
            errors: Vec::new(),
            result_files: Vec::new(),
            progress,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.location.session_id
    }

    pub fn folder(&self) -> &Path {
        &self.location.folder
    }

    pub fn container(&self) -> &Path {
        &self.location.container
    }

    pub fn variant(&self) -> MetadataVariant {
        self.variant
    }

    pub fn accept(&mut self) {
        self.summary.accept();
    }

    pub fn reject(&mut self) {
        self.summary.reject();
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_result_file(&mut self, path: impl Into<String>) {
        self.result_files.push(path.into());
    }

    pub fn summary(&self) -> &ActionSummary {
        &self.summary
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Publishes an `Executing` notice with the current counters.
    pub fn report_progress(&self, message: &str) {
        (self.progress)(&self.summary, message);
    }

    pub(crate) fn into_record(self) -> RunRecord {
        RunRecord {
            summary: self.summary,
            errors: self.errors,
            result_files: self.result_files,
        }
    }
}
