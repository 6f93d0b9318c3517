pub mod resolver;

pub use resolver::{is_container_name, ContainerFile, IdentityResolver, SessionLocation};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("session id is empty")]
    EmptySessionId,
    #[error("invalid session id `{raw}`: {reason}")]
    InvalidSessionId { raw: String, reason: String },
    #[error("data folder {path} does not exist")]
    DataRootMissing { path: String },
    #[error("no archive container in {data_root} matches session `{session_id}`")]
    UnknownSession {
        session_id: String,
        data_root: String,
    },
    #[error("session folder {path} does not exist")]
    SessionFolderMissing { path: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
