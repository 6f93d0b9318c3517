pub mod collections;

pub use collections::{
    load_run_settings, ActionView, Collection, CollectionRegistry, StateView,
    RUN_SETTINGS_FILE_NAME,
};

use crate::identity::IdentityError;
use crate::shared::ids::SessionId;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no collection with session id `{session_id}`")]
    NotFound { session_id: String },
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid run settings {path}: {source}")]
    Settings {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read side used to build the collection views attached to notifications.
pub trait ReadModelSource: Send + Sync {
    fn collections(&self) -> Result<Vec<Collection>, RegistryError>;

    fn collection(&self, session_id: SessionId) -> Result<Collection, RegistryError>;
}
