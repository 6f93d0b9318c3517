use crate::config::{load_settings, ConfigError, Settings};
use crate::identity::IdentityResolver;
use crate::lifecycle::ExecutionController;
use crate::notify::{NotificationSink, Outbox, WorkerServiceClient};
use crate::registry::CollectionRegistry;
use crate::shared::ids::SessionId;
use crate::store::ActionStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn parse_session_id(raw: &str) -> Result<SessionId, String> {
    SessionId::parse(raw).map_err(|err| format!("invalid session id `{raw}`: {err}"))
}

/// Everything a command needs, wired from one settings file.
pub struct Services {
    pub settings: Settings,
    pub state_root: PathBuf,
    pub resolver: IdentityResolver,
    pub store: ActionStore,
    pub registry: Arc<CollectionRegistry>,
}

impl Services {
    pub fn load(config_path: Option<&Path>) -> Result<Self, String> {
        let settings = load_settings(config_path).map_err(map_config_err)?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: Settings) -> Result<Self, String> {
        let state_root = settings.resolve_state_root().map_err(map_config_err)?;
        let store =
            ActionStore::open(&settings.resolve_database_path()).map_err(|e| e.to_string())?;
        store.ensure_schema().map_err(|e| e.to_string())?;
        let resolver = IdentityResolver::new(settings.data_root.clone());
        let registry = Arc::new(CollectionRegistry::new(resolver.clone(), store.clone()));
        Ok(Self {
            settings,
            state_root,
            resolver,
            store,
            registry,
        })
    }

    /// Outbox feeding the configured worker service, if any.
    pub fn start_outbox(&self) -> Result<Arc<Outbox>, String> {
        let mut targets: Vec<Arc<dyn NotificationSink>> = Vec::new();
        if let Some(worker) = &self.settings.worker_service {
            targets.push(Arc::new(WorkerServiceClient::new(worker)));
        }
        Outbox::start(targets, &self.state_root)
            .map(Arc::new)
            .map_err(|e| e.to_string())
    }

    pub fn controller(&self, outbox: Arc<Outbox>) -> Arc<ExecutionController> {
        Arc::new(ExecutionController::new(
            Arc::new(self.store.clone()),
            outbox,
            self.registry.clone(),
            self.state_root.clone(),
        ))
    }
}
