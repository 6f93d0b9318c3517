use super::{ReadModelSource, RegistryError};
use crate::identity::{ContainerFile, IdentityResolver};
use crate::lifecycle::{load_audit_degraded, AuditDegraded};
use crate::shared::ids::SessionId;
use crate::status::{aggregate_status, ContainerStatus};
use crate::store::{
    ActionStateEvent, ActionStore, ExecutionPlanEntry, ProcessAction, StateMessage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const RUN_SETTINGS_FILE_NAME: &str = "PreingestSettings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    #[serde(flatten)]
    pub state: ActionStateEvent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<StateMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionView {
    #[serde(flatten)]
    pub action: ProcessAction,
    #[serde(default)]
    pub states: Vec<StateView>,
}

/// Everything a viewer knows about one archive container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub session_id: SessionId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_write_time: Option<DateTime<Utc>>,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    /// Why a present settings file could not be read; `settings` is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_error: Option<String>,
    #[serde(default)]
    pub scheduled_plan: Vec<ExecutionPlanEntry>,
    #[serde(default)]
    pub process_actions: Vec<ActionView>,
    pub overall_status: ContainerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_degraded: Option<AuditDegraded>,
}

/// Reads the optional run configuration saved next to a session's working files.
pub fn load_run_settings(folder: &Path) -> Result<Option<Value>, RegistryError> {
    let path = folder.join(RUN_SETTINGS_FILE_NAME);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(RegistryError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| RegistryError::Settings {
            path: path.display().to_string(),
            source,
        })
}

pub struct CollectionRegistry {
    resolver: IdentityResolver,
    store: ActionStore,
}

impl CollectionRegistry {
    pub fn new(resolver: IdentityResolver, store: ActionStore) -> Self {
        Self { resolver, store }
    }

    /// All collections, most recently written first.
    ///
    /// A container that disappears while the listing is built is left out.
    pub fn list(&self) -> Result<Vec<Collection>, RegistryError> {
        let mut collections = Vec::new();
        for container in self.resolver.containers()? {
            match self.build(&container) {
                Ok(collection) => collections.push(collection),
                Err(RegistryError::Io { .. }) if !container.path.exists() => {}
                Err(err) => return Err(err),
            }
        }
        collections.sort_by(|a, b| {
            b.last_write_time
                .cmp(&a.last_write_time)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(collections)
    }

    pub fn get(&self, session_id: SessionId) -> Result<Collection, RegistryError> {
        let container =
            self.resolver
                .find_container(session_id)?
                .ok_or_else(|| RegistryError::NotFound {
                    session_id: session_id.to_string(),
                })?;
        self.build(&container)
    }

    fn build(&self, container: &ContainerFile) -> Result<Collection, RegistryError> {
        let metadata = fs::metadata(&container.path).map_err(|source| RegistryError::Io {
            path: container.path.display().to_string(),
            source,
        })?;
        let folder = self.resolver.session_folder(container.session_id);

        let plan = self.store.plan_for_session(container.session_id)?;
        let results = self.store.result_codes_for_session(container.session_id)?;
        let overall_status = aggregate_status(&plan, &results);
        let actions = self.store.actions_for_session(container.session_id)?;

        let mut process_actions = Vec::with_capacity(actions.len());
        for action in actions {
            let mut states = Vec::new();
            for state in self.store.states_for_action(action.process_id)? {
                let messages = self.store.messages_for_state(state.status_id)?;
                states.push(StateView { state, messages });
            }
            process_actions.push(ActionView { action, states });
        }

        let (settings, settings_error) = match load_run_settings(&folder) {
            Ok(settings) => (settings, None),
            Err(err) => (None, Some(err.to_string())),
        };

        Ok(Collection {
            session_id: container.session_id,
            name: container.name.clone(),
            creation_time: metadata.created().ok().map(DateTime::<Utc>::from),
            last_write_time: metadata.modified().ok().map(DateTime::<Utc>::from),
            size: metadata.len(),
            settings,
            settings_error,
            scheduled_plan: plan,
            process_actions,
            overall_status,
            audit_degraded: load_audit_degraded(&folder),
        })
    }
}

impl ReadModelSource for CollectionRegistry {
    fn collections(&self) -> Result<Vec<Collection>, RegistryError> {
        self.list()
    }

    fn collection(&self, session_id: SessionId) -> Result<Collection, RegistryError> {
        self.get(session_id)
    }
}
