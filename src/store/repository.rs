use super::records::{
    join_result_files, split_result_files, ActionResult, ActionStateEvent, ActionSummary,
    ExecutionPlanEntry, PlanStatus, ProcessAction, StateMessage, StateName,
};
use super::StoreError;
use crate::shared::ids::{MessageId, ProcessId, SessionId, StatusId};
use crate::shared::time::{from_db_timestamp, to_db_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed record of process actions, their lifecycle states, failure
/// messages and the execution plan of every session.
///
/// Each call opens its own connection and every write commits in its own
/// transaction, so independent steps may write concurrently.
#[derive(Debug, Clone)]
pub struct ActionStore {
    db_path: PathBuf,
}

type ActionRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

impl ActionStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        let _ = store.connect()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS actions (
                    process_id TEXT NOT NULL PRIMARY KEY,
                    session_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL,
                    creation TEXT NOT NULL,
                    action_status TEXT,
                    result_files TEXT,
                    statistics_summary TEXT
                );

                CREATE TABLE IF NOT EXISTS states (
                    status_id TEXT NOT NULL PRIMARY KEY,
                    process_id TEXT NOT NULL
                        REFERENCES actions(process_id) ON DELETE CASCADE,
                    name TEXT NOT NULL
                        CHECK (name IN ('Started', 'Completed', 'Failed')),
                    creation TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS messages (
                    message_id TEXT NOT NULL PRIMARY KEY,
                    status_id TEXT NOT NULL
                        REFERENCES states(status_id) ON DELETE CASCADE,
                    description TEXT NOT NULL,
                    creation TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS plan (
                    session_id TEXT NOT NULL,
                    sequence INTEGER NOT NULL,
                    action_name TEXT NOT NULL,
                    status TEXT NOT NULL,
                    start_on_error INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (session_id, sequence)
                );

                CREATE INDEX IF NOT EXISTS idx_actions_session_creation
                    ON actions(session_id, creation ASC);
                CREATE INDEX IF NOT EXISTS idx_states_process_creation
                    ON states(process_id, creation ASC);
                CREATE INDEX IF NOT EXISTS idx_messages_status
                    ON messages(status_id);
                ",
            )
            .map_err(|source| StoreError::Sql { source })
    }

    pub fn add_action(&self, action: &ProcessAction) -> Result<(), StoreError> {
        let summary = action
            .statistics_summary
            .as_ref()
            .map(encode_summary)
            .transpose()?;
        let connection = self.connect()?;
        connection
            .execute(
                "
                INSERT INTO actions (
                    process_id, session_id, name, description, creation,
                    action_status, result_files, statistics_summary
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
                params![
                    action.process_id.to_string(),
                    action.session_id.to_string(),
                    action.name,
                    action.description,
                    to_db_timestamp(&action.creation),
                    action.action_status.map(ActionResult::as_str),
                    join_result_files(&action.result_files),
                    summary,
                ],
            )
            .map_err(|source| StoreError::Sql { source })?;
        Ok(())
    }

    /// Writes the finished result code, summary and result files onto an existing action.
    pub fn update_action_result(
        &self,
        process_id: ProcessId,
        result: ActionResult,
        summary: &ActionSummary,
        result_files: &[String],
    ) -> Result<(), StoreError> {
        let encoded = encode_summary(summary)?;
        let connection = self.connect()?;
        let updated = connection
            .execute(
                "
                UPDATE actions
                SET action_status = ?2, statistics_summary = ?3, result_files = ?4
                WHERE process_id = ?1
                ",
                params![
                    process_id.to_string(),
                    result.as_str(),
                    encoded,
                    join_result_files(result_files),
                ],
            )
            .map_err(|source| StoreError::Sql { source })?;
        if updated == 0 {
            return Err(StoreError::UnknownAction {
                process_id: process_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn add_state(&self, state: &ActionStateEvent) -> Result<(), StoreError> {
        let mut connection = self.connect()?;
        let tx = connection
            .transaction()
            .map_err(|source| StoreError::Sql { source })?;
        let exists = tx
            .query_row(
                "SELECT 1 FROM actions WHERE process_id = ?1",
                params![state.process_id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|source| StoreError::Sql { source })?
            .is_some();
        if !exists {
            return Err(StoreError::UnknownAction {
                process_id: state.process_id.to_string(),
            });
        }
        tx.execute(
            "
            INSERT INTO states (status_id, process_id, name, creation)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                state.status_id.to_string(),
                state.process_id.to_string(),
                state.name.as_str(),
                to_db_timestamp(&state.creation),
            ],
        )
        .map_err(|source| StoreError::Sql { source })?;
        tx.commit().map_err(|source| StoreError::Sql { source })
    }

    pub fn add_state_message(&self, message: &StateMessage) -> Result<(), StoreError> {
        let mut connection = self.connect()?;
        let tx = connection
            .transaction()
            .map_err(|source| StoreError::Sql { source })?;
        let name: Option<String> = tx
            .query_row(
                "SELECT name FROM states WHERE status_id = ?1",
                params![message.status_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| StoreError::Sql { source })?;
        match name.as_deref() {
            None => {
                return Err(StoreError::UnknownState {
                    status_id: message.status_id.to_string(),
                })
            }
            Some("Failed") => {}
            Some(other) => {
                return Err(StoreError::MessageRequiresFailedState {
                    status_id: message.status_id.to_string(),
                    name: other.to_string(),
                })
            }
        }
        tx.execute(
            "
            INSERT INTO messages (message_id, status_id, description, creation)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                message.message_id.to_string(),
                message.status_id.to_string(),
                message.description,
                to_db_timestamp(&message.creation),
            ],
        )
        .map_err(|source| StoreError::Sql { source })?;
        tx.commit().map_err(|source| StoreError::Sql { source })
    }

    pub fn get_action(&self, process_id: ProcessId) -> Result<Option<ProcessAction>, StoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                "
                SELECT process_id, session_id, name, description, creation,
                       action_status, result_files, statistics_summary
                FROM actions
                WHERE process_id = ?1
                ",
                params![process_id.to_string()],
                read_action_row,
            )
            .optional()
            .map_err(|source| StoreError::Sql { source })?;
        row.map(action_from_row).transpose()
    }

    /// Actions of one session in creation order.
    pub fn actions_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ProcessAction>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "
                SELECT process_id, session_id, name, description, creation,
                       action_status, result_files, statistics_summary
                FROM actions
                WHERE session_id = ?1
                ORDER BY creation ASC, process_id ASC
                ",
            )
            .map_err(|source| StoreError::Sql { source })?;
        let rows = statement
            .query_map(params![session_id.to_string()], read_action_row)
            .map_err(|source| StoreError::Sql { source })?;

        let mut out = Vec::new();
        for row in rows {
            let row = row.map_err(|source| StoreError::Sql { source })?;
            out.push(action_from_row(row)?);
        }
        Ok(out)
    }

    /// Latest stored result code of every action in the session; `None` means unset.
    pub fn result_codes_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Option<ActionResult>>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT action_status FROM actions WHERE session_id = ?1")
            .map_err(|source| StoreError::Sql { source })?;
        let rows = statement
            .query_map(params![session_id.to_string()], |row| {
                row.get::<_, Option<String>>(0)
            })
            .map_err(|source| StoreError::Sql { source })?;

        let mut out = Vec::new();
        for row in rows {
            let raw = row.map_err(|source| StoreError::Sql { source })?;
            out.push(raw.as_deref().and_then(ActionResult::from_db));
        }
        Ok(out)
    }

    pub fn states_for_action(
        &self,
        process_id: ProcessId,
    ) -> Result<Vec<ActionStateEvent>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "
                SELECT status_id, process_id, name, creation
                FROM states
                WHERE process_id = ?1
                ORDER BY creation ASC, rowid ASC
                ",
            )
            .map_err(|source| StoreError::Sql { source })?;
        let rows = statement
            .query_map(params![process_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|source| StoreError::Sql { source })?;

        let mut out = Vec::new();
        for row in rows {
            let (status_id, process_id, name, creation) =
                row.map_err(|source| StoreError::Sql { source })?;
            out.push(ActionStateEvent {
                status_id: parse_column("states.status_id", &status_id, StatusId::parse)?,
                process_id: parse_column("states.process_id", &process_id, ProcessId::parse)?,
                name: parse_column("states.name", &name, StateName::parse)?,
                creation: parse_timestamp("states.creation", &creation)?,
            });
        }
        Ok(out)
    }

    pub fn messages_for_state(&self, status_id: StatusId) -> Result<Vec<StateMessage>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "
                SELECT message_id, status_id, description, creation
                FROM messages
                WHERE status_id = ?1
                ORDER BY creation ASC
                ",
            )
            .map_err(|source| StoreError::Sql { source })?;
        let rows = statement
            .query_map(params![status_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|source| StoreError::Sql { source })?;

        let mut out = Vec::new();
        for row in rows {
            let (message_id, status_id, description, creation) =
                row.map_err(|source| StoreError::Sql { source })?;
            out.push(StateMessage {
                message_id: parse_column("messages.message_id", &message_id, MessageId::parse)?,
                status_id: parse_column("messages.status_id", &status_id, StatusId::parse)?,
                description,
                creation: parse_timestamp("messages.creation", &creation)?,
            });
        }
        Ok(out)
    }

    /// Replaces the whole execution plan of a session.
    pub fn save_plan(
        &self,
        session_id: SessionId,
        entries: &[ExecutionPlanEntry],
    ) -> Result<(), StoreError> {
        let mut connection = self.connect()?;
        let tx = connection
            .transaction()
            .map_err(|source| StoreError::Sql { source })?;
        tx.execute(
            "DELETE FROM plan WHERE session_id = ?1",
            params![session_id.to_string()],
        )
        .map_err(|source| StoreError::Sql { source })?;
        for entry in entries {
            tx.execute(
                "
                INSERT INTO plan (session_id, sequence, action_name, status, start_on_error)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    session_id.to_string(),
                    i64::from(entry.sequence),
                    entry.action_name,
                    entry.status.as_str(),
                    entry.start_on_error,
                ],
            )
            .map_err(|source| StoreError::Sql { source })?;
        }
        tx.commit().map_err(|source| StoreError::Sql { source })
    }

    pub fn update_plan_status(
        &self,
        session_id: SessionId,
        sequence: u32,
        status: PlanStatus,
    ) -> Result<(), StoreError> {
        let connection = self.connect()?;
        let updated = connection
            .execute(
                "UPDATE plan SET status = ?3 WHERE session_id = ?1 AND sequence = ?2",
                params![session_id.to_string(), i64::from(sequence), status.as_str()],
            )
            .map_err(|source| StoreError::Sql { source })?;
        if updated == 0 {
            return Err(StoreError::UnknownPlanEntry {
                session_id: session_id.to_string(),
                sequence,
            });
        }
        Ok(())
    }

    /// Plan entries of one session ordered by sequence.
    pub fn plan_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<ExecutionPlanEntry>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "
                SELECT sequence, action_name, status, start_on_error
                FROM plan
                WHERE session_id = ?1
                ORDER BY sequence ASC
                ",
            )
            .map_err(|source| StoreError::Sql { source })?;
        let rows = statement
            .query_map(params![session_id.to_string()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            })
            .map_err(|source| StoreError::Sql { source })?;

        let mut out = Vec::new();
        for row in rows {
            let (sequence, action_name, status, start_on_error) =
                row.map_err(|source| StoreError::Sql { source })?;
            let sequence = u32::try_from(sequence).map_err(|err| StoreError::Corrupt {
                column: "plan.sequence",
                value: sequence.to_string(),
                reason: err.to_string(),
            })?;
            out.push(ExecutionPlanEntry {
                session_id,
                sequence,
                action_name,
                status: parse_column("plan.status", &status, PlanStatus::parse)?,
                start_on_error,
            });
        }
        Ok(out)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection =
            Connection::open(&self.db_path).map_err(|source| StoreError::Open {
                path: self.db_path.display().to_string(),
                source,
            })?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|source| StoreError::Sql { source })?;
        connection
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|source| StoreError::Sql { source })?;
        Ok(connection)
    }
}

fn read_action_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn action_from_row(row: ActionRow) -> Result<ProcessAction, StoreError> {
    let (
        process_id,
        session_id,
        name,
        description,
        creation,
        action_status,
        result_files,
        statistics_summary,
    ) = row;
    let statistics_summary = match statistics_summary.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(serde_json::from_str::<ActionSummary>(raw).map_err(|err| {
            StoreError::Corrupt {
                column: "actions.statistics_summary",
                value: raw.to_string(),
                reason: err.to_string(),
            }
        })?),
    };
    Ok(ProcessAction {
        process_id: parse_column("actions.process_id", &process_id, ProcessId::parse)?,
        session_id: parse_column("actions.session_id", &session_id, SessionId::parse)?,
        name,
        description,
        creation: parse_timestamp("actions.creation", &creation)?,
        action_status: action_status.as_deref().and_then(ActionResult::from_db),
        result_files: result_files
            .as_deref()
            .map(split_result_files)
            .unwrap_or_default(),
        statistics_summary,
    })
}

fn encode_summary(summary: &ActionSummary) -> Result<String, StoreError> {
    serde_json::to_string(summary).map_err(|err| StoreError::Corrupt {
        column: "actions.statistics_summary",
        value: format!("{summary:?}"),
        reason: err.to_string(),
    })
}

fn parse_column<T>(
    column: &'static str,
    raw: &str,
    parser: impl FnOnce(&str) -> Result<T, String>,
) -> Result<T, StoreError> {
    parser(raw).map_err(|reason| StoreError::Corrupt {
        column,
        value: raw.to_string(),
        reason,
    })
}

fn parse_timestamp(column: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    from_db_timestamp(raw).map_err(|err| StoreError::Corrupt {
        column,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}
