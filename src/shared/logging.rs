use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::time::now_secs;

pub fn lifecycle_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/lifecycle.log")
}

pub fn store_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/store.log")
}

/// Appends one JSON line to `path`. Logging never fails the caller.
pub fn append_log_event(path: &Path, level: &str, event: &str, fields: &[(&str, Value)]) {
    let mut payload = Map::new();
    payload.insert("timestamp".to_string(), Value::from(now_secs()));
    payload.insert("level".to_string(), Value::String(level.to_string()));
    payload.insert("event".to_string(), Value::String(event.to_string()));
    for (key, value) in fields {
        payload.insert((*key).to_string(), value.clone());
    }

    let Ok(line) = serde_json::to_string(&payload) else {
        return;
    };
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{line}");
}
