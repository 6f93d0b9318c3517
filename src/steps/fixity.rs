use super::digest::{sha256_file, SHA256_ALGORITHM};
use crate::lifecycle::audit::AUDIT_DEGRADED_FILE_NAME;
use crate::lifecycle::payload::{FixityItem, FixityReport};
use crate::lifecycle::{Step, StepError, StepKind, StepPayload, StepRun};
use crate::registry::RUN_SETTINGS_FILE_NAME;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const PROGRESS_EVERY: u64 = 100;

/// Checksums every file in the session folder.
#[derive(Debug, Clone, Default)]
pub struct FixityStep {
    expected: BTreeMap<String, String>,
}

impl FixityStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Known checksums keyed by folder-relative path with `/` separators.
    pub fn with_expected(expected: BTreeMap<String, String>) -> Self {
        Self { expected }
    }
}

impl Step for FixityStep {
    fn kind(&self) -> StepKind {
        StepKind::FixityCheck
    }

    fn description(&self) -> String {
        "Calculate file checksums".to_string()
    }

    fn run(&mut self, run: &mut StepRun<'_>) -> Result<StepPayload, StepError> {
        let folder = run.folder().to_path_buf();
        let files = collect_files(&folder)?;

        let mut items = Vec::with_capacity(files.len());
        for (relative, path) in files {
            let expected = self.expected.get(&relative).cloned();
            let item = match sha256_file(&path) {
                Ok(actual) => FixityItem {
                    path: relative,
                    actual: Some(actual),
                    expected,
                    error: None,
                },
                Err(err) => FixityItem {
                    path: relative,
                    actual: None,
                    expected,
                    error: Some(err.to_string()),
                },
            };
            if item.is_verified() {
                run.accept();
            } else {
                run.reject();
                run.add_error(match &item.error {
                    Some(error) => format!("{}: {error}", item.path),
                    None => format!("{}: checksum mismatch", item.path),
                });
            }
            items.push(item);

            if run.summary().processed % PROGRESS_EVERY == 0 {
                let message = format!("checksummed {} files", run.summary().processed);
                run.report_progress(&message);
            }
        }

        Ok(StepPayload::FixityCheck(FixityReport {
            algorithm: SHA256_ALGORITHM.to_string(),
            items,
        }))
    }
}

fn is_pipeline_artifact(name: &str) -> bool {
    name == AUDIT_DEGRADED_FILE_NAME
        || name == RUN_SETTINGS_FILE_NAME
        || StepKind::ALL
            .iter()
            .any(|kind| kind.snapshot_file_name() == name)
}

/// Files below `folder` sorted by relative path, skipping top-level pipeline output.
fn collect_files(folder: &Path) -> Result<Vec<(String, PathBuf)>, StepError> {
    let mut files = Vec::new();
    let mut pending = vec![folder.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| StepError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| StepError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let Ok(relative) = path.strip_prefix(folder) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            if dir == folder && is_pipeline_artifact(&relative) {
                continue;
            }
            files.push((relative, path));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
