use super::digest::{sha256_file, SHA256_ALGORITHM};
use crate::lifecycle::payload::ContainerChecksumReport;
use crate::lifecycle::{Step, StepError, StepKind, StepPayload, StepRun};

/// Computes the SHA-256 of the archive container, optionally against a known value.
#[derive(Debug, Clone, Default)]
pub struct ContainerChecksumStep {
    expected: Option<String>,
}

impl ContainerChecksumStep {
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.map(|value| value.trim().to_ascii_lowercase()),
        }
    }
}

impl Step for ContainerChecksumStep {
    fn kind(&self) -> StepKind {
        StepKind::ContainerChecksum
    }

    fn description(&self) -> String {
        "Calculate container checksum".to_string()
    }

    fn run(&mut self, run: &mut StepRun<'_>) -> Result<StepPayload, StepError> {
        let container = run.container().to_path_buf();
        let checksum = sha256_file(&container).map_err(|source| StepError::Io {
            path: container.display().to_string(),
            source,
        })?;
        let report = ContainerChecksumReport {
            algorithm: SHA256_ALGORITHM.to_string(),
            checksum,
            expected: self.expected.clone(),
        };
        match &report.expected {
            Some(expected) if *expected != report.checksum => {
                run.reject();
                run.add_error(format!(
                    "container checksum {} does not match expected {expected}",
                    report.checksum
                ));
            }
            _ => run.accept(),
        }
        Ok(StepPayload::ContainerChecksum(report))
    }
}
