use super::preconditions::MetadataVariant;
use serde::{Deserialize, Serialize};

/// Every pipeline step type. The name doubles as the snapshot file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepKind {
    ContainerChecksum,
    Unpack,
    VirusScan,
    FormatIdentification,
    MetadataValidation,
    FixityCheck,
    Packaging,
    Upload,
}

impl StepKind {
    pub const ALL: [StepKind; 8] = [
        StepKind::ContainerChecksum,
        StepKind::Unpack,
        StepKind::VirusScan,
        StepKind::FormatIdentification,
        StepKind::MetadataValidation,
        StepKind::FixityCheck,
        StepKind::Packaging,
        StepKind::Upload,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            Self::ContainerChecksum => "ContainerChecksum",
            Self::Unpack => "Unpack",
            Self::VirusScan => "VirusScan",
            Self::FormatIdentification => "FormatIdentification",
            Self::MetadataValidation => "MetadataValidation",
            Self::FixityCheck => "FixityCheck",
            Self::Packaging => "Packaging",
            Self::Upload => "Upload",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.type_name().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| {
                let names = Self::ALL
                    .iter()
                    .map(|kind| kind.type_name())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("unknown step `{raw}`; expected one of: {names}")
            })
    }

    pub fn snapshot_file_name(self) -> String {
        format!("{}.json", self.type_name())
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerChecksumReport {
    pub algorithm: String,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpackReport {
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanItem {
    pub path: String,
    pub infected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirusScanReport {
    pub items: Vec<ScanItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatItem {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub puid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_name: Option<String>,
    pub preferred: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatIdentificationReport {
    pub items: Vec<FormatItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationItem {
    pub path: String,
    pub variant: MetadataVariant,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataValidationReport {
    pub items: Vec<ValidationItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixityItem {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixityItem {
    pub fn is_verified(&self) -> bool {
        match (&self.actual, &self.expected) {
            (Some(actual), Some(expected)) => actual.eq_ignore_ascii_case(expected),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixityReport {
    pub algorithm: String,
    pub items: Vec<FixityItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagingReport {
    pub package: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    pub key: String,
    pub bytes: u64,
    pub uploaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub bucket: String,
    pub items: Vec<UploadItem>,
}

/// Result data of a finished step, one concrete schema per step type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stepType", content = "data")]
pub enum StepPayload {
    ContainerChecksum(ContainerChecksumReport),
    Unpack(UnpackReport),
    VirusScan(VirusScanReport),
    FormatIdentification(FormatIdentificationReport),
    MetadataValidation(MetadataValidationReport),
    FixityCheck(FixityReport),
    Packaging(PackagingReport),
    Upload(UploadReport),
}

impl StepPayload {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::ContainerChecksum(_) => StepKind::ContainerChecksum,
            Self::Unpack(_) => StepKind::Unpack,
            Self::VirusScan(_) => StepKind::VirusScan,
            Self::FormatIdentification(_) => StepKind::FormatIdentification,
            Self::MetadataValidation(_) => StepKind::MetadataValidation,
            Self::FixityCheck(_) => StepKind::FixityCheck,
            Self::Packaging(_) => StepKind::Packaging,
            Self::Upload(_) => StepKind::Upload,
        }
    }

    /// `(accepted, rejected)` item counts reported by this payload.
    pub fn tally(&self) -> (u64, u64) {
        fn split<T>(items: &[T], accepted: impl Fn(&T) -> bool) -> (u64, u64) {
            let ok = items.iter().filter(|item| accepted(item)).count() as u64;
            (ok, items.len() as u64 - ok)
        }

        match self {
            Self::ContainerChecksum(report) => match &report.expected {
                Some(expected) if !expected.eq_ignore_ascii_case(&report.checksum) => (0, 1),
                _ => (1, 0),
            },
            Self::Unpack(report) => (report.files.len() as u64, 0),
            Self::VirusScan(report) => split(&report.items, |item| !item.infected),
            Self::FormatIdentification(report) => split(&report.items, |item| item.preferred),
            Self::MetadataValidation(report) => split(&report.items, |item| item.valid),
            Self::FixityCheck(report) => split(&report.items, FixityItem::is_verified),
            Self::Packaging(report) => (report.files.len() as u64, 0),
            Self::Upload(report) => split(&report.items, |item| item.uploaded),
        }
    }
}
