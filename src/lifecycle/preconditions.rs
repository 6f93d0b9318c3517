use super::step::StepError;
use crate::identity::SessionLocation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const TOPX_METADATA_SUFFIX: &str = ".metadata";
pub const MDTO_METADATA_SUFFIX: &str = ".mdto.xml";

/// Descriptive-metadata dialect a collection is delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataVariant {
    #[serde(rename = "ToPX")]
    Topx,
    #[serde(rename = "MDTO")]
    Mdto,
}

impl MetadataVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Topx => "ToPX",
            Self::Mdto => "MDTO",
        }
    }

    pub fn of_file_name(name: &str) -> Option<Self> {
        let lowered = name.to_ascii_lowercase();
        if lowered.ends_with(MDTO_METADATA_SUFFIX) {
            Some(Self::Mdto)
        } else if lowered.ends_with(TOPX_METADATA_SUFFIX) {
            Some(Self::Topx)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataCensus {
    pub topx: usize,
    pub mdto: usize,
}

impl MetadataCensus {
    pub fn variant(&self, folder: &Path) -> Result<MetadataVariant, StepError> {
        match (self.topx, self.mdto) {
            (0, 0) => Err(StepError::MissingMetadata {
                path: folder.display().to_string(),
            }),
            (_, 0) => Ok(MetadataVariant::Topx),
            (0, _) => Ok(MetadataVariant::Mdto),
            (topx, mdto) => Err(StepError::AmbiguousMetadata {
                path: folder.display().to_string(),
                topx,
                mdto,
            }),
        }
    }
}

/// Counts metadata files of each variant anywhere below `folder`.
pub fn metadata_census(folder: &Path) -> Result<MetadataCensus, StepError> {
    let mut census = MetadataCensus::default();
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
            let variant = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(MetadataVariant::of_file_name);
            match variant {
                Some(MetadataVariant::Topx) => census.topx += 1,
                Some(MetadataVariant::Mdto) => census.mdto += 1,
                None => {}
            }
        }
    }
    Ok(census)
}

/// Checks that must hold before any step body runs.
pub fn check_preconditions(location: &SessionLocation) -> Result<MetadataVariant, StepError> {
    if !location.container.is_file() {
        return Err(StepError::ContainerMissing {
            path: location.container.display().to_string(),
        });
    }
    metadata_census(&location.folder)?.variant(&location.folder)
}
