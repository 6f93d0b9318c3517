use super::IdentityError;
use crate::shared::ids::SessionId;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const CONTAINER_SUFFIXES: [&str; 3] = [".tar.gz", ".tar", ".zip"];

pub fn is_container_name(file_name: &str) -> bool {
    let lowered = file_name.to_ascii_lowercase();
    CONTAINER_SUFFIXES
        .iter()
        .any(|suffix| lowered.len() > suffix.len() && lowered.ends_with(suffix))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    pub session_id: SessionId,
    pub name: String,
    pub path: PathBuf,
}

/// Where one session's container and working folder live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLocation {
    pub session_id: SessionId,
    pub container: PathBuf,
    pub folder: PathBuf,
}

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    data_root: PathBuf,
}

impl IdentityResolver {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn session_folder(&self, session_id: SessionId) -> PathBuf {
        self.data_root.join(session_id.to_string())
    }

    pub fn session_id_for(&self, container: &Path) -> Option<SessionId> {
        let name = container.file_name()?.to_str()?;
        is_container_name(name).then(|| SessionId::from_container_name(name))
    }

    /// Every container directly under the data root, sorted by file name.
    pub fn containers(&self) -> Result<Vec<ContainerFile>, IdentityError> {
        let entries = match fs::read_dir(&self.data_root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                return Err(IdentityError::DataRootMissing {
                    path: self.data_root.display().to_string(),
                })
            }
            Err(source) => return Err(io_error(&self.data_root, source)),
        };

        let mut containers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&self.data_root, source))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|value| value.to_str()) else {
                continue;
            };
            if !is_container_name(name) {
                continue;
            }
            containers.push(ContainerFile {
                session_id: SessionId::from_container_name(name),
                name: name.to_string(),
                path: path.clone(),
            });
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    pub fn find_container(
        &self,
        session_id: SessionId,
    ) -> Result<Option<ContainerFile>, IdentityError> {
        Ok(self
            .containers()?
            .into_iter()
            .find(|container| container.session_id == session_id))
    }

    /// Maps a session back to its container and folder. The folder may not exist yet.
    pub fn resolve(&self, session_id: SessionId) -> Result<SessionLocation, IdentityError> {
        let container =
            self.find_container(session_id)?
                .ok_or_else(|| IdentityError::UnknownSession {
                    session_id: session_id.to_string(),
                    data_root: self.data_root.display().to_string(),
                })?;
        Ok(SessionLocation {
            session_id,
            container: container.path,
            folder: self.session_folder(session_id),
        })
    }

    /// Checks a raw session id the way a step must before it can run.
    pub fn validate_session(&self, raw: &str) -> Result<SessionLocation, IdentityError> {
        if raw.trim().is_empty() {
            return Err(IdentityError::EmptySessionId);
        }
        let session_id =
            SessionId::parse(raw).map_err(|reason| IdentityError::InvalidSessionId {
                raw: raw.to_string(),
                reason,
            })?;
        if !self.data_root.is_dir() {
            return Err(IdentityError::DataRootMissing {
                path: self.data_root.display().to_string(),
            });
        }
        let location = self.resolve(session_id)?;
        if !location.folder.is_dir() {
            return Err(IdentityError::SessionFolderMissing {
                path: location.folder.display().to_string(),
            });
        }
        Ok(location)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> IdentityError {
    IdentityError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_suffixes_are_matched_case_insensitively() {
        assert!(is_container_name("archive.tar"));
        assert!(is_container_name("archive.TAR.GZ"));
        assert!(is_container_name("archive.zip"));
        assert!(!is_container_name("archive.tgz"));
        assert!(!is_container_name(".zip"));
        assert!(!is_container_name("notes.txt"));
    }

    #[test]
    fn containers_skip_directories_and_other_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("b.zip"), b"zip").expect("write zip");
        fs::write(temp.path().join("a.tar"), b"tar").expect("write tar");
        fs::write(temp.path().join("readme.md"), b"text").expect("write md");
        fs::create_dir(temp.path().join("dir.tar")).expect("mkdir");

        let resolver = IdentityResolver::new(temp.path());
        let names = resolver
            .containers()
            .expect("list containers")
            .into_iter()
            .map(|container| container.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.tar", "b.zip"]);
    }
}
