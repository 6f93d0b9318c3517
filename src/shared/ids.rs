use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub fn parse_guid_value(kind: &str, value: &str) -> Result<Uuid, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{kind} must be non-empty"));
    }
    let parsed =
        Uuid::parse_str(trimmed).map_err(|err| format!("{kind} must be a GUID: {err}"))?;
    if parsed.is_nil() {
        return Err(format!("{kind} must not be the empty GUID"));
    }
    Ok(parsed)
}

macro_rules! define_guid_type {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, String> {
                parse_guid_value($kind, raw).map(Self)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.hyphenated().fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::parse(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(|err| {
                    D::Error::custom(format!("invalid {} `{}`: {}", $kind, raw, err))
                })
            }
        }
    };
}

define_guid_type!(SessionId, "session id");
define_guid_type!(ProcessId, "process id");
define_guid_type!(StatusId, "status id");
define_guid_type!(MessageId, "message id");

impl SessionId {
    /// Derives the session identity of an archive container from its file name.
    ///
    /// The id is the first 16 bytes of the SHA-256 digest of the UTF-8 name, so the
    /// same name always maps to the same session and a rename changes it.
    pub fn from_container_name(file_name: &str) -> Self {
        let digest = Sha256::digest(file_name.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}
