use super::{default_global_config_path, ConfigError, Settings};
use std::path::Path;

/// Loads and validates settings from `path`, or from the global config file.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let settings = match path {
        Some(path) => Settings::from_path(path)?,
        None => Settings::from_path(&default_global_config_path()?)?,
    };
    settings.validate()?;
    Ok(settings)
}
