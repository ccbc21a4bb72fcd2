//! Platform-specific configuration paths.
//!
//! - Linux: `~/.config/tessel/`
//! - macOS: `~/Library/Application Support/tessel/`
//! - Windows: `%APPDATA%\tessel\`

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Application name used for directory paths.
const APP_NAME: &str = "tessel";

/// File name of the engine configuration.
pub const CONFIG_FILE_NAME: &str = "tessel.toml";

/// Returns the user configuration directory.
///
/// Falls back to the current directory if the platform directory cannot be
/// determined.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path of the user configuration file.
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Create the user configuration directory if it does not exist.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    Ok(dir)
}

/// Locate a configuration file.
///
/// Searches `tessel.toml` in `working_dir` first, then the user
/// configuration file.
pub fn find_config(working_dir: &Path) -> Option<PathBuf> {
    let local = working_dir.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    let user = default_config_path();
    user.is_file().then_some(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_end_with_app_name() {
        assert!(config_dir().ends_with(APP_NAME));
        assert!(default_config_path().ends_with(Path::new(APP_NAME).join(CONFIG_FILE_NAME)));
    }

    #[test]
    fn test_find_config_prefers_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&local, "").unwrap();
        assert_eq!(find_config(dir.path()), Some(local));
    }
}
