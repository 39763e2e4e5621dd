//! Configuration and log file paths

use std::io;
use std::path::PathBuf;

/// Application name used for platform directories
const APP_NAME: &str = "jstestnet-runner";

/// File name of the webapp log when none is configured
pub const DEFAULT_WEBAPP_LOG: &str = "jstestnetlib-webapp.log";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/jstestnet-runner/`
/// - macOS: `~/Library/Application Support/jstestnet-runner/`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Default location of the webapp log, a fixed name in the temp directory
pub fn default_webapp_log() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_WEBAPP_LOG)
}

/// Ensure the parent directory of `path` exists
pub fn ensure_parent_dir(path: &std::path::Path) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_webapp_log_in_temp_dir() {
        let path = default_webapp_log();
        assert!(path.starts_with(std::env::temp_dir()));
        assert!(path.ends_with(DEFAULT_WEBAPP_LOG));
    }

    #[test]
    fn test_ensure_parent_dir_creates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("nested").join("dir").join("app.log");
        ensure_parent_dir(&log).unwrap();
        assert!(log.parent().unwrap().is_dir());
    }
}
