use crate::kernel::services::ports::config::SyncConfig;
use std::path::{Path, PathBuf};

const SETTINGS_DIR: &str = ".treesync";
const SETTINGS_FILE: &str = "settings.json";
const LOG_DIR: &str = "logs";

pub fn get_settings_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(SETTINGS_DIR).join(SETTINGS_FILE)
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed settings in {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Reads the workspace settings. A missing file yields the defaults.
pub fn load_config(workspace_root: &Path) -> Result<SyncConfig, SettingsError> {
    let path = get_settings_path(workspace_root);
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SyncConfig::default()),
        Err(source) => return Err(SettingsError::Read { path, source }),
    };
    serde_json::from_str(&data).map_err(|source| SettingsError::Malformed { path, source })
}

pub fn get_log_dir(config: &SyncConfig) -> Option<PathBuf> {
    if let Some(dir) = config.log_dir.as_deref() {
        return Some(PathBuf::from(dir));
    }
    get_cache_dir().map(|dir| dir.join("treesync").join(LOG_DIR))
}

pub fn ensure_log_dir(config: &SyncConfig) -> std::io::Result<PathBuf> {
    let dir = get_log_dir(config).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Cannot determine log directory",
        )
    })?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

fn get_cache_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        return std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join("Library/Caches"));
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
            return Some(PathBuf::from(xdg));
        }
        return std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".cache"));
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            return Some(PathBuf::from(local));
        }
        return std::env::var("APPDATA").ok().map(PathBuf::from);
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
#[path = "../../../../tests/unit/kernel/services/adapters/settings.rs"]
mod tests;
