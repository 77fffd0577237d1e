use serde::{Deserialize, Serialize};

pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Capacity of the bounded channel between watch handles and the reconciler.
    pub event_channel_capacity: usize,
    /// Names skipped in every directory listing.
    pub ignored_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            ignored_names: [
                ".DS_Store",
                ".Spotlight-V100",
                ".Trashes",
                ".fseventsd",
                ".TemporaryItems",
                "Thumbs.db",
                "desktop.ini",
                ".git",
                "node_modules",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            log_filter: None,
            log_dir: None,
        }
    }
}

impl SyncConfig {
    pub fn should_ignore(&self, name: &str) -> bool {
        self.ignored_names.iter().any(|ignored| ignored == name)
    }

    pub fn channel_capacity(&self) -> usize {
        self.event_channel_capacity.max(1)
    }
}

#[cfg(test)]
#[path = "../../../../tests/unit/kernel/services/ports/config.rs"]
mod tests;
