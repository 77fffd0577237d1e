//! Service adapters: OS/runtime specific implementations (IO/async).

pub mod file;
pub mod settings;

pub use file::{LocalFsProvider, MemoryFsProvider};
pub use settings::{ensure_log_dir, get_log_dir, get_settings_path, load_config, SettingsError};
