//! Data manager configuration and loaders.
use std::env;
use std::path::PathBuf;

/// Application name used for the platform data directory when none is given.
pub const DEFAULT_APP_NAME: &str = "savedata";

/// Sub-directory of the application data directory holding record files.
pub const STORAGE_DIR_NAME: &str = "DataManager";

/// Configuration for a [`DataManager`](crate::DataManager).
#[derive(Clone, Debug)]
pub struct DataManagerConfig {
    /// Directory holding one file per record type.
    pub root_dir: PathBuf,
    /// Write through a temp file and rename it over the target.
    pub atomic_writes: bool,
    /// Capacity of the event broadcast channel.
    pub event_buffer_size: usize,
}

impl Default for DataManagerConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(DEFAULT_APP_NAME),
            atomic_writes: true,
            event_buffer_size: 64,
        }
    }
}

impl DataManagerConfig {
    /// Configuration storing records under `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn with_atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size.max(1);
        self
    }

    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `SAVE_DATA_DIR` - Directory for record files (default: platform-specific)
    /// - `SAVE_DATA_APP` - Application name for the platform data directory (default: `savedata`)
    /// - `SAVE_DATA_ATOMIC_WRITES` - Temp-file-and-rename writes (default: true)
    /// - `SAVE_DATA_EVENT_BUFFER` - Event channel capacity (default: 64)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(app) = lookup("SAVE_DATA_APP").filter(|app| !app.is_empty()) {
            config.root_dir = default_root_dir(&app);
        }

        // An explicit directory wins over the application name
        if let Some(dir) = lookup("SAVE_DATA_DIR").filter(|dir| !dir.is_empty()) {
            config.root_dir = PathBuf::from(dir);
        }

        if let Some(enabled) = parse::<bool>(lookup("SAVE_DATA_ATOMIC_WRITES")) {
            config.atomic_writes = enabled;
        }

        if let Some(size) = parse::<usize>(lookup("SAVE_DATA_EVENT_BUFFER")) {
            config.event_buffer_size = size.max(1);
        }

        config
    }
}

/// Get the platform-specific record directory for an application
///
/// Follows platform conventions:
/// - macOS: `~/Library/Application Support/<app>/DataManager`
/// - Linux: `~/.local/share/<app>/DataManager` (or `$XDG_DATA_HOME/<app>/DataManager`)
/// - Windows: `%APPDATA%\<app>\data\DataManager`
/// - Fallback: `./save_data/DataManager`
pub fn default_root_dir(app_name: &str) -> PathBuf {
    directories::ProjectDirs::from("", "", app_name)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./save_data"))
        .join(STORAGE_DIR_NAME)
}

fn parse<T>(value: Option<String>) -> Option<T>
where
    T: std::str::FromStr,
{
    value?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DataManagerConfig::from_lookup(lookup(&[]));
        assert!(config.root_dir.ends_with(STORAGE_DIR_NAME));
        assert!(config.atomic_writes);
        assert_eq!(config.event_buffer_size, 64);
    }

    #[test]
    fn test_env_overrides() {
        let config = DataManagerConfig::from_lookup(lookup(&[
            ("SAVE_DATA_DIR", "/tmp/saves"),
            ("SAVE_DATA_APP", "ignored-app"),
            ("SAVE_DATA_ATOMIC_WRITES", "false"),
            ("SAVE_DATA_EVENT_BUFFER", "0"),
        ]));
        assert_eq!(config.root_dir, PathBuf::from("/tmp/saves"));
        assert!(!config.atomic_writes);
        assert_eq!(config.event_buffer_size, 1);
    }

    #[test]
    fn test_app_name_and_bad_values() {
        let config = DataManagerConfig::from_lookup(lookup(&[
            ("SAVE_DATA_APP", "goods-demo"),
            ("SAVE_DATA_ATOMIC_WRITES", "maybe"),
        ]));
        assert_eq!(config.root_dir, default_root_dir("goods-demo"));
        assert!(config.atomic_writes);
    }

    #[test]
    fn test_builder_setters() {
        let config = DataManagerConfig::new("/data")
            .with_atomic_writes(false)
            .with_event_buffer_size(8)
            .with_root_dir("/other");
        assert_eq!(config.root_dir, PathBuf::from("/other"));
        assert!(!config.atomic_writes);
        assert_eq!(config.event_buffer_size, 8);
    }
}
