use crate::domain::console;
use crate::domain::models::KnownHub;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "lego_hub_remote".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Scanning
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    #[serde(default = "default_false")]
    pub show_unnamed_devices: bool,
    #[serde(default = "default_false")]
    pub pybricks_only: bool,

    // Hub Program
    /// Precompiled program blob to upload on connect; when unset the bundled
    /// gateway source is pasted into the hub's REPL
    #[serde(default)]
    pub program_path: Option<String>,
    #[serde(default = "default_program_start_timeout_ms")]
    pub program_start_timeout_ms: u64,

    // Connection
    #[serde(default = "default_false")]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub last_connected_hub: Option<KnownHub>,

    // UI
    #[serde(default = "default_true")]
    pub dark_mode: bool,
    #[serde(default = "default_console_capacity")]
    pub console_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            scan_timeout_secs: default_scan_timeout_secs(),
            show_unnamed_devices: false,
            pybricks_only: false,
            program_path: None,
            program_start_timeout_ms: default_program_start_timeout_ms(),
            auto_reconnect: false,
            last_connected_hub: None,
            dark_mode: true,
            console_capacity: default_console_capacity(),
        }
    }
}

fn default_scan_timeout_secs() -> u64 {
    4
}
fn default_program_start_timeout_ms() -> u64 {
    5000
}
fn default_console_capacity() -> usize {
    console::DEFAULT_CAPACITY
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load settings from an explicit file, falling back to defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("Using default settings ({})", e);
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("LegoHubRemote");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn set_last_connected_hub(&mut self, hub: KnownHub) -> anyhow::Result<()> {
        if self.settings.last_connected_hub.as_ref() != Some(&hub) {
            self.settings.last_connected_hub = Some(hub);
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "lego_hub_remote_{}_{}.json",
            name,
            std::process::id()
        ));
        path
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.scan_timeout_secs, 4);
        assert_eq!(settings.program_start_timeout_ms, 5000);
        assert!(settings.program_path.is_none());
        assert!(settings.dark_mode);
        assert_eq!(settings.log_settings.level, "info");
        assert_eq!(settings.console_capacity, console::DEFAULT_CAPACITY);
    }

    #[test]
    fn test_partial_log_settings() {
        let settings: Settings =
            serde_json::from_str(r#"{"log_settings": {"level": "debug"}, "pybricks_only": true}"#)
                .unwrap();
        assert_eq!(settings.log_settings.level, "debug");
        assert!(settings.log_settings.file_logging_enabled);
        assert!(settings.pybricks_only);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let path = temp_settings_path("invalid");
        fs::write(&path, "not json").unwrap();
        let service = SettingsService::with_path(path.clone());
        assert_eq!(service.get().scan_timeout_secs, 4);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_save_and_reload_last_hub() {
        let path = temp_settings_path("reload");
        let mut service = SettingsService::with_path(path.clone());
        service
            .set_last_connected_hub(KnownHub {
                id: "hub-1".to_string(),
                name: "Truck".to_string(),
            })
            .unwrap();

        let reloaded = SettingsService::with_path(path.clone());
        assert_eq!(
            reloaded.get().last_connected_hub.as_ref().map(|h| h.name.as_str()),
            Some("Truck")
        );
        let _ = fs::remove_file(path);
    }
}
