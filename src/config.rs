//! Configuration module for watchreduce.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `WR_` and use double underscores
//! to separate nested levels:
//! - `WR_WATCH__INPUT_PATH=inbox` sets `watch.input_path`
//! - `WR_WATCH__DEBOUNCE=keyed` sets `watch.debounce`
//! - `WR_REDUCE__THREADS=8` sets `reduce.threads`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::watcher::{ChangeKind, CyclePolicy, DebounceMode};

/// Directory holding `settings.toml`, searched from the current directory upwards.
pub const CONFIG_DIR: &str = ".watchreduce";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Watch loop configuration
    #[serde(default)]
    pub watch: WatchConfig,

    /// Reduce stage configuration
    #[serde(default)]
    pub reduce: ReduceConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Directory whose entries are watched
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,

    /// Directory the map stage writes into and reducers read from
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// How raw notifications are paired into logical events
    #[serde(default)]
    pub debounce: DebounceMode,

    /// Notification kinds that trigger cycles
    #[serde(default = "default_kinds")]
    pub kinds: Vec<ChangeKind>,

    /// Whether a map failure ends the loop or only the cycle
    #[serde(default)]
    pub on_map_error: CyclePolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReduceConfig {
    /// Worker threads for the reduce pool
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Where the builtin reducers write their reports
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `watchreduce = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_input_path() -> PathBuf { PathBuf::from("input") }
fn default_output_path() -> PathBuf { PathBuf::from("output") }
fn default_kinds() -> Vec<ChangeKind> { vec![ChangeKind::Modified] }
fn default_threads() -> usize { num_cpus::get() }
fn default_report_path() -> PathBuf { PathBuf::from(CONFIG_DIR).join("reports") }
fn default_log_level() -> String { "warn".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchConfig::default(),
            reduce: ReduceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_path: default_output_path(),
            debounce: DebounceMode::default(),
            kinds: default_kinds(),
            on_map_error: CyclePolicy::default(),
        }
    }
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            report_path: default_report_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring `WR_` variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore (__) separates nested levels; single
            // underscores stay inside field names
            .merge(Env::prefixed("WR_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.watchreduce/settings.toml` from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Write default settings under `root`, returning the file path
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watch.input_path, PathBuf::from("input"));
        assert_eq!(settings.watch.kinds, vec![ChangeKind::Modified]);
        assert_eq!(settings.watch.debounce, DebounceMode::Alternation);
        assert_eq!(settings.watch.on_map_error, CyclePolicy::FailFast);
        assert!(settings.reduce.threads > 0);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[watch]
input_path = "chat/in"
output_path = "chat/out"
debounce = "keyed"
kinds = ["created", "modified"]
on_map_error = "isolate"

[reduce]
threads = 3

[logging]
default = "info"

[logging.modules]
watchreduce = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.watch.input_path, PathBuf::from("chat/in"));
        assert_eq!(settings.watch.output_path, PathBuf::from("chat/out"));
        assert_eq!(settings.watch.debounce, DebounceMode::Keyed);
        assert_eq!(
            settings.watch.kinds,
            vec![ChangeKind::Created, ChangeKind::Modified]
        );
        assert_eq!(settings.watch.on_map_error, CyclePolicy::Isolate);
        assert_eq!(settings.reduce.threads, 3);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["watchreduce"], "debug");
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[reduce]\nthreads = 16\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        // Modified value
        assert_eq!(settings.reduce.threads, 16);
        // Defaults still present
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watch, WatchConfig::default());
        assert_eq!(settings.reduce.report_path, default_report_path());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested/settings.toml");

        let mut settings = Settings::default();
        settings.watch.debounce = DebounceMode::Keyed;
        settings.reduce.threads = 2;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.watch.debounce, DebounceMode::Keyed);
        assert_eq!(loaded.reduce.threads, 2);
    }

    #[test]
    fn test_init_config_file_respects_force() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.ends_with(".watchreduce/settings.toml"));
        assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("[watch]"));
        assert!(content.contains("debounce = \"alternation\""));
    }
}
