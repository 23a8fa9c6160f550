use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read configuration file: {source}")]
    ReadError { source: std::io::Error },

    #[error("Failed to parse configuration: {source}")]
    ParseError { source: toml::de::Error },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError { source: toml::ser::Error },

    #[error("Failed to write configuration file: {source}")]
    WriteError { source: std::io::Error },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub baud: u32,
    pub read_timeout_ms: u64,
    /// Journal every (channel, command, response) exchange to the log.
    pub journal: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            read_timeout_ms: 500,
            journal: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisConfig {
    pub wire_name: String,
    pub units: String,
    pub speed_min: f64,
    pub speed_max: f64,
    pub max_position_error: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub poll_interval_ms: u64,
    pub remaining_update_interval_ms: u64,
    /// Acceptable difference between feedback and commanded position.
    pub in_position_window: f64,
    /// Scanhead gearbox limit, deg/sec.
    pub max_scan_speed: f64,
    pub approach_scan_speed: f64,
    pub approach_index_speed: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            remaining_update_interval_ms: 1000,
            in_position_window: 0.01,
            max_scan_speed: 11.4,
            approach_scan_speed: 6.0,
            approach_index_speed: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub feedback_interval_ms: u64,
    pub fault_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            feedback_interval_ms: 100,
            fault_interval_ms: 750,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    pub serial: SerialConfig,
    pub scanhead: AxisConfig,
    pub pusher: AxisConfig,
    pub scan: ScanConfig,
    pub monitor: MonitorConfig,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            scanhead: AxisConfig {
                wire_name: "SCANHEAD".to_string(),
                units: "deg".to_string(),
                speed_min: 0.5,
                speed_max: 15.0,
                max_position_error: 0.22,
            },
            pusher: AxisConfig {
                wire_name: "PUSHER".to_string(),
                units: "in".to_string(),
                speed_min: 0.05,
                speed_max: 1.0,
                max_position_error: 1.0,
            },
            scan: ScanConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

#[derive(Debug)]
pub struct ConfigOptions {
    pub config_path: PathBuf,
    pub create_if_missing: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            create_if_missing: true,
        }
    }
}

impl ConfigOptions {
    pub fn default_config_path() -> PathBuf {
        std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("rig_config.toml"))
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    options: ConfigOptions,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            options: ConfigOptions::default(),
        }
    }

    pub fn with_options(options: ConfigOptions) -> Self {
        Self { options }
    }

    pub fn load(&self) -> anyhow::Result<RigConfig> {
        let config_path = self.options.config_path.clone();

        if !config_path.exists() {
            if self.options.create_if_missing {
                let default_config = RigConfig::default();
                self.save(&default_config)
                    .context("Failed to save default config")?;
                return Ok(default_config);
            } else {
                return Err(ConfigError::FileNotFound { path: config_path }.into());
            }
        }

        let content =
            fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError { source: e })?;

        let config: RigConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError { source: e })?;

        Ok(config)
    }

    pub fn save(&self, config: &RigConfig) -> anyhow::Result<()> {
        let config_path = &self.options.config_path;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(config_path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

pub fn init_config() -> anyhow::Result<(ConfigManager, RigConfig)> {
    let manager = ConfigManager::new();
    let config = manager.load()?;
    Ok((manager, config))
}

pub fn create_default_config<P: AsRef<Path>>(path: Option<P>) -> anyhow::Result<()> {
    let config_path = path
        .map(|p| p.as_ref().to_path_buf())
        .unwrap_or_else(ConfigOptions::default_config_path);

    let options = ConfigOptions {
        config_path,
        create_if_missing: true,
    };

    let manager = ConfigManager::with_options(options);
    manager.save(&RigConfig::default())?;

    Ok(())
}
