//! Configuration management for the promshard daemon

use promshard_core::{ConfigKind, GeneratorConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration for the daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Settings of the builders and caches
    pub generator: GeneratorConfig,

    /// When each kind is regenerated
    pub scheduler: SchedulerConfig,

    /// Where pools, jobs, rules and send groups are read from
    pub inventory: InventoryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scheduling of generation cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Kinds that get a scheduler task
    pub enabled_kinds: Vec<ConfigKind>,

    /// Regenerate at least this often even without inventory changes (seconds)
    pub full_refresh_interval_seconds: u64,

    /// Delay before retrying a cycle that did not commit (seconds)
    pub retry_delay_seconds: u64,
}

/// Inventory source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// YAML inventory document
    pub path: PathBuf,

    /// How often the file's modification time is checked (seconds)
    pub reload_interval_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Show target in logs
    pub show_target: bool,

    /// Show thread IDs in logs
    pub show_thread_ids: bool,

    /// Show line numbers in logs
    pub show_line_numbers: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled_kinds: ConfigKind::ALL.to_vec(),
            full_refresh_interval_seconds: 300,
            retry_delay_seconds: 10,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/promshard/inventory.yaml"),
            reload_interval_seconds: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
        }
    }
}

impl SchedulerConfig {
    pub fn full_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.full_refresh_interval_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

impl InventoryConfig {
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_seconds)
    }
}

impl AgentConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::AgentError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AgentConfig = serde_yaml::from_str(&content)
            .map_err(|e| crate::AgentError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> crate::Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| crate::AgentError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| crate::AgentError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.generator.validate().map_err(|e| {
            crate::AgentError::Config(format!("Generator config validation failed: {}", e))
        })?;

        if self.scheduler.enabled_kinds.is_empty() {
            return Err(crate::AgentError::Config(
                "At least one config kind must be enabled".to_string(),
            ));
        }

        if self.scheduler.full_refresh_interval_seconds == 0 {
            return Err(crate::AgentError::Config(
                "Full refresh interval must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.retry_delay_seconds == 0 {
            return Err(crate::AgentError::Config(
                "Retry delay must be greater than 0".to_string(),
            ));
        }

        if self.inventory.path.as_os_str().is_empty() {
            return Err(crate::AgentError::Config(
                "Inventory path cannot be empty".to_string(),
            ));
        }

        if self.inventory.reload_interval_seconds == 0 {
            return Err(crate::AgentError::Config(
                "Inventory reload interval must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(crate::AgentError::Config(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            _ => {
                return Err(crate::AgentError::Config(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }
}
