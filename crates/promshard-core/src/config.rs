//! Configuration for configuration generation
//!
//! Every option the builders and caches consult lives in [`GeneratorConfig`]
//! as a named field with a default. Sources are layered with the following
//! precedence: environment variables (highest), configuration file, defaults
//! (lowest).

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at a configuration file
pub const CONFIG_PATH_ENV: &str = "PROMSHARD_CONFIG";

/// Settings consumed by the builders and the generation caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Directory receiving generated artifacts and webhook side files
    pub config_dir: PathBuf,

    /// Discovery API endpoint used to synthesize HTTP service discovery URLs.
    /// Jobs using HTTP discovery are skipped while this is unset.
    pub http_sd_api_base: Option<String>,

    /// Endpoint that alert routers call back into; the send group id is
    /// appended as a query parameter
    pub webhook_callback_base: String,

    /// Mirror every generated document to `config_dir`
    pub write_files: bool,

    /// Remote read/write timeout used when a pool leaves it at 0
    pub default_remote_timeout_seconds: u64,

    /// Discovery refresh interval used when a job leaves it at 0
    pub default_refresh_interval_seconds: u64,

    /// Duration substituted for unparsable router and rule durations
    pub fallback_duration_seconds: u64,
}

impl GeneratorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Configuration file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&config_path).required(false));
        } else {
            for path in &["./promshard.yaml", "/etc/promshard/generator.yaml"] {
                builder = builder.add_source(config::File::with_name(path).required(false));
            }
        }

        // PROMSHARD_CONFIG_DIR, PROMSHARD_HTTP_SD_API_BASE, ...
        builder = builder.add_source(
            config::Environment::with_prefix("PROMSHARD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Load configuration from a specific file layered over the defaults
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path.as_ref()));

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.config_dir.as_os_str().is_empty() {
            return Err(crate::Error::config("config_dir cannot be empty"));
        }

        if let Some(base) = &self.http_sd_api_base {
            url::Url::parse(base).map_err(|e| {
                crate::Error::config(format!("Invalid http_sd_api_base '{}': {}", base, e))
            })?;
        }

        url::Url::parse(&self.webhook_callback_base).map_err(|e| {
            crate::Error::config(format!(
                "Invalid webhook_callback_base '{}': {}",
                self.webhook_callback_base, e
            ))
        })?;

        if self.fallback_duration_seconds == 0 {
            return Err(crate::Error::config("fallback_duration_seconds must be > 0"));
        }

        Ok(())
    }

    /// Duration substituted for unparsable durations
    pub fn fallback_duration(&self) -> Duration {
        Duration::from_secs(self.fallback_duration_seconds)
    }

    /// Path of the side file holding a send group's webhook URL
    pub fn webhook_url_path(&self, send_group_id: crate::RecordId) -> PathBuf {
        self.config_dir
            .join(format!("webhook_url_{}.txt", send_group_id))
    }

    /// Path of the artifact generated for one `(pool, instance)` pair
    pub fn artifact_path(&self, kind: crate::ConfigKind, pool: &str, instance: &str) -> PathBuf {
        self.config_dir.join(format!(
            "{}_{}_{}.yaml",
            kind.artifact_prefix(),
            sanitize_file_component(pool),
            sanitize_file_component(instance)
        ))
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("./generated"),
            http_sd_api_base: None,
            webhook_callback_base: "http://127.0.0.1:8080/api/v1/alerts/webhook".to_string(),
            write_files: true,
            default_remote_timeout_seconds: 30,
            default_refresh_interval_seconds: 60,
            fallback_duration_seconds: 5,
        }
    }
}

/// Replace path separators and port colons so one value maps to one file name
fn sanitize_file_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}
