//! Runtime settings.
//!
//! Defaults match the CRM's behaviour; each value can be overridden from the
//! environment with the `CRM_` prefix (`CRM_DB_PATH`, `CRM_RETRY_ATTEMPTS`,
//! ...). CLI flags override both.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    /// Key the store record lives under.
    pub namespace: String,
    pub scroll_delay_ms: u64,
    pub scroll_attempts: u32,
    pub retry_delay_ms: u64,
    pub retry_attempts: u32,
    pub indicator_dismiss_ms: u64,
    /// Host a page must be on before we try to extract from it.
    pub app_host: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/close.sqlite"),
            namespace: "close_data".to_string(),
            scroll_delay_ms: 300,
            scroll_attempts: 10,
            retry_delay_ms: 500,
            retry_attempts: 5,
            indicator_dismiss_ms: 2000,
            app_host: "close.com".to_string(),
        }
    }
}

impl Settings {
    /// Defaults overlaid with `CRM_*` environment variables. A malformed
    /// variable is an error naming the offending key.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env(Environment::with_prefix("CRM"))
    }

    fn from_env(env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn indicator_dismiss(&self) -> Duration {
        Duration::from_millis(self.indicator_dismiss_ms)
    }
}
