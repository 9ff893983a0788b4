//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Effective metadata-store endpoint: the `meta` section when present,
    /// otherwise the target endpoint with the default metadata database.
    pub fn meta_config(&self) -> MetaConfig {
        self.meta.clone().unwrap_or_else(|| MetaConfig {
            host: self.target.host.clone(),
            port: self.target.port,
            user: self.target.user.clone(),
            password: self.target.password.clone(),
            database: "_oracle_mysql_migrate".to_string(),
            ssl_mode: self.target.ssl_mode.clone(),
        })
    }
}
