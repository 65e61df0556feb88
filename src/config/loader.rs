use std::{collections::HashMap, env, fs, path::PathBuf};

use super::{
    FixtureConfig, CONFIG_FILE_NAME, CONFIG_PATH_ENV, TEARDOWN_ORDER_ENV, WARN_ON_AMBIGUITY_ENV,
};
use crate::errors::ConfigError;

/// Configuration loader responsible for loading config from a TOML file and environment
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader that looks at `$FIXTURES_CONFIG` or `./fixtures.toml`
    pub fn new() -> Self {
        Self { path: None }
    }

    /// Create a loader with an explicit config file path (for testing)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Load configuration: file first, then environment overrides
    pub fn load(&self) -> Result<FixtureConfig, ConfigError> {
        let config = self.load_file()?;
        Self::apply_env(config, &Self::collect_env_vars())
    }

    /// Parse configuration from TOML text, without environment overrides
    pub fn load_from_str(content: &str) -> Result<FixtureConfig, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlParse("<inline>".to_string(), e))
    }

    fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_NAME))
    }

    fn load_file(&self) -> Result<FixtureConfig, ConfigError> {
        let path = self.config_path();
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(FixtureConfig::default());
        }

        let shown = path.display().to_string();
        let content =
            fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(shown.clone(), e))?;
        let config = toml::from_str(&content).map_err(|e| ConfigError::TomlParse(shown.clone(), e))?;
        tracing::info!(path = %shown, "loaded fixture config");
        Ok(config)
    }

    fn collect_env_vars() -> HashMap<String, String> {
        [TEARDOWN_ORDER_ENV, WARN_ON_AMBIGUITY_ENV]
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect()
    }

    /// Apply environment overrides on top of file values
    pub fn apply_env(
        mut config: FixtureConfig,
        env_map: &HashMap<String, String>,
    ) -> Result<FixtureConfig, ConfigError> {
        if let Some(order) = env_map.get(TEARDOWN_ORDER_ENV) {
            config.teardown_order = order.parse()?;
        }

        if let Some(flag) = env_map.get(WARN_ON_AMBIGUITY_ENV) {
            config.warn_on_ambiguity = match flag.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: WARN_ON_AMBIGUITY_ENV.to_string(),
                        value: flag.clone(),
                    })
                }
            };
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
