//! 管理器配置

pub mod loader;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::ConfigError;

pub use loader::ConfigLoader;

pub const CONFIG_FILE_NAME: &str = "fixtures.toml";
pub const CONFIG_PATH_ENV: &str = "FIXTURES_CONFIG";
pub const TEARDOWN_ORDER_ENV: &str = "FIXTURES_TEARDOWN_ORDER";
pub const WARN_ON_AMBIGUITY_ENV: &str = "FIXTURES_WARN_ON_AMBIGUITY";

/// 批量 tear down 时遍历生命周期的顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeardownOrder {
    /// 按注册序号从大到小
    #[default]
    Reverse,
    /// 按注册序号从小到大
    Registration,
}

impl FromStr for TeardownOrder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reverse" => Ok(TeardownOrder::Reverse),
            "registration" => Ok(TeardownOrder::Registration),
            _ => Err(ConfigError::InvalidValue {
                key: "teardown_order".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub teardown_order: TeardownOrder,
    /// 存在互不相关的候选子类型时输出警告
    pub warn_on_ambiguity: bool,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            teardown_order: TeardownOrder::Reverse,
            warn_on_ambiguity: true,
        }
    }
}

impl FixtureConfig {
    /// Load from the default location with environment overrides applied
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }
}
