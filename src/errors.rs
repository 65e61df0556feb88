use thiserror::Error;

/// 库内统一的结果类型
pub type Result<T> = std::result::Result<T, FixtureError>;

/// 夹具创建过程中由定义方返回的错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum FixtureError {
    /// 没有任何已注册的定义与请求类型兼容（缺少注册，属于配置错误）
    #[error("No fixture definition registered for type `{requested}`")]
    UnresolvedType { requested: &'static str },

    /// 在未 set up 的生命周期上调用 tear down
    #[error("Fixture `{fixture}` is not set up")]
    InvalidState { fixture: &'static str },

    #[error("Failed to set up fixture `{fixture}`: {source}")]
    SetUpFailed {
        fixture: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Circular fixture dependency at `{fixture}` (chain: {})", .chain.join(" -> "))]
    CircularDependency {
        fixture: &'static str,
        chain: Vec<&'static str>,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },
}

impl FixtureError {
    /// 包装定义方 set_up 返回的任意错误
    pub fn set_up_failed(fixture: &'static str, source: impl Into<BoxError>) -> Self {
        FixtureError::SetUpFailed {
            fixture,
            source: source.into(),
        }
    }
}
