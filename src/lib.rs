//! 测试夹具生命周期管理器
//!
//! 按类型解析已注册的夹具定义（子类型优先），为每个定义惰性创建共享实例，
//! 并在使用后统一销毁。

pub mod config;
pub mod errors;
pub mod fixture;

pub use config::{ConfigLoader, FixtureConfig, TeardownOrder};
pub use errors::{ConfigError, FixtureError, Result};
pub use fixture::{
    fixture, DefinitionId, FixtureDefinition, FixtureLifecycle, FixtureManager,
    FixtureManagerBuilder, FixtureObject, FixtureResolver, FixtureType, FnFixtureDefinition,
    ManagerStats, SharedLifecycle, TypeHierarchy,
};

/// 为测试进程安装 fmt 日志订阅器，级别由 `RUST_LOG` 控制；重复调用无副作用
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
