//! 夹具生命周期管理
//!
//! 请求类型 → 解析定义 → 查找或创建生命周期 → 执行（或跳过）实际的创建与销毁。

pub mod definition;
pub mod lifecycle;
pub mod manager;
pub mod types;

pub use definition::{fixture, FixtureDefinition, FixtureObject, FixtureResolver, FnFixtureDefinition};
pub use lifecycle::{DefinitionId, FixtureLifecycle, SharedLifecycle};
pub use manager::{FixtureManager, FixtureManagerBuilder, ManagerStats};
pub use types::{FixtureType, TypeHierarchy};
