//! 单个定义的惰性生命周期
//!
//! 状态只有 NotSetUp / SetUp 两种，由 `instance` 是否存在表示，
//! 因此"实例存在当且仅当已 set up"天然成立。

use std::sync::Arc;

use parking_lot::Mutex;

use super::definition::{FixtureDefinition, FixtureObject, FixtureResolver};
use super::types::FixtureType;
use crate::errors::{FixtureError, Result};

/// 定义的注册序号，作为生命周期缓存的稳定键
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DefinitionId(pub usize);

/// 管理器缓存中共享的生命周期
pub type SharedLifecycle = Arc<Mutex<FixtureLifecycle>>;

pub struct FixtureLifecycle {
    id: DefinitionId,
    definition: Arc<dyn FixtureDefinition>,
    instance: Option<FixtureObject>,
}

impl FixtureLifecycle {
    pub fn new(id: DefinitionId, definition: Arc<dyn FixtureDefinition>) -> Self {
        Self {
            id,
            definition,
            instance: None,
        }
    }

    /// 幂等：已 set up 时直接返回现有实例，不再调用定义
    pub fn set_up(&mut self, resolver: &dyn FixtureResolver) -> Result<FixtureObject> {
        if let Some(instance) = &self.instance {
            return Ok(instance.clone());
        }

        let instance = self.definition.set_up(resolver)?;
        tracing::info!(fixture = self.definition.name(), id = self.id.0, "fixture set up");
        self.instance = Some(instance.clone());
        Ok(instance)
    }

    pub fn tear_down(&mut self) -> Result<()> {
        let instance = self.instance.take().ok_or(FixtureError::InvalidState {
            fixture: self.definition.name(),
        })?;

        self.definition.tear_down(instance);
        tracing::info!(fixture = self.definition.name(), id = self.id.0, "fixture torn down");
        Ok(())
    }

    pub fn is_set_up(&self) -> bool {
        self.instance.is_some()
    }

    pub fn instance(&self) -> Option<FixtureObject> {
        self.instance.clone()
    }

    pub fn definition(&self) -> &Arc<dyn FixtureDefinition> {
        &self.definition
    }

    pub fn definition_id(&self) -> DefinitionId {
        self.id
    }

    pub fn fixture_type(&self) -> FixtureType {
        self.definition.fixture_type()
    }
}

impl std::fmt::Debug for FixtureLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureLifecycle")
            .field("id", &self.id)
            .field("fixture", &self.definition.name())
            .field("is_set_up", &self.is_set_up())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::definition::fixture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoResolver;

    impl FixtureResolver for NoResolver {
        fn resolve(&self, ty: FixtureType) -> Result<FixtureObject> {
            Err(FixtureError::UnresolvedType {
                requested: ty.name(),
            })
        }

        fn resolved_type(&self, ty: FixtureType) -> Result<FixtureType> {
            Err(FixtureError::UnresolvedType {
                requested: ty.name(),
            })
        }
    }

    struct Counted;

    fn counting_lifecycle(set_ups: Arc<AtomicUsize>, tear_downs: Arc<AtomicUsize>) -> FixtureLifecycle {
        let definition = fixture(
            move |_| {
                set_ups.fetch_add(1, Ordering::SeqCst);
                Ok(Counted)
            },
            move |_| {
                tear_downs.fetch_add(1, Ordering::SeqCst);
            },
        );
        FixtureLifecycle::new(DefinitionId(0), definition)
    }

    #[test]
    fn test_initial_state_is_not_set_up() {
        let lifecycle = counting_lifecycle(Default::default(), Default::default());
        assert!(!lifecycle.is_set_up());
        assert!(lifecycle.instance().is_none());
    }

    #[test]
    fn test_set_up_is_idempotent() {
        let set_ups = Arc::new(AtomicUsize::new(0));
        let mut lifecycle = counting_lifecycle(set_ups.clone(), Default::default());

        let first = lifecycle.set_up(&NoResolver).unwrap();
        assert!(lifecycle.is_set_up());
        let second = lifecycle.set_up(&NoResolver).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(set_ups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tear_down_resets_state() {
        let tear_downs = Arc::new(AtomicUsize::new(0));
        let mut lifecycle = counting_lifecycle(Default::default(), tear_downs.clone());

        lifecycle.set_up(&NoResolver).unwrap();
        lifecycle.tear_down().unwrap();

        assert!(!lifecycle.is_set_up());
        assert!(lifecycle.instance().is_none());
        assert_eq!(tear_downs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tear_down_without_set_up_is_invalid_state() {
        let tear_downs = Arc::new(AtomicUsize::new(0));
        let mut lifecycle = counting_lifecycle(Default::default(), tear_downs.clone());

        let result = lifecycle.tear_down();

        assert!(matches!(result, Err(FixtureError::InvalidState { .. })));
        assert_eq!(tear_downs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_double_tear_down_is_invalid_state() {
        let mut lifecycle = counting_lifecycle(Default::default(), Default::default());
        lifecycle.set_up(&NoResolver).unwrap();
        lifecycle.tear_down().unwrap();
        assert!(matches!(lifecycle.tear_down(), Err(FixtureError::InvalidState { .. })));
    }

    #[test]
    fn test_set_up_after_tear_down_creates_new_instance() {
        let set_ups = Arc::new(AtomicUsize::new(0));
        let mut lifecycle = counting_lifecycle(set_ups.clone(), Default::default());

        let first = lifecycle.set_up(&NoResolver).unwrap();
        lifecycle.tear_down().unwrap();
        let second = lifecycle.set_up(&NoResolver).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(set_ups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_set_up_stays_not_set_up() {
        let definition = fixture::<Counted, _, _>(|_| Err("boom".into()), |_| {});
        let mut lifecycle = FixtureLifecycle::new(DefinitionId(3), definition);

        assert!(matches!(
            lifecycle.set_up(&NoResolver),
            Err(FixtureError::SetUpFailed { .. })
        ));
        assert!(!lifecycle.is_set_up());
        assert_eq!(lifecycle.definition_id(), DefinitionId(3));
    }
}
