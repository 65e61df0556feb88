//! 夹具管理器
//!
//! 负责：
//! - 按请求类型解析最具体的兼容定义
//! - 每个定义只缓存一个生命周期，相关请求类型共享状态
//! - 批量 set up / tear down
//! - 通过 `FixtureResolver` 让定义在 set up 时获取其他夹具，并检测循环依赖

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::definition::{
    downcast_object, fixture, FixtureDefinition, FixtureObject, FixtureResolver,
};
use super::lifecycle::{DefinitionId, FixtureLifecycle, SharedLifecycle};
use super::types::{FixtureType, TypeHierarchy};
use crate::config::{FixtureConfig, TeardownOrder};
use crate::errors::{BoxError, FixtureError, Result};

pub struct FixtureManager {
    /// 注册顺序决定同类型定义的取舍
    definitions: Vec<Arc<dyn FixtureDefinition>>,
    hierarchy: TypeHierarchy,
    /// 生命周期缓存，按注册序号索引
    lifecycles: DashMap<DefinitionId, SharedLifecycle>,
    /// 跨线程的 set up 等待图，用于循环依赖检测
    set_up_state: Mutex<SetUpState>,
    /// 已经报告过歧义的请求类型
    reported_ambiguities: Mutex<HashSet<FixtureType>>,
    stats: InnerStats,
    config: FixtureConfig,
}

/// 内部统计信息（原子计数器），只统计生命周期缓存的查找
#[derive(Default)]
struct InnerStats {
    lifecycle_lookups: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

/// 正在进行的 set up：哪个线程持有哪些定义，哪个线程在等哪个定义
#[derive(Default)]
struct SetUpState {
    /// 每个线程持有生命周期锁的定义，按获取顺序
    stacks: HashMap<ThreadId, Vec<DefinitionId>>,
    owners: HashMap<DefinitionId, ThreadId>,
    waiting: HashMap<ThreadId, DefinitionId>,
}

impl FixtureManager {
    pub fn new(hierarchy: TypeHierarchy, definitions: Vec<Arc<dyn FixtureDefinition>>) -> Self {
        Self::with_config(hierarchy, definitions, FixtureConfig::default())
    }

    pub fn with_config(
        hierarchy: TypeHierarchy,
        definitions: Vec<Arc<dyn FixtureDefinition>>,
        config: FixtureConfig,
    ) -> Self {
        tracing::debug!(definitions = definitions.len(), "creating fixture manager");
        Self {
            definitions,
            hierarchy,
            lifecycles: DashMap::new(),
            set_up_state: Mutex::new(SetUpState::default()),
            reported_ambiguities: Mutex::new(HashSet::new()),
            stats: InnerStats::default(),
            config,
        }
    }

    pub fn builder() -> FixtureManagerBuilder {
        FixtureManagerBuilder::default()
    }

    /// 解析请求类型对应的定义序号
    ///
    /// 候选：声明类型等于请求类型或是其子类型的定义。
    /// 取舍：在没有更具体候选的定义中选最后注册的一个。
    /// 因此子类型优先于父类型，同类型时后注册者胜出，
    /// 互不相关的子类型同样由注册顺序决定。
    pub fn find_definition_id(&self, requested: FixtureType) -> Result<DefinitionId> {
        let candidates: Vec<DefinitionId> = self
            .definitions
            .iter()
            .enumerate()
            .filter(|(_, definition)| self.hierarchy.is_subtype(definition.fixture_type(), requested))
            .map(|(index, _)| DefinitionId(index))
            .collect();

        if candidates.is_empty() {
            tracing::warn!(requested = %requested, "no fixture definition registered");
            return Err(FixtureError::UnresolvedType {
                requested: requested.name(),
            });
        }

        let most_specific: Vec<DefinitionId> = candidates
            .iter()
            .copied()
            .filter(|&candidate| {
                let ty = self.type_of(candidate);
                !candidates
                    .iter()
                    .any(|&other| self.hierarchy.is_strict_subtype(self.type_of(other), ty))
            })
            .collect();

        if self.config.warn_on_ambiguity {
            let first_type = most_specific.first().map(|&id| self.type_of(id));
            let ambiguous = most_specific.iter().any(|&id| Some(self.type_of(id)) != first_type);
            // 每个请求类型只警告一次
            if ambiguous && self.reported_ambiguities.lock().insert(requested) {
                let names: Vec<&str> = most_specific.iter().map(|&id| self.type_of(id).name()).collect();
                tracing::warn!(
                    requested = %requested,
                    candidates = ?names,
                    "ambiguous fixture candidates, choosing the last registered"
                );
            }
        }

        // 子类型声明成环时没有最小元素，退回到最后一个候选
        let chosen = most_specific
            .last()
            .or_else(|| candidates.last())
            .copied()
            .ok_or(FixtureError::UnresolvedType {
                requested: requested.name(),
            })?;

        tracing::debug!(
            requested = %requested,
            fixture = self.definitions[chosen.0].name(),
            id = chosen.0,
            "resolved fixture definition"
        );
        Ok(chosen)
    }

    pub fn find_fixture_definition(&self, requested: FixtureType) -> Result<Arc<dyn FixtureDefinition>> {
        let id = self.find_definition_id(requested)?;
        Ok(self.definitions[id.0].clone())
    }

    pub fn find_fixture_definition_of<T: ?Sized + 'static>(&self) -> Result<Arc<dyn FixtureDefinition>> {
        self.find_fixture_definition(FixtureType::of::<T>())
    }

    /// 解析定义并返回其共享生命周期，首次访问时创建
    pub fn get_fixture_lifecycle(&self, requested: FixtureType) -> Result<SharedLifecycle> {
        let id = self.find_definition_id(requested)?;
        Ok(self.lifecycle_for(id))
    }

    pub fn get_fixture_lifecycle_of<T: ?Sized + 'static>(&self) -> Result<SharedLifecycle> {
        self.get_fixture_lifecycle(FixtureType::of::<T>())
    }

    fn lifecycle_for(&self, id: DefinitionId) -> SharedLifecycle {
        self.stats.lifecycle_lookups.fetch_add(1, Ordering::Relaxed);

        match self.lifecycles.entry(id) {
            Entry::Occupied(entry) => {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                let definition = self.definitions[id.0].clone();
                tracing::debug!(fixture = definition.name(), id = id.0, "creating fixture lifecycle");
                let lifecycle = Arc::new(Mutex::new(FixtureLifecycle::new(id, definition)));
                entry.insert(lifecycle.clone());
                lifecycle
            }
        }
    }

    /// 解析并 set up，已 set up 时返回现有实例
    pub fn set_up(&self, requested: FixtureType) -> Result<FixtureObject> {
        let id = self.find_definition_id(requested)?;
        let lifecycle = self.lifecycle_for(id);

        // 先登记等待并检查等待链，确认不会成环后才阻塞在生命周期锁上
        let mut guard = SetUpGuard::enter(self, id)?;
        let mut lifecycle = lifecycle.lock();
        guard.acquired();
        lifecycle.set_up(self)
    }

    pub fn set_up_type<T: ?Sized + 'static>(&self) -> Result<FixtureObject> {
        self.set_up(FixtureType::of::<T>())
    }

    /// set up 并向下转型为具体类型
    pub fn set_up_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let requested = FixtureType::of::<T>();
        let id = self.find_definition_id(requested)?;
        let object = self.set_up(requested)?;
        downcast_object::<T>(object, self.type_of(id).name())
    }

    pub fn is_set_up(&self, requested: FixtureType) -> Result<bool> {
        Ok(self.get_fixture_lifecycle(requested)?.lock().is_set_up())
    }

    /// tear down 单个类型对应的生命周期
    pub fn tear_down_type(&self, requested: FixtureType) -> Result<()> {
        let lifecycle = self.get_fixture_lifecycle(requested)?;
        let mut lifecycle = lifecycle.lock();
        lifecycle.tear_down()
    }

    /// tear down 所有已 set up 的生命周期，未 set up 的跳过
    pub fn tear_down(&self) -> Result<()> {
        let mut ids: Vec<DefinitionId> = self.lifecycles.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        if self.config.teardown_order == TeardownOrder::Reverse {
            ids.reverse();
        }

        let mut torn_down = 0usize;
        for id in ids {
            // 先克隆出 Arc，避免在执行定义时持有 DashMap 分片锁
            let Some(lifecycle) = self.lifecycles.get(&id).map(|entry| entry.value().clone()) else {
                continue;
            };
            let mut lifecycle = lifecycle.lock();
            if lifecycle.is_set_up() {
                lifecycle.tear_down()?;
                torn_down += 1;
            }
        }

        tracing::info!(torn_down, "tore down fixtures");
        Ok(())
    }

    pub fn definitions(&self) -> &[Arc<dyn FixtureDefinition>] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    /// 已创建的生命周期数量
    pub fn lifecycle_count(&self) -> usize {
        self.lifecycles.len()
    }

    /// 已报告过歧义候选的请求类型
    pub fn reported_ambiguities(&self) -> Vec<FixtureType> {
        self.reported_ambiguities.lock().iter().copied().collect()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            lifecycle_lookups: self.stats.lifecycle_lookups.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
        }
    }

    fn type_of(&self, id: DefinitionId) -> FixtureType {
        self.definitions[id.0].fixture_type()
    }
}

impl FixtureResolver for FixtureManager {
    fn resolve(&self, ty: FixtureType) -> Result<FixtureObject> {
        self.set_up(ty)
    }

    fn resolved_type(&self, ty: FixtureType) -> Result<FixtureType> {
        Ok(self.type_of(self.find_definition_id(ty)?))
    }
}

impl std::fmt::Debug for FixtureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.definitions.iter().map(|d| d.name()).collect();
        f.debug_struct("FixtureManager")
            .field("definitions", &names)
            .field("lifecycles", &self.lifecycles.len())
            .field("config", &self.config)
            .finish()
    }
}

/// 登记当前线程对某个定义的 set up：先作为等待者，取得锁后成为持有者，离开作用域时注销
struct SetUpGuard<'a> {
    manager: &'a FixtureManager,
    thread: ThreadId,
    id: DefinitionId,
    acquired: bool,
}

impl<'a> SetUpGuard<'a> {
    /// 沿"持有者在等待谁"的链走下去，回到当前线程即为循环依赖
    fn enter(manager: &'a FixtureManager, id: DefinitionId) -> Result<Self> {
        let thread = thread::current().id();
        let mut state = manager.set_up_state.lock();
        let held = state.stacks.get(&thread).cloned().unwrap_or_default();

        if held.contains(&id) {
            return Err(manager.circular_dependency(id, held.iter().copied().chain([id])));
        }

        let mut path = vec![id];
        let mut visited = HashSet::new();
        let mut target = id;
        while let Some(&owner) = state.owners.get(&target) {
            if !visited.insert(owner) {
                break;
            }
            let Some(&next) = state.waiting.get(&owner) else {
                break;
            };
            path.push(next);
            if state.owners.get(&next) == Some(&thread) {
                return Err(manager.circular_dependency(id, held.iter().copied().chain(path)));
            }
            target = next;
        }

        state.waiting.insert(thread, id);
        Ok(Self {
            manager,
            thread,
            id,
            acquired: false,
        })
    }

    fn acquired(&mut self) {
        let mut state = self.manager.set_up_state.lock();
        state.waiting.remove(&self.thread);
        state.owners.insert(self.id, self.thread);
        state.stacks.entry(self.thread).or_default().push(self.id);
        self.acquired = true;
    }
}

impl Drop for SetUpGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.manager.set_up_state.lock();
        if !self.acquired {
            state.waiting.remove(&self.thread);
            return;
        }

        // 锁可能已被其他线程取得并登记，只注销自己的持有记录
        if state.owners.get(&self.id) == Some(&self.thread) {
            state.owners.remove(&self.id);
        }
        if let Some(stack) = state.stacks.get_mut(&self.thread) {
            stack.pop();
            if stack.is_empty() {
                state.stacks.remove(&self.thread);
            }
        }
    }
}

impl FixtureManager {
    fn circular_dependency(
        &self,
        fixture: DefinitionId,
        chain: impl IntoIterator<Item = DefinitionId>,
    ) -> FixtureError {
        let fixture = self.definitions[fixture.0].name();
        let chain: Vec<&'static str> = chain
            .into_iter()
            .map(|id| self.definitions[id.0].name())
            .collect();
        tracing::warn!(fixture, chain = ?chain, "circular fixture dependency");
        FixtureError::CircularDependency { fixture, chain }
    }
}

/// 管理器统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerStats {
    /// 生命周期缓存的查找次数（不含只查定义的调用）
    pub lifecycle_lookups: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

impl ManagerStats {
    pub fn hit_rate(&self) -> f64 {
        if self.lifecycle_lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.lifecycle_lookups as f64
        }
    }
}

/// 链式构建管理器
#[derive(Default)]
pub struct FixtureManagerBuilder {
    hierarchy: TypeHierarchy,
    definitions: Vec<Arc<dyn FixtureDefinition>>,
    config: FixtureConfig,
}

impl FixtureManagerBuilder {
    /// 声明 `Sub` 是 `Sup` 的子类型
    pub fn subtype<Sub: ?Sized + 'static, Sup: ?Sized + 'static>(mut self) -> Self {
        self.hierarchy.declare::<Sub, Sup>();
        self
    }

    pub fn definition(mut self, definition: Arc<dyn FixtureDefinition>) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn fixture<T, S, D>(self, set_up_fn: S, tear_down_fn: D) -> Self
    where
        T: Send + Sync + 'static,
        S: Fn(&dyn FixtureResolver) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
        D: Fn(Arc<T>) + Send + Sync + 'static,
    {
        self.definition(fixture(set_up_fn, tear_down_fn))
    }

    pub fn config(mut self, config: FixtureConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> FixtureManager {
        FixtureManager::with_config(self.hierarchy, self.definitions, self.config)
    }
}
