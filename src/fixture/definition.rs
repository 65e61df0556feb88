//! 夹具定义
//!
//! 定义是一对 set up / tear down 操作，绑定到一个声明类型上，注册后不可变。

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use super::types::FixtureType;
use crate::errors::{BoxError, FixtureError, Result};

/// 夹具实例，类型擦除后共享
pub type FixtureObject = Arc<dyn Any + Send + Sync>;

/// set up 期间获取其他夹具的能力
pub trait FixtureResolver {
    fn resolve(&self, ty: FixtureType) -> Result<FixtureObject>;

    /// 请求类型实际解析到的定义的声明类型
    fn resolved_type(&self, ty: FixtureType) -> Result<FixtureType>;
}

impl<'a> dyn FixtureResolver + 'a {
    /// 按具体类型获取夹具并向下转型
    pub fn resolve_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let requested = FixtureType::of::<T>();
        let actual = self.resolved_type(requested)?;
        let object = self.resolve(requested)?;
        downcast_object::<T>(object, actual.name())
    }
}

/// 安全的类型转换
pub fn downcast_object<T: Send + Sync + 'static>(
    object: FixtureObject,
    actual: &'static str,
) -> Result<Arc<T>> {
    object.downcast::<T>().map_err(|_| FixtureError::TypeMismatch {
        expected: std::any::type_name::<T>(),
        actual,
    })
}

/// 由测试框架提供的夹具定义
pub trait FixtureDefinition: Send + Sync {
    /// 声明类型，用于解析
    fn fixture_type(&self) -> FixtureType;

    /// 创建新实例
    fn set_up(&self, resolver: &dyn FixtureResolver) -> Result<FixtureObject>;

    /// 销毁实例
    fn tear_down(&self, object: FixtureObject);

    fn name(&self) -> &'static str {
        self.fixture_type().name()
    }
}

/// 函数式夹具定义
pub struct FnFixtureDefinition<T, S, D> {
    set_up_fn: S,
    tear_down_fn: D,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, S, D> FnFixtureDefinition<T, S, D>
where
    T: Send + Sync + 'static,
    S: Fn(&dyn FixtureResolver) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    D: Fn(Arc<T>) + Send + Sync + 'static,
{
    pub fn new(set_up_fn: S, tear_down_fn: D) -> Self {
        Self {
            set_up_fn,
            tear_down_fn,
            _phantom: PhantomData,
        }
    }
}

impl<T, S, D> FixtureDefinition for FnFixtureDefinition<T, S, D>
where
    T: Send + Sync + 'static,
    S: Fn(&dyn FixtureResolver) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    D: Fn(Arc<T>) + Send + Sync + 'static,
{
    fn fixture_type(&self) -> FixtureType {
        FixtureType::of::<T>()
    }

    fn set_up(&self, resolver: &dyn FixtureResolver) -> Result<FixtureObject> {
        let object = (self.set_up_fn)(resolver)
            .map_err(|e| FixtureError::set_up_failed(self.name(), e))?;
        Ok(Arc::new(object))
    }

    fn tear_down(&self, object: FixtureObject) {
        match object.downcast::<T>() {
            Ok(typed) => (self.tear_down_fn)(typed),
            Err(_) => tracing::warn!(
                fixture = self.name(),
                "tear down skipped: instance has an unexpected type"
            ),
        }
    }
}

/// 便捷构造：返回可直接注册的共享定义
pub fn fixture<T, S, D>(set_up_fn: S, tear_down_fn: D) -> Arc<dyn FixtureDefinition>
where
    T: Send + Sync + 'static,
    S: Fn(&dyn FixtureResolver) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    D: Fn(Arc<T>) + Send + Sync + 'static,
{
    Arc::new(FnFixtureDefinition::new(set_up_fn, tear_down_fn))
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[derive(Debug, PartialEq)]
    struct Port(u16);

    #[test]
    fn test_fn_definition_declares_produced_type() {
        let definition = fixture(|_| Ok(Port(8080)), |_| {});
        assert_eq!(definition.fixture_type(), FixtureType::of::<Port>());
        assert!(definition.name().ends_with("Port"));
    }

    #[test]
    fn test_fn_definition_round_trips_instance_to_tear_down() {
        let torn_down = Arc::new(AtomicUsize::new(0));
        let counter = torn_down.clone();
        let definition = fixture(
            |_| Ok(Port(9000)),
            move |port: Arc<Port>| {
                counter.fetch_add(port.0 as usize, Ordering::SeqCst);
            },
        );

        let object = definition.set_up(&NoResolver).unwrap();
        assert_eq!(*downcast_object::<Port>(object.clone(), "Port").unwrap(), Port(9000));

        definition.tear_down(object);
        assert_eq!(torn_down.load(Ordering::SeqCst), 9000);
    }

    #[test]
    fn test_fn_definition_wraps_set_up_error() {
        let definition = fixture::<Port, _, _>(|_| Err("port in use".into()), |_| {});
        let err = definition.set_up(&NoResolver).unwrap_err();
        assert!(matches!(err, FixtureError::SetUpFailed { .. }));
    }

    #[test]
    fn test_downcast_mismatch() {
        let object: FixtureObject = Arc::new(Port(1));
        let err = downcast_object::<String>(object, "Port").unwrap_err();
        assert!(matches!(err, FixtureError::TypeMismatch { actual: "Port", .. }));
    }
}
