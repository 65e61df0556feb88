//! 显式类型层级
//!
//! Rust 没有运行时的继承关系，因此每个类型用 `TypeId` 标记，
//! 子类型关系由调用方显式声明。`dyn Trait` 也可以作为抽象的父类型使用。

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// 类型标记：`TypeId` 加上用于日志和错误信息的类型名
#[derive(Clone, Copy)]
pub struct FixtureType {
    id: TypeId,
    name: &'static str,
}

impl FixtureType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for FixtureType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FixtureType {}

impl Hash for FixtureType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for FixtureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for FixtureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 子类型关系表，只记录直接父类型
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    supertypes: HashMap<FixtureType, Vec<FixtureType>>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明 `Sub` 是 `Sup` 的直接子类型
    pub fn declare<Sub: ?Sized + 'static, Sup: ?Sized + 'static>(&mut self) -> &mut Self {
        self.declare_types(FixtureType::of::<Sub>(), FixtureType::of::<Sup>())
    }

    pub fn declare_types(&mut self, sub: FixtureType, sup: FixtureType) -> &mut Self {
        let parents = self.supertypes.entry(sub).or_default();
        if sub != sup && !parents.contains(&sup) {
            parents.push(sup);
        }
        self
    }

    /// 自反且传递：任何类型都是自身的子类型
    pub fn is_subtype(&self, sub: FixtureType, sup: FixtureType) -> bool {
        if sub == sup {
            return true;
        }

        let mut visited = HashSet::new();
        let mut pending = vec![sub];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(parents) = self.supertypes.get(&current) {
                for &parent in parents {
                    if parent == sup {
                        return true;
                    }
                    pending.push(parent);
                }
            }
        }
        false
    }

    pub fn is_strict_subtype(&self, sub: FixtureType, sup: FixtureType) -> bool {
        sub != sup && self.is_subtype(sub, sup)
    }

    pub fn direct_supertypes(&self, ty: FixtureType) -> &[FixtureType] {
        self.supertypes.get(&ty).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Collection {}
    trait List {}
    struct ArrayList;
    struct Text;

    fn hierarchy() -> TypeHierarchy {
        let mut h = TypeHierarchy::new();
        h.declare::<ArrayList, dyn List>()
            .declare::<dyn List, dyn Collection>();
        h
    }

    #[test]
    fn test_subtype_is_reflexive() {
        let h = TypeHierarchy::new();
        assert!(h.is_subtype(FixtureType::of::<Text>(), FixtureType::of::<Text>()));
        assert!(!h.is_strict_subtype(FixtureType::of::<Text>(), FixtureType::of::<Text>()));
    }

    #[test]
    fn test_subtype_is_transitive() {
        let h = hierarchy();
        let array_list = FixtureType::of::<ArrayList>();
        assert!(h.is_subtype(array_list, FixtureType::of::<dyn List>()));
        assert!(h.is_subtype(array_list, FixtureType::of::<dyn Collection>()));
        assert!(!h.is_subtype(FixtureType::of::<dyn Collection>(), array_list));
        assert!(!h.is_subtype(array_list, FixtureType::of::<Text>()));
    }

    #[test]
    fn test_cyclic_declarations_terminate() {
        let mut h = TypeHierarchy::new();
        h.declare::<ArrayList, Text>().declare::<Text, ArrayList>();
        assert!(!h.is_subtype(FixtureType::of::<ArrayList>(), FixtureType::of::<dyn List>()));
    }

    #[test]
    fn test_duplicate_declaration_is_ignored() {
        let mut h = TypeHierarchy::new();
        h.declare::<ArrayList, dyn List>().declare::<ArrayList, dyn List>();
        assert_eq!(h.direct_supertypes(FixtureType::of::<ArrayList>()).len(), 1);
    }
}
