//! 容器组合
//!
//! 把多个只读定义来源按顺序合并成一个容器，同一类型不允许在两个来源中重复定义

use crate::container::Container;
use crate::settings::ContainerSettings;
use di_abstractions::{ContainerDebugInfo, Definition, DefinitionsSource};
use di_common::{DependencyError, DependencyResult, TypeKey};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// 按顺序查找的定义来源列表
pub struct SourceList {
    sources: Vec<Arc<dyn DefinitionsSource>>,
}

impl SourceList {
    /// 检查冲突后创建
    pub fn new(sources: Vec<Arc<dyn DefinitionsSource>>) -> DependencyResult<Self> {
        let reserved = TypeKey::of::<ContainerDebugInfo>();
        let defined: Vec<HashSet<TypeKey>> = sources.iter().map(|source| source.defined_types()).collect();

        for (first, first_types) in defined.iter().enumerate() {
            for (offset, second_types) in defined[first + 1..].iter().enumerate() {
                let conflict = first_types
                    .intersection(second_types)
                    .find(|key| **key != reserved);
                if let Some(key) = conflict {
                    return Err(DependencyError::ConflictingDefinitions {
                        type_name: key.to_string(),
                        first,
                        second: first + 1 + offset,
                    });
                }
            }
        }

        Ok(Self { sources })
    }

    /// 来源数量
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// 是否没有来源
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl DefinitionsSource for SourceList {
    fn get_definition(&self, key: &TypeKey) -> Option<Arc<Definition>> {
        self.sources.iter().find_map(|source| source.get_definition(key))
    }

    fn defined_types(&self) -> HashSet<TypeKey> {
        self.sources
            .iter()
            .flat_map(|source| source.defined_types())
            .collect()
    }
}

/// 以默认设置组合定义来源
pub fn compose(sources: Vec<Arc<dyn DefinitionsSource>>) -> DependencyResult<Container> {
    compose_with(ContainerSettings::default(), sources)
}

/// 以指定设置组合定义来源
pub fn compose_with(
    settings: ContainerSettings,
    sources: Vec<Arc<dyn DefinitionsSource>>,
) -> DependencyResult<Container> {
    let list = SourceList::new(sources)?;
    debug!("组合 {} 个定义来源", list.len());
    Ok(Container::builder()
        .settings(settings)
        .parent(Arc::new(list))
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::DependencyResolver;

    struct Database;
    struct Mailer;

    #[test]
    fn test_compose_merges_sources() {
        let storage = Container::new();
        storage.define_factory(|| Database).unwrap();
        let messaging = Container::new();
        messaging.define_factory(|| Mailer).unwrap();

        let composed = compose(vec![storage.as_source(), messaging.as_source()]).unwrap();
        assert!(composed.resolve::<Database>().is_ok());
        assert!(composed.resolve::<Mailer>().is_ok());
    }

    #[test]
    fn test_conflicting_definitions_rejected() {
        let first = Container::new();
        first.define_factory(|| Database).unwrap();
        let second = Container::new();
        second.define_factory(|| Mailer).unwrap();
        let third = Container::new();
        third.define_factory(|| Database).unwrap();

        match compose(vec![first.as_source(), second.as_source(), third.as_source()]) {
            Err(DependencyError::ConflictingDefinitions {
                type_name,
                first,
                second,
            }) => {
                assert_eq!(type_name, "Database");
                assert_eq!((first, second), (0, 2));
            }
            other => panic!("期望定义冲突错误, 实际: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_debug_info_is_exempt() {
        let composed = compose(vec![Container::new().as_source(), Container::new().as_source()]).unwrap();
        let info = composed.resolve::<ContainerDebugInfo>().unwrap();
        assert!(info.defined_types.contains("ContainerDebugInfo"));
    }
}
