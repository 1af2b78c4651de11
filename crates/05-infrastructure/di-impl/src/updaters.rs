//! 容器更新器
//!
//! 在子容器中把指定类型改为单例，原容器不受影响

use crate::container::Container;
use di_abstractions::{required, Definition, DependencyResolver, ResolveOptions};
use di_common::{DependencyResult, TypeKey};
use tracing::debug;

/// 返回一个子容器，其中 `keys` 的实例只构建一次
pub fn with_singletons(container: &Container, keys: &[TypeKey]) -> DependencyResult<Container> {
    let updated = container.clone_container();
    for &key in keys {
        let base = container.clone();
        updated.define(
            key,
            Definition::singleton(Definition::factory(move || {
                required(key, base.resolve_with(key, ResolveOptions::default())?)
            })),
        )?;
    }
    debug!("创建单例子容器，单例类型数: {}", keys.len());
    Ok(updated)
}

/// 临时单例模板，每次进入都得到一组新的单例
#[derive(Debug, Clone)]
pub struct TemporarySingletons {
    container: Container,
    keys: Vec<TypeKey>,
}

impl TemporarySingletons {
    /// 为容器创建模板
    pub fn new(container: &Container, keys: impl IntoIterator<Item = TypeKey>) -> Self {
        Self {
            container: container.clone(),
            keys: keys.into_iter().collect(),
        }
    }

    /// 单例类型
    pub fn keys(&self) -> &[TypeKey] {
        &self.keys
    }

    /// 生成带有新单例的子容器
    pub fn enter(&self) -> DependencyResult<Container> {
        with_singletons(&self.container, &self.keys)
    }
}
