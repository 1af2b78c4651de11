//! 依赖注入容器抽象接口
//!
//! 定义来源只负责按键查找定义；可读容器在此基础上提供解析能力

use crate::definition::Definition;
use crate::resolver::{ResolveContext, ResolveOptions};
use di_common::{DependencyResult, Instance, TypeKey};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// 定义来源 trait
///
/// 按类型键查找定义，找不到时由实现者决定是否回退到父来源
pub trait DefinitionsSource: Send + Sync {
    /// 查找类型键对应的定义
    fn get_definition(&self, key: &TypeKey) -> Option<Arc<Definition>>;

    /// 所有已定义的类型键
    fn defined_types(&self) -> HashSet<TypeKey>;

    /// 是否定义了指定键
    fn is_defined(&self, key: &TypeKey) -> bool {
        self.get_definition(key).is_some()
    }
}

/// 可读容器 trait
///
/// 解析方法以 `Arc<Self>` 为接收者，使传给定义的解析器可以持有容器
pub trait ReadableContainer: DefinitionsSource {
    /// 在给定解析路径下同步解析
    fn resolve_in(
        self: Arc<Self>,
        key: TypeKey,
        options: ResolveOptions,
        context: ResolveContext,
    ) -> DependencyResult<Option<Instance>>;

    /// 在给定解析路径下异步解析
    fn resolve_async_in(
        self: Arc<Self>,
        key: TypeKey,
        options: ResolveOptions,
        context: ResolveContext,
    ) -> BoxFuture<'static, DependencyResult<Option<Instance>>>;

    /// 反射缓存概览：类型名 => 签名
    fn reflection_cache_overview(&self) -> BTreeMap<String, String>;
}

/// 空定义来源，作为定义链的终点
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyDefinitions;

impl DefinitionsSource for EmptyDefinitions {
    fn get_definition(&self, _key: &TypeKey) -> Option<Arc<Definition>> {
        None
    }

    fn defined_types(&self) -> HashSet<TypeKey> {
        HashSet::new()
    }
}
