//! 依赖解析抽象接口
//!
//! 提供解析选项、解析上下文以及交给定义和工厂使用的解析器

use crate::container::ReadableContainer;
use di_common::{DependencyError, DependencyResult, Instance, TypeKey};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// 解析选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// 是否把失败转换为缺省结果
    pub suppress_error: bool,
    /// 是否跳过已注册的定义，直接反射构建
    pub skip_definitions: bool,
}

impl ResolveOptions {
    /// 抑制错误的选项
    pub const fn suppressed() -> Self {
        Self {
            suppress_error: true,
            skip_definitions: false,
        }
    }

    /// 跳过定义的选项
    pub const fn skipping_definitions() -> Self {
        Self {
            suppress_error: false,
            skip_definitions: true,
        }
    }
}

struct Frame {
    key: TypeKey,
    reflected: bool,
    parent: Option<Arc<Frame>>,
}

/// 解析上下文
///
/// 记录当前解析路径，用于检测循环依赖和限制解析深度。
/// 上下文是不可变链表，克隆开销很小，可以被异步 future 持有
#[derive(Clone, Default)]
pub struct ResolveContext {
    head: Option<Arc<Frame>>,
    depth: usize,
}

impl ResolveContext {
    /// 创建新的解析上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前解析深度
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 进入一个键的解析，超过最大深度时报错
    pub fn enter(&self, key: TypeKey, max_depth: usize) -> DependencyResult<Self> {
        if self.depth >= max_depth {
            return Err(DependencyError::RecursiveDefinition {
                dependency_chain: self.describe_chain(key),
            });
        }
        Ok(Self {
            head: Some(Arc::new(Frame {
                key,
                reflected: false,
                parent: self.head.clone(),
            })),
            depth: self.depth + 1,
        })
    }

    /// 标记当前键正在被反射构建，同一类型在路径上再次出现时报错
    pub fn push_type(&self, key: TypeKey) -> DependencyResult<Self> {
        if self.is_reflecting(&key) {
            return Err(DependencyError::RecursiveDefinition {
                dependency_chain: self.describe_chain(key),
            });
        }
        let (parent, depth) = match &self.head {
            Some(frame) if frame.key == key && !frame.reflected => (frame.parent.clone(), self.depth),
            _ => (self.head.clone(), self.depth + 1),
        };
        Ok(Self {
            head: Some(Arc::new(Frame {
                key,
                reflected: true,
                parent,
            })),
            depth,
        })
    }

    /// 键是否正在路径上被反射构建
    pub fn is_reflecting(&self, key: &TypeKey) -> bool {
        self.frames().any(|frame| frame.reflected && frame.key == *key)
    }

    /// 键在解析路径上出现的次数
    pub fn occurrences(&self, key: &TypeKey) -> usize {
        self.frames().filter(|frame| frame.key == *key).count()
    }

    /// 从根到当前位置的解析路径
    pub fn chain(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self.frames().map(|frame| frame.key).collect();
        keys.reverse();
        keys
    }

    /// 描述解析路径，末尾追加即将解析的键
    pub fn describe_chain(&self, next: TypeKey) -> String {
        let mut keys = self.chain();
        if keys.last() != Some(&next) {
            keys.push(next);
        }
        keys.iter()
            .map(|key| key.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    fn frames(&self) -> impl Iterator<Item = &Frame> {
        std::iter::successors(self.head.as_deref(), |frame| frame.parent.as_deref())
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("chain", &self.chain())
            .field("depth", &self.depth)
            .finish()
    }
}

/// 依赖解析器 trait
///
/// 提供按键解析的基础方法和按类型解析的便捷方法
pub trait DependencyResolver {
    /// 按键解析，抑制错误或可选键缺失时返回 `None`
    fn resolve_with(&self, key: TypeKey, options: ResolveOptions) -> DependencyResult<Option<Instance>>;

    /// 异步按键解析
    fn resolve_with_async(
        &self,
        key: TypeKey,
        options: ResolveOptions,
    ) -> BoxFuture<'static, DependencyResult<Option<Instance>>>;

    /// 按键解析，缺失即报错
    fn resolve_key(&self, key: TypeKey) -> DependencyResult<Instance> {
        required(key, self.resolve_with(key, ResolveOptions::default())?)
    }

    /// 解析指定类型
    fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> DependencyResult<Arc<T>>
    where
        Self: Sized,
    {
        downcast_instance::<T>(&self.resolve_key(TypeKey::of::<T>())?)
    }

    /// 解析指定类型，`resolve` 的简写
    fn get<T: ?Sized + Send + Sync + 'static>(&self) -> DependencyResult<Arc<T>>
    where
        Self: Sized,
    {
        self.resolve::<T>()
    }

    /// 解析可选类型，无法构建时返回 `None`，从不报错
    fn resolve_optional<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>>
    where
        Self: Sized,
    {
        self.resolve_with(TypeKey::optional::<T>(), ResolveOptions::suppressed())
            .ok()
            .flatten()
            .and_then(|instance| instance.downcast::<T>())
    }

    /// 解析 `T` 的列表定义
    fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> DependencyResult<Arc<Vec<Arc<T>>>>
    where
        Self: Sized,
    {
        downcast_instance::<Vec<Arc<T>>>(&self.resolve_key(TypeKey::list::<T>())?)
    }

    /// 异步解析指定类型，存在可等待定义时优先使用
    fn resolve_async<T: ?Sized + Send + Sync + 'static>(&self) -> BoxFuture<'static, DependencyResult<Arc<T>>>
    where
        Self: Sized,
    {
        let key = TypeKey::of::<T>();
        let pending = self.resolve_with_async(key, ResolveOptions::default());
        Box::pin(async move { downcast_instance::<T>(&required(key, pending.await?)?) })
    }
}

/// 把缺省结果转换为无法解析错误
pub fn required(key: TypeKey, instance: Option<Instance>) -> DependencyResult<Instance> {
    instance.ok_or_else(|| DependencyError::unresolvable(key.to_string()))
}

/// 把实例还原为具体类型，类型不符视为无法解析
pub fn downcast_instance<T: ?Sized + Send + Sync + 'static>(instance: &Instance) -> DependencyResult<Arc<T>> {
    instance.downcast::<T>().ok_or_else(|| {
        DependencyError::unresolvable_because(
            TypeKey::of::<T>().to_string(),
            format!("实际得到的实例类型为 {}", instance.type_name()),
        )
    })
}

/// 交给定义和工厂函数的解析器
///
/// 持有当前容器和解析路径，工厂内的嵌套解析会沿用同一条路径
#[derive(Clone)]
pub struct Resolver {
    container: Arc<dyn ReadableContainer>,
    context: ResolveContext,
}

impl Resolver {
    /// 创建解析器
    pub fn new(container: Arc<dyn ReadableContainer>, context: ResolveContext) -> Self {
        Self { container, context }
    }

    /// 当前容器
    pub fn container(&self) -> &Arc<dyn ReadableContainer> {
        &self.container
    }

    /// 当前解析上下文
    pub fn context(&self) -> &ResolveContext {
        &self.context
    }

    /// 使用另一条解析路径
    pub fn with_context(&self, context: ResolveContext) -> Self {
        Self {
            container: self.container.clone(),
            context,
        }
    }
}

impl DependencyResolver for Resolver {
    fn resolve_with(&self, key: TypeKey, options: ResolveOptions) -> DependencyResult<Option<Instance>> {
        self.container
            .clone()
            .resolve_in(key, options, self.context.clone())
    }

    fn resolve_with_async(
        &self,
        key: TypeKey,
        options: ResolveOptions,
    ) -> BoxFuture<'static, DependencyResult<Option<Instance>>> {
        self.container
            .clone()
            .resolve_async_in(key, options, self.context.clone())
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn test_reflection_cycle_detected() {
        let context = ResolveContext::new()
            .enter(TypeKey::of::<A>(), 10)
            .and_then(|ctx| ctx.push_type(TypeKey::of::<A>()))
            .and_then(|ctx| ctx.enter(TypeKey::of::<B>(), 10))
            .and_then(|ctx| ctx.push_type(TypeKey::of::<B>()))
            .and_then(|ctx| ctx.enter(TypeKey::of::<A>(), 10))
            .unwrap();

        match context.push_type(TypeKey::of::<A>()) {
            Err(DependencyError::RecursiveDefinition { dependency_chain }) => {
                assert_eq!(dependency_chain, "A -> B -> A");
            }
            other => panic!("期望循环依赖错误, 实际: {other:?}"),
        }
    }

    #[test]
    fn test_depth_limit() {
        let context = ResolveContext::new().enter(TypeKey::of::<A>(), 1).unwrap();
        assert_eq!(context.depth(), 1);
        assert!(matches!(
            context.enter(TypeKey::of::<B>(), 1),
            Err(DependencyError::RecursiveDefinition { .. })
        ));
    }

    #[test]
    fn test_definitions_do_not_count_as_reflection() {
        let context = ResolveContext::new()
            .enter(TypeKey::of::<A>(), 10)
            .and_then(|ctx| ctx.enter(TypeKey::of::<A>(), 10))
            .unwrap();
        assert!(!context.is_reflecting(&TypeKey::of::<A>()));
        assert!(context.push_type(TypeKey::of::<A>()).is_ok());
    }
}
