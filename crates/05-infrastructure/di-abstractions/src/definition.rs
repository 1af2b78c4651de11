//! 依赖定义
//!
//! 每种定义描述如何为一个类型键产生实例，产生实例时总是拿到当前容器的解析器

use crate::resolver::{required, DependencyResolver, ResolveOptions, Resolver};
use di_common::{DependencyError, DependencyResult, Instance, Shape, TypeKey};
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread::ThreadId;
use tokio::sync::Notify;

/// 无参工厂
pub type PlainFactory = Arc<dyn Fn() -> DependencyResult<Instance> + Send + Sync>;
/// 接收解析器的工厂
pub type ContainerFactory = Arc<dyn Fn(&Resolver) -> DependencyResult<Instance> + Send + Sync>;
/// 异步工厂
pub type AsyncFactory =
    Arc<dyn Fn(Resolver) -> BoxFuture<'static, DependencyResult<Instance>> + Send + Sync>;
/// 别名的向上转换，把目标实例转换成请求的抽象
pub type Upcast = Arc<dyn Fn(Instance) -> DependencyResult<Instance> + Send + Sync>;

/// 依赖定义
pub enum Definition {
    /// 重定向到另一个键
    Alias(Alias),
    /// 每次解析都调用工厂
    Construction(Construction),
    /// 只能异步解析的工厂
    AsyncConstruction(AsyncFactory),
    /// 最多构建一次
    Singleton(Singleton),
    /// 固定实例
    PlainInstance(Instance),
    /// 总是失败
    Unresolvable(Unresolvable),
}

impl Definition {
    /// 无参工厂定义
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> DependencyResult<Instance> + Send + Sync + 'static,
    {
        Self::Construction(Construction::WithoutContainer(Arc::new(factory)))
    }

    /// 接收解析器的工厂定义
    pub fn with_container<F>(factory: F) -> Self
    where
        F: Fn(&Resolver) -> DependencyResult<Instance> + Send + Sync + 'static,
    {
        Self::Construction(Construction::WithContainer(Arc::new(factory)))
    }

    /// 异步工厂定义
    pub fn asynchronous<F, Fut>(factory: F) -> Self
    where
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DependencyResult<Instance>> + Send + 'static,
    {
        Self::AsyncConstruction(Arc::new(
            move |resolver: Resolver| -> BoxFuture<'static, DependencyResult<Instance>> {
                Box::pin(factory(resolver))
            },
        ))
    }

    /// 单例包装
    pub fn singleton(inner: Definition) -> Self {
        Self::Singleton(Singleton::new(inner))
    }

    /// 固定实例定义
    pub fn instance(value: Instance) -> Self {
        Self::PlainInstance(value)
    }

    /// 别名定义
    pub fn alias(target: TypeKey) -> Self {
        Self::Alias(Alias::new(target))
    }

    /// 总是失败的定义
    pub fn unresolvable(message: impl Into<String>) -> Self {
        Self::Unresolvable(Unresolvable::Message(message.into()))
    }

    /// 定义种类名称
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Alias(_) => "Alias",
            Self::Construction(_) => "Construction",
            Self::AsyncConstruction(_) => "AsyncConstruction",
            Self::Singleton(_) => "Singleton",
            Self::PlainInstance(_) => "PlainInstance",
            Self::Unresolvable(_) => "Unresolvable",
        }
    }

    /// 是否只能异步产生实例
    pub fn is_async(&self) -> bool {
        match self {
            Self::AsyncConstruction(_) => true,
            Self::Singleton(singleton) => singleton.inner.is_async(),
            _ => false,
        }
    }

    /// 是否为别名，或包装了别名的单例
    pub fn is_alias(&self) -> bool {
        match self {
            Self::Alias(_) => true,
            Self::Singleton(singleton) => singleton.inner.is_alias(),
            _ => false,
        }
    }

    /// 同步产生实例
    pub fn get_instance(&self, key: &TypeKey, resolver: &Resolver) -> DependencyResult<Instance> {
        match self {
            Self::Alias(alias) => alias.get_instance(resolver),
            Self::Construction(construction) => construction.build(resolver),
            Self::AsyncConstruction(_) => Err(DependencyError::unresolvable_because(
                key.to_string(),
                "该类型只有异步定义，请使用 resolve_async",
            )),
            Self::Singleton(singleton) => singleton.get_instance(key, resolver),
            Self::PlainInstance(value) => Ok(value.clone()),
            Self::Unresolvable(unresolvable) => Err(unresolvable.to_error(key)),
        }
    }

    /// 异步产生实例
    pub fn get_instance_async(
        self: Arc<Self>,
        key: TypeKey,
        resolver: Resolver,
    ) -> BoxFuture<'static, DependencyResult<Instance>> {
        Box::pin(async move {
            match &*self {
                Self::Alias(alias) => alias.get_instance_async(resolver).await,
                Self::Construction(construction) => construction.build(&resolver),
                Self::AsyncConstruction(factory) => factory(resolver).await,
                Self::Singleton(singleton) => singleton.get_instance_async(key, resolver).await,
                Self::PlainInstance(value) => Ok(value.clone()),
                Self::Unresolvable(unresolvable) => Err(unresolvable.to_error(&key)),
            }
        })
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias(alias) => f
                .debug_struct("Alias")
                .field("target", &alias.target)
                .field("skip_definitions", &alias.skip_definitions)
                .finish(),
            Self::Singleton(singleton) => f
                .debug_struct("Singleton")
                .field("inner", &singleton.inner)
                .field("built", &singleton.cell.get().is_some())
                .finish(),
            Self::PlainInstance(value) => f.debug_tuple("PlainInstance").field(value).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// 别名
#[derive(Clone)]
pub struct Alias {
    target: TypeKey,
    skip_definitions: bool,
    cast: Option<Upcast>,
}

impl Alias {
    /// 指向另一个键的别名
    pub fn new(target: TypeKey) -> Self {
        Self {
            target,
            skip_definitions: false,
            cast: None,
        }
    }

    /// 跳过定义直接反射构建目标，可以安全地指向自身
    pub fn force_reflection(target: TypeKey) -> Self {
        Self {
            skip_definitions: true,
            ..Self::new(target)
        }
    }

    /// 把 `Arc<I>` 转换成 `Arc<T>` 的别名，用于把实现注册为抽象
    pub fn upcast<T, I, F>(convert: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<I>) -> Arc<T> + Send + Sync + 'static,
    {
        let cast: Upcast = Arc::new(move |instance: Instance| {
            let value = crate::resolver::downcast_instance::<I>(&instance)?;
            Ok(Instance::from_arc(convert(value)))
        });
        Self {
            cast: Some(cast),
            ..Self::new(TypeKey::of::<I>())
        }
    }

    /// 复制为跳过定义的别名
    pub fn skipping_definitions(&self) -> Self {
        Self {
            skip_definitions: true,
            ..self.clone()
        }
    }

    /// 目标键
    pub fn target(&self) -> TypeKey {
        self.target
    }

    /// 是否跳过目标键上的定义
    pub fn skip_definitions(&self) -> bool {
        self.skip_definitions
    }

    fn options(&self) -> ResolveOptions {
        ResolveOptions {
            suppress_error: false,
            skip_definitions: self.skip_definitions,
        }
    }

    fn convert(&self, instance: Instance) -> DependencyResult<Instance> {
        match &self.cast {
            Some(cast) => cast(instance),
            None => Ok(instance),
        }
    }

    fn get_instance(&self, resolver: &Resolver) -> DependencyResult<Instance> {
        let instance = required(self.target, resolver.resolve_with(self.target, self.options())?)?;
        self.convert(instance)
    }

    async fn get_instance_async(&self, resolver: Resolver) -> DependencyResult<Instance> {
        let pending = resolver.resolve_with_async(self.target, self.options());
        let instance = required(self.target, pending.await?)?;
        self.convert(instance)
    }
}

/// 工厂构建
#[derive(Clone)]
pub enum Construction {
    /// 无参工厂
    WithoutContainer(PlainFactory),
    /// 接收解析器的工厂
    WithContainer(ContainerFactory),
}

impl Construction {
    fn build(&self, resolver: &Resolver) -> DependencyResult<Instance> {
        match self {
            Self::WithoutContainer(factory) => factory(),
            Self::WithContainer(factory) => factory(resolver),
        }
    }
}

/// 单例包装
///
/// 快速路径无锁读取缓存；首次构建在锁内再次检查。同步和异步的首次访问共用同一把锁
pub struct Singleton {
    inner: Arc<Definition>,
    cell: OnceCell<Instance>,
    lock: BuildLock,
}

impl Singleton {
    /// 包装一个定义
    pub fn new(inner: Definition) -> Self {
        Self {
            inner: Arc::new(inner),
            cell: OnceCell::new(),
            lock: BuildLock::new(),
        }
    }

    /// 被包装的定义
    pub fn inner(&self) -> &Definition {
        &self.inner
    }

    /// 已缓存的实例
    pub fn cached(&self) -> Option<&Instance> {
        self.cell.get()
    }

    fn get_instance(&self, key: &TypeKey, resolver: &Resolver) -> DependencyResult<Instance> {
        if let Some(instance) = self.cell.get() {
            return Ok(instance.clone());
        }
        check_reentry(key, resolver)?;
        let _guard = self.lock.lock();
        if let Some(instance) = self.cell.get() {
            return Ok(instance.clone());
        }
        let instance = self.inner.get_instance(key, resolver)?;
        Ok(self.cell.get_or_init(|| instance).clone())
    }

    async fn get_instance_async(&self, key: TypeKey, resolver: Resolver) -> DependencyResult<Instance> {
        if let Some(instance) = self.cell.get() {
            return Ok(instance.clone());
        }
        if matches!(
            *self.inner,
            Definition::Construction(_) | Definition::PlainInstance(_) | Definition::Unresolvable(_)
        ) {
            return self.get_instance(&key, &resolver);
        }
        check_reentry(&key, &resolver)?;
        let _guard = self.lock.lock_async().await;
        if let Some(instance) = self.cell.get() {
            return Ok(instance.clone());
        }
        let instance = self.inner.clone().get_instance_async(key, resolver).await?;
        Ok(self.cell.get_or_init(|| instance).clone())
    }
}

/// 单例的构建过程又解析到自身时直接报错，异步持锁不可重入，等待只会挂起
fn check_reentry(key: &TypeKey, resolver: &Resolver) -> DependencyResult<()> {
    let context = resolver.context();
    let mut seen = context.occurrences(key);
    if key.shape() == Shape::Awaitable {
        seen += context.occurrences(&key.with_shape(Shape::Plain));
    }
    if seen > 1 {
        return Err(DependencyError::RecursiveDefinition {
            dependency_chain: context.describe_chain(*key),
        });
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Owner {
    Thread(ThreadId),
    Task,
}

struct Holder {
    owner: Owner,
    depth: usize,
}

/// 单例首次构建的锁
///
/// 同一线程可重入；异步任务持有时不可重入
struct BuildLock {
    holder: Mutex<Option<Holder>>,
    released: Condvar,
    notify: Notify,
}

impl BuildLock {
    fn new() -> Self {
        Self {
            holder: Mutex::new(None),
            released: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn try_acquire(holder: &mut Option<Holder>, owner: Owner) -> bool {
        match holder {
            None => {
                *holder = Some(Holder { owner, depth: 1 });
                true
            }
            Some(current) if owner != Owner::Task && current.owner == owner => {
                current.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    fn lock(&self) -> BuildGuard<'_> {
        let owner = Owner::Thread(std::thread::current().id());
        let mut holder = self.holder.lock();
        while !Self::try_acquire(&mut holder, owner) {
            self.released.wait(&mut holder);
        }
        BuildGuard { lock: self }
    }

    async fn lock_async(&self) -> BuildGuard<'_> {
        loop {
            // 先登记再检查，避免错过检查和等待之间的释放
            let notified = self.notify.notified();
            let acquired = {
                let mut holder = self.holder.lock();
                Self::try_acquire(&mut holder, Owner::Task)
            };
            if acquired {
                return BuildGuard { lock: self };
            }
            notified.await;
        }
    }
}

struct BuildGuard<'a> {
    lock: &'a BuildLock,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        let mut holder = self.lock.holder.lock();
        let free = match holder.as_mut() {
            Some(current) => {
                current.depth -= 1;
                current.depth == 0
            }
            None => true,
        };
        if free {
            *holder = None;
            drop(holder);
            self.lock.released.notify_all();
            self.lock.notify.notify_waiters();
        }
    }
}

/// 无法解析的原因
#[derive(Clone)]
pub enum Unresolvable {
    /// 固定消息，报告为无法解析错误
    Message(String),
    /// 自定义错误
    Error(Arc<dyn Fn() -> DependencyError + Send + Sync>),
}

impl Unresolvable {
    /// 生成错误
    pub fn to_error(&self, key: &TypeKey) -> DependencyError {
        match self {
            Self::Message(message) => DependencyError::unresolvable_because(key.to_string(), message.clone()),
            Self::Error(make_error) => make_error(),
        }
    }
}
