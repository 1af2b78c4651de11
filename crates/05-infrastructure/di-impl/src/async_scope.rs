//! 异步作用域
//!
//! 托管资源可以异步获取和释放。作用域在未退出时被丢弃（例如所在的 future 被取消），
//! 剩余的释放动作会在当前 tokio 运行时上继续执行，没有运行时则就地阻塞执行。
//! 释放任务在运行时关闭前没能执行完的，丢弃时就地执行剩余部分

use crate::binding::{AsyncBoundFunction, BindMode, BindOptions, CallArgs};
use crate::container::Container;
use crate::scope::{managed_source, merge_exit, ReleaseFailures, ReleaseStack, ScopeTemplate};
use di_abstractions::{
    downcast_instance, AsyncManagedResource, AsyncRelease, Definition, ManagedResource, Release,
};
use di_common::{AsyncCallable, BoxError, DependencyError, DependencyResult, Instance, Shape, TypeKey};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// 异步作用域中的释放动作
pub(crate) enum PendingRelease {
    Sync(Release),
    Async(AsyncRelease),
}

impl PendingRelease {
    async fn run(self) -> Result<(), BoxError> {
        match self {
            Self::Sync(release) => release(),
            Self::Async(release) => release().await,
        }
    }
}

type InFlight = (TypeKey, BoxFuture<'static, Result<(), BoxError>>);

/// 按顺序执行释放动作
///
/// 执行中途被丢弃时（例如运行时关闭，释放任务还没来得及执行完），
/// 正在执行的和剩余的释放动作都会在 `Drop` 中就地阻塞执行完
struct ReleaseDrain {
    current: Option<InFlight>,
    /// 逆序存放，从尾部取出
    remaining: Vec<(TypeKey, PendingRelease)>,
    failures: ReleaseFailures,
}

impl ReleaseDrain {
    fn new(mut entries: Vec<(TypeKey, PendingRelease)>) -> Self {
        entries.reverse();
        Self {
            current: None,
            remaining: entries,
            failures: ReleaseFailures::default(),
        }
    }

    fn start_next(&mut self) -> bool {
        match self.remaining.pop() {
            Some((key, release)) => {
                debug!("异步释放资源: {}", key);
                self.current = Some((key, Box::pin(release.run())));
                true
            }
            None => false,
        }
    }

    async fn run(mut self) -> DependencyResult<()> {
        while self.current.is_some() || self.start_next() {
            if let Some((key, pending)) = self.current.as_mut() {
                let key = *key;
                let result = pending.await;
                self.current = None;
                if let Err(error) = result {
                    self.failures.record(key, error);
                }
            }
        }
        std::mem::take(&mut self.failures).into_result()
    }
}

impl Drop for ReleaseDrain {
    fn drop(&mut self) {
        if self.current.is_none() && self.remaining.is_empty() {
            return;
        }
        warn!("释放任务未执行完就被丢弃，就地执行剩余的释放动作");
        let current = self.current.take();
        let remaining = std::mem::take(&mut self.remaining);
        futures::executor::block_on(async move {
            if let Some((key, pending)) = current {
                if let Err(error) = pending.await {
                    warn!("释放资源 {} 失败: {}", key, error);
                }
            }
            for (key, release) in remaining.into_iter().rev() {
                if let Err(error) = release.run().await {
                    warn!("释放资源 {} 失败: {}", key, error);
                }
            }
        });
    }
}

async fn run_async_releases(entries: Vec<(TypeKey, PendingRelease)>) -> DependencyResult<()> {
    ReleaseDrain::new(entries).run().await
}

/// 取出资源的值和释放动作，同时接受异步和同步托管资源
fn unpack_resource(instance: &Instance) -> DependencyResult<(Instance, Option<PendingRelease>)> {
    if let Some(resource) = instance.downcast::<AsyncManagedResource>() {
        let release = resource.take_release().map(PendingRelease::Async);
        return Ok((resource.value().clone(), release));
    }
    let resource = downcast_instance::<ManagedResource>(instance)?;
    let release = resource.take_release().map(PendingRelease::Sync);
    Ok((resource.value().clone(), release))
}

fn scoped_async_definition(
    base: &Container,
    key: TypeKey,
    stack: Arc<ReleaseStack<PendingRelease>>,
) -> DependencyResult<Definition> {
    let source = match managed_source(base, key, Shape::AsyncManaged)? {
        Some(source) => Some(source),
        None => managed_source(base, key, Shape::Managed)?,
    };
    let (managed_key, definition) = source.ok_or_else(|| {
        DependencyError::invalid_definition(
            key.to_string(),
            "异步作用域管理的类型需要 AsyncManaged<T> 或 Managed<T> 定义",
        )
    })?;

    Ok(Definition::asynchronous(move |resolver| {
        let definition = definition.clone();
        let stack = stack.clone();
        async move {
            if stack.is_closed() {
                return Err(DependencyError::ScopeClosed {
                    type_name: key.to_string(),
                });
            }
            let instance = definition.get_instance_async(managed_key, resolver).await?;
            let (value, release) = unpack_resource(&instance)?;
            if let Some(release) = release {
                if let Err(release) = stack.push(key, release) {
                    if let Err(error) = release.run().await {
                        warn!("作用域已关闭，立即释放资源 {} 失败: {}", key, error);
                    }
                    return Err(DependencyError::ScopeClosed {
                        type_name: key.to_string(),
                    });
                }
                debug!("获取异步作用域资源: {}", key);
            }
            Ok(value)
        }
    }))
}

/// 作用域单例的外层检查：退出后缓存的资源已被释放，不能再返回
fn closed_guard(key: TypeKey, stack: Arc<ReleaseStack<PendingRelease>>, singleton: Definition) -> Definition {
    let singleton = Arc::new(singleton);
    Definition::asynchronous(move |resolver| {
        let singleton = singleton.clone();
        let closed = stack.is_closed();
        async move {
            if closed {
                return Err(DependencyError::ScopeClosed {
                    type_name: key.to_string(),
                });
            }
            singleton.get_instance_async(key, resolver).await
        }
    })
}

/// 异步作用域
pub struct AsyncScope {
    template: ScopeTemplate,
    used: AtomicBool,
}

impl AsyncScope {
    /// 基于容器创建异步作用域
    pub fn new(container: &Container) -> Self {
        Self::from_template(ScopeTemplate::new(container))
    }

    fn from_template(template: ScopeTemplate) -> Self {
        Self {
            template,
            used: AtomicBool::new(false),
        }
    }

    /// 管理 `T`：作用域内每次解析都获取一份新资源
    pub fn managing<T: ?Sized + 'static>(self) -> Self {
        self.managing_key(TypeKey::of::<T>())
    }

    /// 按键管理类型
    pub fn managing_key(mut self, key: TypeKey) -> Self {
        self.template.add_managed(key);
        self
    }

    /// 管理 `T` 并在作用域内只获取一次
    pub fn singleton<T: ?Sized + 'static>(mut self) -> Self {
        self.template.add_singleton(TypeKey::of::<T>());
        self
    }

    /// 相同配置的新作用域
    pub fn clone_scope(&self) -> AsyncScope {
        Self::from_template(self.template.clone())
    }

    /// 进入作用域
    pub fn enter(&self) -> DependencyResult<AsyncScopedContainer> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(DependencyError::ScopeReused);
        }

        let stack = Arc::new(ReleaseStack::new());
        let container = self.template.container.clone_container();
        for &key in &self.template.managed {
            let definition = scoped_async_definition(&self.template.container, key, stack.clone())?;
            let definition = if self.template.singletons.contains(&key) {
                closed_guard(key, stack.clone(), Definition::singleton(definition))
            } else {
                definition
            };
            container.define(key, definition)?;
        }

        debug!("进入异步作用域，托管类型数: {}", self.template.managed.len());
        Ok(AsyncScopedContainer { container, stack })
    }

    /// 在作用域内执行异步函数，结束或被取消后释放资源
    pub async fn run<R, F, Fut>(&self, f: F) -> DependencyResult<R>
    where
        F: FnOnce(Container) -> Fut,
        Fut: Future<Output = DependencyResult<R>>,
    {
        let scoped = self.enter()?;
        let result = f(scoped.container().clone()).await;
        merge_exit(result, scoped.exit().await)
    }

    /// 显式绑定异步函数，每次调用都在新的作用域中执行
    pub fn bind<C: AsyncCallable>(&self, callable: C, options: BindOptions) -> ScopedAsyncBoundFunction<C> {
        ScopedAsyncBoundFunction::new(self.template.clone(), callable, BindMode::Explicit, options)
    }

    /// 隐式绑定异步函数，每次调用都在新的作用域中执行
    pub fn magic_bind<C: AsyncCallable>(
        &self,
        callable: C,
        options: BindOptions,
    ) -> ScopedAsyncBoundFunction<C> {
        ScopedAsyncBoundFunction::new(self.template.clone(), callable, BindMode::Implicit, options)
    }
}

impl fmt::Debug for AsyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncScope")
            .field("managed", &self.template.managed)
            .field("singletons", &self.template.singletons)
            .field("used", &self.used.load(Ordering::SeqCst))
            .finish()
    }
}

/// 进入异步作用域后的容器
pub struct AsyncScopedContainer {
    container: Container,
    stack: Arc<ReleaseStack<PendingRelease>>,
}

impl AsyncScopedContainer {
    /// 作用域内的容器
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// 退出作用域，按后进先出的顺序释放资源
    pub async fn exit(self) -> DependencyResult<()> {
        let entries = self.stack.close();
        match entries {
            Some(entries) => {
                debug!("退出异步作用域，释放资源数: {}", entries.len());
                run_async_releases(entries).await
            }
            None => Ok(()),
        }
    }
}

impl Deref for AsyncScopedContainer {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.container
    }
}

impl Drop for AsyncScopedContainer {
    fn drop(&mut self) {
        let Some(entries) = self.stack.close() else {
            return;
        };
        warn!("异步作用域未退出就被丢弃，继续释放 {} 个资源", entries.len());
        let drain = ReleaseDrain::new(entries);
        let releasing = async move {
            if let Err(error) = drain.run().await {
                warn!("丢弃异步作用域时释放资源失败: {}", error);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(releasing);
            }
            Err(_) => futures::executor::block_on(releasing),
        }
    }
}

impl fmt::Debug for AsyncScopedContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncScopedContainer")
            .field("container", &self.container)
            .field("closed", &self.stack.is_closed())
            .finish()
    }
}

/// 绑定到异步作用域的函数
pub struct ScopedAsyncBoundFunction<C> {
    template: ScopeTemplate,
    callable: Arc<C>,
    mode: BindMode,
    options: BindOptions,
}

impl<C: AsyncCallable> ScopedAsyncBoundFunction<C> {
    fn new(template: ScopeTemplate, callable: C, mode: BindMode, options: BindOptions) -> Self {
        Self {
            template,
            callable: Arc::new(callable),
            mode,
            options,
        }
    }

    /// 被绑定函数的名称
    pub fn name(&self) -> &str {
        self.callable.spec().name()
    }

    /// 不提供参数调用
    pub async fn invoke(&self) -> DependencyResult<C::Output> {
        self.call(CallArgs::new()).await
    }

    /// 在新的异步作用域中调用
    pub async fn call(&self, args: CallArgs) -> DependencyResult<C::Output> {
        let scope = AsyncScope::from_template(self.template.clone());
        let scoped = scope.enter()?;
        let bound = AsyncBoundFunction::new(
            scoped.container().clone(),
            self.callable.clone(),
            self.mode,
            self.options.clone(),
        );
        let result = bound.call(args).await;
        merge_exit(result, scoped.exit().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{AsyncManaged, DependencyResolver, Managed};
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Session {
        name: &'static str,
    }

    struct Ledger;

    fn session_container(log: Arc<Mutex<Vec<String>>>) -> Container {
        let container = Container::new();
        let session_log = log.clone();
        container
            .define_async_managed(move |_| {
                let log = session_log.clone();
                async move {
                    log.lock().push("open session".to_string());
                    Ok(AsyncManaged::from_value(Session { name: "main" }, move |_| async move {
                        tokio::task::yield_now().await;
                        log.lock().push("close session".to_string());
                        Ok(())
                    }))
                }
            })
            .unwrap();
        container
            .define_managed(move |_| {
                log.lock().push("open ledger".to_string());
                let log = log.clone();
                Ok(Managed::from_value(Ledger, move |_| {
                    log.lock().push("close ledger".to_string());
                    Ok(())
                }))
            })
            .unwrap();
        container
    }

    #[tokio::test]
    async fn test_async_releases_run_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = session_container(log.clone());
        let scope = AsyncScope::new(&container)
            .managing::<Session>()
            .managing::<Ledger>();

        scope
            .run(|scoped| async move {
                let session = scoped.resolve_async::<Session>().await?;
                assert_eq!(session.name, "main");
                scoped.resolve_async::<Ledger>().await?;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec!["open session", "open ledger", "close ledger", "close session"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_scope_still_releases() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = session_container(log.clone());
        let scope = AsyncScope::new(&container).singleton::<Session>();

        let consumer = scope.run(|scoped| async move {
            scoped.resolve_async::<Session>().await?;
            futures::future::pending::<()>().await;
            Ok(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(20), consumer).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*log.lock(), vec!["open session", "close session"]);
    }

    #[test]
    fn test_release_survives_runtime_shutdown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = session_container(log.clone());
        let scope = AsyncScope::new(&container).managing::<Ledger>();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async {
            let consumer = scope.run(|scoped| async move {
                scoped.resolve_async::<Ledger>().await?;
                futures::future::pending::<()>().await;
                Ok(())
            });
            let timed_out = tokio::time::timeout(Duration::from_millis(10), consumer).await;
            assert!(timed_out.is_err());
        });
        drop(runtime);

        assert_eq!(*log.lock(), vec!["open ledger", "close ledger"]);
    }

    #[tokio::test]
    async fn test_scope_singleton_closed_after_exit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = session_container(log.clone());
        let scope = AsyncScope::new(&container).singleton::<Session>();

        let scoped = scope.enter().unwrap();
        scoped.resolve_async::<Session>().await.unwrap();
        let inner = scoped.container().clone();
        scoped.exit().await.unwrap();

        assert_eq!(*log.lock(), vec!["open session", "close session"]);
        assert!(matches!(
            inner.resolve_async::<Session>().await,
            Err(DependencyError::ScopeClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_async_scope_cannot_be_reused() {
        let container = session_container(Arc::new(Mutex::new(Vec::new())));
        let scope = AsyncScope::new(&container).managing::<Session>();

        let scoped = scope.enter().unwrap();
        assert!(matches!(scope.enter(), Err(DependencyError::ScopeReused)));
        scoped.exit().await.unwrap();
    }

    #[test]
    fn test_drop_without_runtime_releases_inline() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = session_container(log.clone());
        let scope = AsyncScope::new(&container).managing::<Ledger>();

        let scoped = scope.enter().unwrap();
        futures::executor::block_on(scoped.resolve_async::<Ledger>()).unwrap();
        drop(scoped);

        assert_eq!(*log.lock(), vec!["open ledger", "close ledger"]);
    }
}
