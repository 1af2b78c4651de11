//! 作用域
//!
//! 作用域在进入时克隆容器，为托管类型注册获取资源的包装定义；
//! 获取到的资源在退出时按获取的相反顺序释放

use crate::binding::{BindMode, BindOptions, BoundFunction, CallArgs};
use crate::container::Container;
use di_abstractions::{downcast_instance, Definition, ManagedResource, Release};
use di_common::{BoxError, Callable, DependencyError, DependencyResult, Shape, TypeKey};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// 作用域的配置，可以反复生成新的作用域
#[derive(Clone)]
pub(crate) struct ScopeTemplate {
    pub(crate) container: Container,
    pub(crate) managed: Vec<TypeKey>,
    pub(crate) singletons: HashSet<TypeKey>,
}

impl ScopeTemplate {
    pub(crate) fn new(container: &Container) -> Self {
        Self {
            container: container.clone(),
            managed: Vec::new(),
            singletons: HashSet::new(),
        }
    }

    pub(crate) fn add_managed(&mut self, key: TypeKey) {
        if !self.managed.contains(&key) {
            self.managed.push(key);
        }
    }

    pub(crate) fn add_singleton(&mut self, key: TypeKey) {
        self.add_managed(key);
        self.singletons.insert(key);
    }
}

/// 待释放的资源栈，关闭后不再接受新的资源
pub(crate) struct ReleaseStack<R> {
    entries: Mutex<Option<Vec<(TypeKey, R)>>>,
}

impl<R> ReleaseStack<R> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Some(Vec::new())),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.entries.lock().is_none()
    }

    /// 压入释放动作；已关闭时原样退回
    pub(crate) fn push(&self, key: TypeKey, release: R) -> Result<(), R> {
        match self.entries.lock().as_mut() {
            Some(entries) => {
                entries.push((key, release));
                Ok(())
            }
            None => Err(release),
        }
    }

    /// 关闭并按后进先出的顺序取出全部释放动作，只有第一次调用能取到
    pub(crate) fn close(&self) -> Option<Vec<(TypeKey, R)>> {
        self.entries.lock().take().map(|mut entries| {
            entries.reverse();
            entries
        })
    }
}

/// 释放失败的汇总：保留第一个错误，其余只计数
#[derive(Default)]
pub(crate) struct ReleaseFailures {
    first: Option<(TypeKey, BoxError)>,
    suppressed: usize,
}

impl ReleaseFailures {
    pub(crate) fn record(&mut self, key: TypeKey, error: BoxError) {
        warn!("释放资源 {} 失败: {}", key, error);
        if self.first.is_none() {
            self.first = Some((key, error));
        } else {
            self.suppressed += 1;
        }
    }

    pub(crate) fn into_result(self) -> DependencyResult<()> {
        match self.first {
            None => Ok(()),
            Some((key, source)) => Err(DependencyError::ResourceReleaseFailed {
                type_name: key.to_string(),
                source,
                suppressed: self.suppressed,
            }),
        }
    }
}

/// 依次执行同步释放动作，失败后继续执行剩余的动作
pub(crate) fn run_releases(entries: Vec<(TypeKey, Release)>) -> DependencyResult<()> {
    let mut failures = ReleaseFailures::default();
    for (key, release) in entries {
        debug!("释放资源: {}", key);
        if let Err(error) = release() {
            failures.record(key, error);
        }
    }
    failures.into_result()
}

/// 查找托管定义，别名在基础容器中逐级展开，不会再经过作用域注册的包装
pub(crate) fn managed_source(
    base: &Container,
    key: TypeKey,
    shape: Shape,
) -> DependencyResult<Option<(TypeKey, Arc<Definition>)>> {
    let mut current = key.with_shape(shape);
    let mut visited = Vec::new();
    loop {
        let Some(definition) = base.get_definition(&current) else {
            return Ok(None);
        };
        let Definition::Alias(alias) = definition.as_ref() else {
            return Ok(Some((current, definition)));
        };
        visited.push(current);
        current = alias.target();
        if visited.contains(&current) {
            return Err(DependencyError::invalid_definition(
                key.to_string(),
                "托管定义的别名形成了循环",
            ));
        }
    }
}

/// 组合两个结果：调用本身的错误优先，释放错误只记录日志
pub(crate) fn merge_exit<T>(result: DependencyResult<T>, exit: DependencyResult<()>) -> DependencyResult<T> {
    match (result, exit) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(error)) => Err(error),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(release_error)) => {
            warn!("作用域内调用失败，释放资源也失败: {}", release_error);
            Err(error)
        }
    }
}

fn scoped_definition(
    base: &Container,
    key: TypeKey,
    stack: Arc<ReleaseStack<Release>>,
) -> DependencyResult<Definition> {
    let (managed_key, definition) = managed_source(base, key, Shape::Managed)?.ok_or_else(|| {
        DependencyError::invalid_definition(key.to_string(), "作用域管理的类型需要 Managed<T> 定义")
    })?;

    Ok(Definition::with_container(move |resolver| {
        if stack.is_closed() {
            return Err(DependencyError::ScopeClosed {
                type_name: key.to_string(),
            });
        }
        let instance = definition.get_instance(&managed_key, resolver)?;
        let resource = downcast_instance::<ManagedResource>(&instance)?;
        if let Some(release) = resource.take_release() {
            if let Err(release) = stack.push(key, release) {
                if let Err(error) = release() {
                    warn!("作用域已关闭，立即释放资源 {} 失败: {}", key, error);
                }
                return Err(DependencyError::ScopeClosed {
                    type_name: key.to_string(),
                });
            }
            debug!("获取作用域资源: {}", key);
        }
        Ok(resource.value().clone())
    }))
}

/// 作用域单例的外层检查：退出后缓存的资源已被释放，不能再返回
fn closed_guard(key: TypeKey, stack: Arc<ReleaseStack<Release>>, singleton: Definition) -> Definition {
    let singleton = Arc::new(singleton);
    Definition::with_container(move |resolver| {
        if stack.is_closed() {
            return Err(DependencyError::ScopeClosed {
                type_name: key.to_string(),
            });
        }
        singleton.get_instance(&key, resolver)
    })
}

/// 同步作用域
///
/// 每个作用域只能进入一次，需要再次使用时通过 [`Scope::clone_scope`] 取得新的作用域
pub struct Scope {
    template: ScopeTemplate,
    used: AtomicBool,
}

impl Scope {
    /// 基于容器创建作用域
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
    pub fn clone_scope(&self) -> Scope {
        Self::from_template(self.template.clone())
    }

    /// 进入作用域
    pub fn enter(&self) -> DependencyResult<ScopedContainer> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(DependencyError::ScopeReused);
        }

        let stack = Arc::new(ReleaseStack::new());
        let container = self.template.container.clone_container();
        for &key in &self.template.managed {
            let definition = scoped_definition(&self.template.container, key, stack.clone())?;
            let definition = if self.template.singletons.contains(&key) {
                closed_guard(key, stack.clone(), Definition::singleton(definition))
            } else {
                definition
            };
            container.define(key, definition)?;
        }

        debug!("进入作用域，托管类型数: {}", self.template.managed.len());
        Ok(ScopedContainer { container, stack })
    }

    /// 在作用域内执行，结束后释放资源
    pub fn run<R, F>(&self, f: F) -> DependencyResult<R>
    where
        F: FnOnce(&Container) -> DependencyResult<R>,
    {
        let scoped = self.enter()?;
        let result = f(&scoped);
        merge_exit(result, scoped.exit())
    }

    /// 显式绑定，每次调用都在新的作用域中执行
    pub fn bind<C: Callable>(&self, callable: C, options: BindOptions) -> ScopedBoundFunction<C> {
        ScopedBoundFunction::new(self.template.clone(), callable, BindMode::Explicit, options)
    }

    /// 隐式绑定，每次调用都在新的作用域中执行
    pub fn magic_bind<C: Callable>(&self, callable: C, options: BindOptions) -> ScopedBoundFunction<C> {
        ScopedBoundFunction::new(self.template.clone(), callable, BindMode::Implicit, options)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("managed", &self.template.managed)
            .field("singletons", &self.template.singletons)
            .field("used", &self.used.load(Ordering::SeqCst))
            .finish()
    }
}

/// 进入作用域后的容器
///
/// 调用 [`ScopedContainer::exit`] 释放资源；未调用就被丢弃时也会释放，错误只记录日志
pub struct ScopedContainer {
    container: Container,
    stack: Arc<ReleaseStack<Release>>,
}

impl ScopedContainer {
    /// 作用域内的容器
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// 退出作用域，按后进先出的顺序释放资源
    pub fn exit(self) -> DependencyResult<()> {
        match self.stack.close() {
            Some(entries) => {
                debug!("退出作用域，释放资源数: {}", entries.len());
                run_releases(entries)
            }
            None => Ok(()),
        }
    }
}

impl Deref for ScopedContainer {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.container
    }
}

impl Drop for ScopedContainer {
    fn drop(&mut self) {
        if let Some(entries) = self.stack.close() {
            warn!("作用域未显式退出，释放 {} 个资源", entries.len());
            if let Err(error) = run_releases(entries) {
                warn!("丢弃作用域时释放资源失败: {}", error);
            }
        }
    }
}

impl fmt::Debug for ScopedContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedContainer")
            .field("container", &self.container)
            .field("closed", &self.stack.is_closed())
            .finish()
    }
}

/// 绑定到作用域的同步函数
pub struct ScopedBoundFunction<C> {
    template: ScopeTemplate,
    callable: Arc<C>,
    mode: BindMode,
    options: BindOptions,
}

impl<C: Callable> ScopedBoundFunction<C> {
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
    pub fn invoke(&self) -> DependencyResult<C::Output> {
        self.call(CallArgs::new())
    }

    /// 在新的作用域中调用
    pub fn call(&self, args: CallArgs) -> DependencyResult<C::Output> {
        let scope = Scope::from_template(self.template.clone());
        let scoped = scope.enter()?;
        let bound = BoundFunction::new(
            scoped.container().clone(),
            self.callable.clone(),
            self.mode,
            self.options.clone(),
        );
        let result = bound.call(args);
        merge_exit(result, scoped.exit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{DependencyResolver, Managed};
    use std::sync::atomic::AtomicUsize;

    struct Connection {
        id: usize,
    }

    fn tracked_container(log: Arc<Mutex<Vec<String>>>) -> Container {
        let container = Container::new();
        let counter = Arc::new(AtomicUsize::new(0));
        container
            .define_managed(move |_| {
                let id = counter.fetch_add(1, Ordering::SeqCst);
                log.lock().push(format!("open {id}"));
                let log = log.clone();
                Ok(Managed::from_value(Connection { id }, move |conn| {
                    log.lock().push(format!("close {}", conn.id));
                    Ok(())
                }))
            })
            .unwrap();
        container
    }

    #[test]
    fn test_releases_run_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = tracked_container(log.clone());
        let scope = Scope::new(&container).managing::<Connection>();

        let scoped = scope.enter().unwrap();
        let first = scoped.resolve::<Connection>().unwrap();
        let second = scoped.resolve::<Connection>().unwrap();
        assert_ne!(first.id, second.id);
        scoped.exit().unwrap();

        assert_eq!(*log.lock(), vec!["open 0", "open 1", "close 1", "close 0"]);
    }

    #[test]
    fn test_scope_singleton_acquired_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = tracked_container(log.clone());
        let scope = Scope::new(&container).singleton::<Connection>();

        scope
            .run(|scoped| {
                let first = scoped.resolve::<Connection>()?;
                let second = scoped.resolve::<Connection>()?;
                assert!(Arc::ptr_eq(&first, &second));
                Ok(())
            })
            .unwrap();

        assert_eq!(*log.lock(), vec!["open 0", "close 0"]);
    }

    #[test]
    fn test_scope_cannot_be_reused() {
        let container = tracked_container(Arc::new(Mutex::new(Vec::new())));
        let scope = Scope::new(&container).managing::<Connection>();

        let scoped = scope.enter().unwrap();
        assert!(matches!(scope.enter(), Err(DependencyError::ScopeReused)));
        scoped.exit().unwrap();

        let fresh = scope.clone_scope();
        fresh.enter().unwrap().exit().unwrap();
    }

    #[test]
    fn test_release_failures_are_aggregated() {
        struct Flaky;

        let container = Container::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        container
            .define_managed(move |_| {
                let counter = counter.clone();
                Ok(Managed::from_value(Flaky, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("关闭失败".into())
                }))
            })
            .unwrap();

        let scoped = Scope::new(&container).managing::<Flaky>().enter().unwrap();
        for _ in 0..3 {
            scoped.resolve::<Flaky>().unwrap();
        }

        match scoped.exit() {
            Err(DependencyError::ResourceReleaseFailed { suppressed, .. }) => assert_eq!(suppressed, 2),
            other => panic!("期望释放失败错误, 实际: {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_drop_releases_and_closes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = tracked_container(log.clone());

        let inner = {
            let scoped = Scope::new(&container).managing::<Connection>().enter().unwrap();
            scoped.resolve::<Connection>().unwrap();
            scoped.container().clone()
        };

        assert_eq!(*log.lock(), vec!["open 0", "close 0"]);
        assert!(matches!(
            inner.resolve::<Connection>(),
            Err(DependencyError::ScopeClosed { .. })
        ));
    }

    #[test]
    fn test_scope_singleton_closed_after_exit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = tracked_container(log.clone());
        let scope = Scope::new(&container).singleton::<Connection>();

        let scoped = scope.enter().unwrap();
        scoped.resolve::<Connection>().unwrap();
        let inner = scoped.container().clone();
        scoped.exit().unwrap();

        assert_eq!(*log.lock(), vec!["open 0", "close 0"]);
        assert!(matches!(
            inner.resolve::<Connection>(),
            Err(DependencyError::ScopeClosed { .. })
        ));
    }

    #[test]
    fn test_concurrent_enter_admits_one() {
        let container = tracked_container(Arc::new(Mutex::new(Vec::new())));
        let scope = Scope::new(&container).managing::<Connection>();
        let barrier = std::sync::Barrier::new(8);

        let results: Vec<bool> = std::thread::scope(|threads| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    threads.spawn(|| {
                        barrier.wait();
                        match scope.enter() {
                            Ok(scoped) => {
                                scoped.exit().unwrap();
                                true
                            }
                            Err(DependencyError::ScopeReused) => false,
                            Err(other) => panic!("意外的错误: {other}"),
                        }
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|entered| **entered).count(), 1);
    }

    #[test]
    fn test_missing_managed_definition() {
        struct Plain;
        let scope = Scope::new(&Container::new()).managing::<Plain>();
        assert!(matches!(
            scope.enter(),
            Err(DependencyError::InvalidDependencyDefinition { .. })
        ));
    }
}
