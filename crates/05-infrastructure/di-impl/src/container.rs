//! 依赖注入容器与解析引擎

use crate::binding::{inject_arguments, BindMode, BindOptions, AsyncBoundFunction, BoundFunction};
use crate::reflector::CachingReflector;
use crate::settings::ContainerSettings;
use di_abstractions::{
    Alias, AsyncManaged, ContainerDebugInfo, Definition, DefinitionsSource, DependencyResolver,
    EmptyDefinitions, Managed, ReadableContainer, ResolveContext, ResolveOptions, Resolver,
};
use di_common::{
    Arguments, AsyncCallable, Callable, DependencyError, DependencyResult, Instance, Reflection,
    Shape, TypeKey,
};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// 依赖注入容器
///
/// 容器是廉价的共享句柄，克隆句柄得到的是同一个容器；
/// 需要隔离的子容器时使用 [`Container::clone_container`]
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

/// 容器状态
pub(crate) struct ContainerInner {
    /// 当前层的显式定义
    layer: RwLock<HashMap<TypeKey, Arc<Definition>>>,
    /// 父定义来源
    parent: Arc<dyn DefinitionsSource>,
    reflector: Arc<CachingReflector>,
    settings: Arc<ContainerSettings>,
    /// 只允许解析已定义的依赖
    explicit: bool,
}

/// 容器构建器
pub struct ContainerBuilder {
    settings: ContainerSettings,
    parent: Option<Arc<dyn DefinitionsSource>>,
    explicit: bool,
}

impl ContainerBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self {
            settings: ContainerSettings::default(),
            parent: None,
            explicit: false,
        }
    }

    /// 使用指定设置
    pub fn settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 以已有定义来源作为父来源
    pub fn parent(mut self, parent: Arc<dyn DefinitionsSource>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// 只解析显式定义的依赖
    pub fn explicit(mut self) -> Self {
        self.explicit = true;
        self
    }

    /// 构建容器
    pub fn build(self) -> Container {
        let reflector = Arc::new(CachingReflector::new(self.settings.reflection_cache_capacity));
        let parent: Arc<dyn DefinitionsSource> = match self.parent {
            Some(parent) => parent,
            None => Arc::new(EmptyDefinitions),
        };
        let container = Container {
            inner: Arc::new(ContainerInner {
                layer: RwLock::new(HashMap::new()),
                parent,
                reflector,
                settings: Arc::new(self.settings),
                explicit: self.explicit,
            }),
        };
        container.define_debug_info();
        debug!("创建容器 (explicit={})", container.inner.explicit);
        container
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// 创建使用默认设置的容器
    pub fn new() -> Self {
        ContainerBuilder::new().build()
    }

    /// 创建只解析显式定义的容器
    pub fn explicit() -> Self {
        ContainerBuilder::new().explicit().build()
    }

    /// 创建构建器
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// 使用指定设置创建容器
    pub fn with_settings(settings: ContainerSettings) -> Self {
        ContainerBuilder::new().settings(settings).build()
    }

    /// 容器设置
    pub fn settings(&self) -> &ContainerSettings {
        &self.inner.settings
    }

    /// 是否只解析显式定义
    pub fn is_explicit(&self) -> bool {
        self.inner.explicit
    }

    /// 创建子容器
    ///
    /// 子容器通过引用共享父容器的定义（包括单例），自己的定义写入独立的一层，可以覆盖父容器
    pub fn clone_container(&self) -> Container {
        let child = Container {
            inner: Arc::new(ContainerInner {
                layer: RwLock::new(HashMap::new()),
                parent: self.inner.clone(),
                reflector: self.inner.reflector.clone(),
                settings: self.inner.settings.clone(),
                explicit: self.inner.explicit,
            }),
        };
        child.define_debug_info();
        child
    }

    /// 作为定义来源，用于组合
    pub fn as_source(&self) -> Arc<dyn DefinitionsSource> {
        self.inner.clone()
    }

    /// 作为可读容器
    pub fn as_readable(&self) -> Arc<dyn ReadableContainer> {
        self.inner.clone()
    }

    /// 以新的解析路径创建解析器
    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.as_readable(), ResolveContext::new())
    }

    /// 注册定义
    pub fn define(&self, key: TypeKey, definition: Definition) -> DependencyResult<()> {
        if key.is_unconstructible() {
            return Err(DependencyError::invalid_definition(
                key.to_string(),
                "基础类型无法由容器构建，也不能被定义",
            ));
        }
        if self.inner.explicit && definition.is_alias() {
            return Err(DependencyError::invalid_definition(
                key.to_string(),
                "显式容器不支持别名定义",
            ));
        }
        if let Definition::Alias(alias) = &definition {
            if alias.target() == key && !alias.skip_definitions() {
                return Err(DependencyError::invalid_definition(
                    key.to_string(),
                    "别名不能指向自身，需要反射构建时请使用 Alias::force_reflection",
                ));
            }
        }

        let mut layer = self.inner.layer.write();
        if layer.contains_key(&key) {
            return Err(DependencyError::DuplicateDefinition {
                type_name: key.to_string(),
            });
        }
        debug!("定义依赖: {} ({})", key, definition.kind());
        layer.insert(key, Arc::new(definition));
        Ok(())
    }

    /// 注册无参工厂，每次解析都会调用
    pub fn define_factory<T, F>(&self, factory: F) -> DependencyResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.define(
            TypeKey::of::<T>(),
            Definition::factory(move || Ok(Instance::new(factory()))),
        )
    }

    /// 注册接收解析器的工厂
    pub fn define_with<T, F>(&self, factory: F) -> DependencyResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver) -> DependencyResult<T> + Send + Sync + 'static,
    {
        self.define(
            TypeKey::of::<T>(),
            Definition::with_container(move |resolver| factory(resolver).map(Instance::new)),
        )
    }

    /// 注册固定实例
    pub fn define_instance<T: Send + Sync + 'static>(&self, value: T) -> DependencyResult<()> {
        self.define(TypeKey::of::<T>(), Definition::instance(Instance::new(value)))
    }

    /// 注册共享的固定实例，`T` 可以是 trait 对象
    pub fn define_shared<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> DependencyResult<()> {
        self.define(TypeKey::of::<T>(), Definition::instance(Instance::from_arc(value)))
    }

    /// 注册单例工厂
    pub fn define_singleton<T, F>(&self, factory: F) -> DependencyResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&Resolver) -> DependencyResult<T> + Send + Sync + 'static,
    {
        self.define(
            TypeKey::of::<T>(),
            Definition::singleton(Definition::with_container(move |resolver| {
                factory(resolver).map(Instance::new)
            })),
        )
    }

    /// 把实现 `I` 注册为抽象 `T`
    ///
    /// ```ignore
    /// container.define_alias::<dyn Greeter, English, _>(|english| english)?;
    /// ```
    pub fn define_alias<T, I, F>(&self, upcast: F) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<I>) -> Arc<T> + Send + Sync + 'static,
    {
        self.define(TypeKey::of::<T>(), Definition::Alias(Alias::upcast::<T, I, F>(upcast)))
    }

    /// 注册异步工厂，对应 `Awaitable<T>` 键
    pub fn define_async<T, F, Fut>(&self, factory: F) -> DependencyResult<()>
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DependencyResult<T>> + Send + 'static,
    {
        self.define(
            TypeKey::awaitable::<T>(),
            Definition::asynchronous(move |resolver| {
                let pending = factory(resolver);
                async move { pending.await.map(Instance::new) }
            }),
        )
    }

    /// 注册托管资源，对应 `Managed<T>` 键，在作用域中使用
    pub fn define_managed<T, F>(&self, acquire: F) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver) -> DependencyResult<Managed<T>> + Send + Sync + 'static,
    {
        self.define(
            TypeKey::managed::<T>(),
            Definition::with_container(move |resolver| {
                acquire(resolver).map(|managed| Instance::new(managed.into_resource()))
            }),
        )
    }

    /// 注册异步托管资源，对应 `AsyncManaged<T>` 键，在异步作用域中使用
    pub fn define_async_managed<T, F, Fut>(&self, acquire: F) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DependencyResult<AsyncManaged<T>>> + Send + 'static,
    {
        self.define(
            TypeKey::async_managed::<T>(),
            Definition::asynchronous(move |resolver| {
                let pending = acquire(resolver);
                async move { pending.await.map(|managed| Instance::new(managed.into_resource())) }
            }),
        )
    }

    /// 注册 `T` 的列表，对应 `Vec<T>` 键
    pub fn define_list<T, F>(&self, factory: F) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver) -> DependencyResult<Vec<Arc<T>>> + Send + Sync + 'static,
    {
        self.define(
            TypeKey::list::<T>(),
            Definition::with_container(move |resolver| factory(resolver).map(Instance::new)),
        )
    }

    /// 以函数的返回类型为键注册定义，解析时注入全部参数并调用函数
    pub fn define_callable<C>(&self, callable: C) -> DependencyResult<()>
    where
        C: Callable,
        C::Output: Sync,
    {
        let callable = Arc::new(callable);
        self.define(
            TypeKey::of::<C::Output>(),
            Definition::with_container(move |resolver| {
                let mut args = inject_arguments(resolver, callable.spec())?;
                callable
                    .invoke(&mut args)
                    .map(Instance::new)
                    .map_err(|error| unresolvable_on_missing(TypeKey::of::<C::Output>(), error))
            }),
        )
    }

    /// 以异步函数的返回类型注册 `Awaitable<T>` 定义
    pub fn define_async_callable<C>(&self, callable: C) -> DependencyResult<()>
    where
        C: AsyncCallable,
        C::Output: Sync,
    {
        let callable = Arc::new(callable);
        self.define(
            TypeKey::awaitable::<C::Output>(),
            Definition::asynchronous(move |resolver| {
                let callable = callable.clone();
                async move {
                    let mut args = crate::binding::inject_arguments_async(&resolver, callable.spec()).await?;
                    let pending = callable
                        .invoke(&mut args)
                        .map_err(|error| unresolvable_on_missing(TypeKey::of::<C::Output>(), error))?;
                    Ok(Instance::new(pending.await))
                }
            }),
        )
    }

    /// 禁止解析指定类型
    pub fn block<T: ?Sized + 'static>(&self) -> DependencyResult<()> {
        self.define(TypeKey::of::<T>(), Definition::unresolvable("该类型已被显式禁用"))
    }

    /// 显式绑定：只注入标记为 `#[inject]` 的参数
    pub fn bind<C: Callable>(&self, callable: C, options: BindOptions) -> BoundFunction<C> {
        BoundFunction::new(self.clone(), callable, BindMode::Explicit, options)
    }

    /// 隐式绑定：尝试注入所有未由调用方提供的参数
    pub fn magic_bind<C: Callable>(&self, callable: C, options: BindOptions) -> BoundFunction<C> {
        BoundFunction::new(self.clone(), callable, BindMode::Implicit, options)
    }

    /// 显式绑定异步函数
    pub fn bind_async<C: AsyncCallable>(&self, callable: C, options: BindOptions) -> AsyncBoundFunction<C> {
        AsyncBoundFunction::new(self.clone(), callable, BindMode::Explicit, options)
    }

    /// 隐式绑定异步函数
    pub fn magic_bind_async<C: AsyncCallable>(
        &self,
        callable: C,
        options: BindOptions,
    ) -> AsyncBoundFunction<C> {
        AsyncBoundFunction::new(self.clone(), callable, BindMode::Implicit, options)
    }

    /// 所有已定义的类型键（包括父来源）
    pub fn defined_types(&self) -> HashSet<TypeKey> {
        self.inner.defined_types()
    }

    /// 查找定义（包括父来源）
    pub fn get_definition(&self, key: &TypeKey) -> Option<Arc<Definition>> {
        self.inner.get_definition(key)
    }

    /// 反射缓存概览
    pub fn reflection_cache_overview(&self) -> BTreeMap<String, String> {
        self.inner.reflection_cache_overview()
    }

    /// 当前容器的调试信息
    pub fn debug_info(&self) -> ContainerDebugInfo {
        ContainerDebugInfo::capture(self.inner.as_ref())
    }

    fn define_debug_info(&self) {
        let key = TypeKey::of::<ContainerDebugInfo>();
        let definition = Definition::with_container(|resolver| {
            Ok(Instance::new(ContainerDebugInfo::capture(resolver.container().as_ref())))
        });
        self.inner.layer.write().insert(key, Arc::new(definition));
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("defined", &self.inner.layer.read().len())
            .field("explicit", &self.inner.explicit)
            .finish()
    }
}

impl DependencyResolver for Container {
    fn resolve_with(&self, key: TypeKey, options: ResolveOptions) -> DependencyResult<Option<Instance>> {
        self.inner.clone().resolve_in(key, options, ResolveContext::new())
    }

    fn resolve_with_async(
        &self,
        key: TypeKey,
        options: ResolveOptions,
    ) -> BoxFuture<'static, DependencyResult<Option<Instance>>> {
        self.inner
            .clone()
            .resolve_async_in(key, options, ResolveContext::new())
    }
}

impl DefinitionsSource for ContainerInner {
    fn get_definition(&self, key: &TypeKey) -> Option<Arc<Definition>> {
        let local = self.layer.read().get(key).cloned();
        local.or_else(|| self.parent.get_definition(key))
    }

    fn defined_types(&self) -> HashSet<TypeKey> {
        let mut types = self.parent.defined_types();
        types.extend(self.layer.read().keys().copied());
        types
    }
}

impl ReadableContainer for ContainerInner {
    fn resolve_in(
        self: Arc<Self>,
        key: TypeKey,
        options: ResolveOptions,
        context: ResolveContext,
    ) -> DependencyResult<Option<Instance>> {
        match self.resolve_required(key, options.skip_definitions, &context) {
            Err(error) if options.suppress_error => {
                debug!("忽略解析失败: {}: {}", key, error);
                Ok(None)
            }
            result => result,
        }
    }

    fn resolve_async_in(
        self: Arc<Self>,
        key: TypeKey,
        options: ResolveOptions,
        context: ResolveContext,
    ) -> BoxFuture<'static, DependencyResult<Option<Instance>>> {
        Box::pin(async move {
            match self.resolve_required_async(key, options.skip_definitions, context).await {
                Err(error) if options.suppress_error => {
                    debug!("忽略解析失败: {}: {}", key, error);
                    Ok(None)
                }
                result => result,
            }
        })
    }

    fn reflection_cache_overview(&self) -> BTreeMap<String, String> {
        self.reflector.overview()
    }
}

impl ContainerInner {
    fn resolve_required(
        self: Arc<Self>,
        key: TypeKey,
        skip_definitions: bool,
        context: &ResolveContext,
    ) -> DependencyResult<Option<Instance>> {
        if key.is_optional() {
            return self.resolve_in(key.inner(), ResolveOptions::suppressed(), context.clone());
        }
        // 显式模式下未定义的键统一报告为未定义
        if key.is_unconstructible() && !self.explicit {
            return Err(DependencyError::unresolvable(key.to_string()));
        }

        let context = context.enter(key, self.settings.max_resolution_depth)?;
        if !skip_definitions {
            if let Some(definition) = self.get_definition(&key) {
                let resolver = Resolver::new(self.clone(), context);
                return definition.get_instance(&key, &resolver).map(Some);
            }
        }

        let (reflection, context) = self.prepare_reflection(key, &context)?;
        let mut args = Arguments::new();
        for param in reflection.spec().parameters() {
            let options = parameter_options(param.default.is_some());
            let resolved = self.clone().resolve_in(param.key, options, context.clone());
            if let Some(instance) = resolved.map_err(|error| wrap_unresolvable(key, error))? {
                args.insert(param.name, instance);
            }
        }
        build(key, &reflection, &mut args).map(Some)
    }

    fn resolve_required_async(
        self: Arc<Self>,
        key: TypeKey,
        skip_definitions: bool,
        context: ResolveContext,
    ) -> BoxFuture<'static, DependencyResult<Option<Instance>>> {
        Box::pin(async move {
            if key.is_optional() {
                return self
                    .resolve_async_in(key.inner(), ResolveOptions::suppressed(), context)
                    .await;
            }
            if key.is_unconstructible() && !self.explicit {
                return Err(DependencyError::unresolvable(key.to_string()));
            }

            let context = context.enter(key, self.settings.max_resolution_depth)?;
            if !skip_definitions {
                let awaitable = key.with_shape(Shape::Awaitable);
                let definition = match key.shape() {
                    Shape::Plain => self
                        .get_definition(&awaitable)
                        .map(|definition| (awaitable, definition)),
                    _ => None,
                }
                .or_else(|| self.get_definition(&key).map(|definition| (key, definition)));

                if let Some((defined_key, definition)) = definition {
                    let resolver = Resolver::new(self.clone(), context);
                    return definition
                        .get_instance_async(defined_key, resolver)
                        .await
                        .map(Some);
                }
            }

            let (reflection, context) = self.prepare_reflection(key, &context)?;
            let mut args = Arguments::new();
            for param in reflection.spec().parameters() {
                let options = parameter_options(param.default.is_some());
                let resolved = self
                    .clone()
                    .resolve_async_in(param.key, options, context.clone())
                    .await;
                if let Some(instance) = resolved.map_err(|error| wrap_unresolvable(key, error))? {
                    args.insert(param.name, instance);
                }
            }
            build(key, &reflection, &mut args).map(Some)
        })
    }

    /// 反射构建前的检查：形态、显式模式、循环依赖
    fn prepare_reflection(
        &self,
        key: TypeKey,
        context: &ResolveContext,
    ) -> DependencyResult<(Reflection, ResolveContext)> {
        if self.explicit {
            return Err(DependencyError::DependencyNotDefined {
                type_name: key.to_string(),
            });
        }
        if key.shape() != Shape::Plain {
            return Err(DependencyError::unresolvable_because(
                key.to_string(),
                "此形态的类型只能通过定义提供",
            ));
        }
        let reflection = self.reflector.reflect(&key).ok_or_else(|| {
            DependencyError::unresolvable_because(key.to_string(), "类型既没有定义，也没有注册为可注入类型")
        })?;
        if self.settings.log_undefined_deps {
            info!(dependency = %key, "反射构建未定义的依赖: {}", key);
        }
        let context = context.push_type(key)?;
        Ok((reflection, context))
    }
}

fn parameter_options(has_default: bool) -> ResolveOptions {
    if has_default {
        ResolveOptions::suppressed()
    } else {
        ResolveOptions::default()
    }
}

fn build(key: TypeKey, reflection: &Reflection, args: &mut Arguments) -> DependencyResult<Instance> {
    reflection
        .build(args)
        .map_err(|error| unresolvable_on_missing(key, error))
}

/// 参数无法解析时，以当前构建的类型报告错误并保留原因
fn wrap_unresolvable(key: TypeKey, error: DependencyError) -> DependencyError {
    if error.is_unresolvable() {
        DependencyError::unresolvable_because(key.to_string(), error)
    } else {
        error
    }
}

/// 构建时参数缺失或类型不符，视为目标类型无法解析
fn unresolvable_on_missing(key: TypeKey, error: DependencyError) -> DependencyError {
    match error {
        DependencyError::MissingArgument { .. } | DependencyError::ArgumentTypeMismatch { .. } => {
            DependencyError::unresolvable_because(key.to_string(), error)
        }
        other => other,
    }
}
