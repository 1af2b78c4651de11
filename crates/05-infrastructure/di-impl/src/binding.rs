//! 函数绑定
//!
//! 绑定后的函数在每次调用时从容器解析参数，调用方提供的参数优先

use crate::container::Container;
use di_abstractions::{required, Definition, DependencyResolver, ResolveOptions, Resolver};
use di_common::{
    Arguments, AsyncCallable, Callable, DependencyError, DependencyResult, FunctionSpec, Instance,
    Parameter, TypeKey,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 调用时更新容器的函数，作用于本次调用专用的子容器
pub type CallTimeUpdate = Arc<dyn Fn(&Container, &CallArgs) -> DependencyResult<()> + Send + Sync>;

/// 绑定模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// 只注入标记为 `#[inject]` 的参数
    Explicit,
    /// 尝试注入所有未提供的参数，失败时留给函数自身的默认值
    Implicit,
}

/// 绑定选项
#[derive(Clone, Default)]
pub struct BindOptions {
    shared: Vec<TypeKey>,
    updater: Option<CallTimeUpdate>,
    keys_to_skip: HashSet<TypeKey>,
    skip_pos_up_to: usize,
}

impl BindOptions {
    /// 创建空选项
    pub fn new() -> Self {
        Self::default()
    }

    /// 在一次调用内共享 `T` 的实例
    pub fn shared<T: ?Sized + 'static>(self) -> Self {
        self.shared_key(TypeKey::of::<T>())
    }

    /// 在一次调用内共享指定键的实例
    pub fn shared_key(mut self, key: TypeKey) -> Self {
        if !self.shared.contains(&key) {
            self.shared.push(key);
        }
        self
    }

    /// 每次调用前更新本次调用的子容器
    pub fn update<F>(mut self, updater: F) -> Self
    where
        F: Fn(&Container, &CallArgs) -> DependencyResult<()> + Send + Sync + 'static,
    {
        self.updater = Some(Arc::new(updater));
        self
    }

    /// 隐式绑定时不注入 `T` 类型的参数
    pub fn skip<T: ?Sized + 'static>(self) -> Self {
        self.skip_key(TypeKey::of::<T>())
    }

    /// 隐式绑定时不注入指定键的参数
    pub fn skip_key(mut self, key: TypeKey) -> Self {
        self.keys_to_skip.insert(key);
        self
    }

    /// 隐式绑定时不注入前 `count` 个位置参数
    pub fn skip_positional(mut self, count: usize) -> Self {
        self.skip_pos_up_to = count;
        self
    }
}

impl fmt::Debug for BindOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindOptions")
            .field("shared", &self.shared)
            .field("has_updater", &self.updater.is_some())
            .field("keys_to_skip", &self.keys_to_skip)
            .field("skip_pos_up_to", &self.skip_pos_up_to)
            .finish()
    }
}

/// 调用方提供的参数
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    positional: Vec<Instance>,
    named: HashMap<String, Instance>,
}

impl CallArgs {
    /// 不提供任何参数
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加位置参数
    pub fn arg<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.arg_shared(Arc::new(value))
    }

    /// 追加共享的位置参数
    pub fn arg_shared<T: ?Sized + Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.positional.push(Instance::from_arc(value));
        self
    }

    /// 追加命名参数
    pub fn named<T: Send + Sync + 'static>(self, name: impl Into<String>, value: T) -> Self {
        self.named_shared(name, Arc::new(value))
    }

    /// 追加共享的命名参数
    pub fn named_shared<T: ?Sized + Send + Sync + 'static>(
        mut self,
        name: impl Into<String>,
        value: Arc<T>,
    ) -> Self {
        self.named.insert(name.into(), Instance::from_arc(value));
        self
    }

    /// 位置参数
    pub fn positional(&self) -> &[Instance] {
        &self.positional
    }

    /// 命名参数
    pub fn get_named(&self, name: &str) -> Option<&Instance> {
        self.named.get(name)
    }

    /// 是否没有任何参数
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    fn into_arguments(self, spec: &FunctionSpec) -> DependencyResult<Arguments> {
        if self.positional.len() > spec.arity() {
            return Err(DependencyError::UnableToInvokeBoundFunction {
                function: spec.name().to_string(),
                message: format!(
                    "函数接受 {} 个参数，但提供了 {} 个位置参数",
                    spec.arity(),
                    self.positional.len()
                ),
                unresolvable: Vec::new(),
            });
        }

        let mut arguments = Arguments::new();
        for (name, value) in spec.args().iter().zip(self.positional) {
            arguments.insert(name.clone(), value);
        }
        for (name, value) in self.named {
            arguments.insert(name, value);
        }
        Ok(arguments)
    }
}

/// 一次调用的准备结果
struct PreparedCall {
    container: Container,
    arguments: Arguments,
    candidates: Vec<Parameter>,
}

fn prepare_call(
    container: &Container,
    spec: &FunctionSpec,
    mode: BindMode,
    options: &BindOptions,
    call_args: CallArgs,
) -> DependencyResult<PreparedCall> {
    let container = call_container(container, options, &call_args)?;
    let arguments = call_args.into_arguments(spec)?;
    let candidates = spec
        .parameters()
        .enumerate()
        .filter(|(index, param)| {
            if arguments.contains(&param.name) {
                return false;
            }
            match mode {
                BindMode::Explicit => param.inject,
                BindMode::Implicit => {
                    *index >= options.skip_pos_up_to && !options.keys_to_skip.contains(&param.key)
                }
            }
        })
        .map(|(_, param)| param)
        .collect();

    Ok(PreparedCall {
        container,
        arguments,
        candidates,
    })
}

/// 本次调用使用的容器：存在共享键或更新函数时创建子容器
fn call_container(
    container: &Container,
    options: &BindOptions,
    call_args: &CallArgs,
) -> DependencyResult<Container> {
    if options.shared.is_empty() && options.updater.is_none() {
        return Ok(container.clone());
    }

    let per_call = container.clone_container();
    for &key in &options.shared {
        let outer = container.clone();
        per_call.define(
            key,
            Definition::singleton(Definition::factory(move || {
                required(key, outer.resolve_with(key, ResolveOptions::default())?)
            })),
        )?;
    }
    if let Some(update) = &options.updater {
        update(&per_call, call_args)?;
    }
    Ok(per_call)
}

fn candidate_options(mode: BindMode, param: &Parameter) -> ResolveOptions {
    ResolveOptions {
        suppress_error: mode == BindMode::Implicit || param.default.is_some(),
        skip_definitions: false,
    }
}

/// 处理候选参数的解析结果；无法解析的参数留空，调用时统一报告
fn accept_candidate(
    arguments: &mut Arguments,
    param: &Parameter,
    resolved: DependencyResult<Option<Instance>>,
) -> DependencyResult<()> {
    match resolved {
        Ok(Some(instance)) => {
            arguments.insert(param.name.clone(), instance);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(error) if error.is_unresolvable() => {
            debug!("参数 {} ({}) 无法注入: {}", param.name, param.key, error);
            Ok(())
        }
        Err(error) => Err(error),
    }
}

/// 没有值也没有默认值的参数类型
fn unsupplied(spec: &FunctionSpec, arguments: &Arguments) -> Vec<String> {
    spec.parameters()
        .filter(|param| param.default.is_none() && !arguments.contains(&param.name))
        .map(|param| param.key.to_string())
        .collect()
}

fn invoke_error(spec: &FunctionSpec, unsupplied: Vec<String>, error: DependencyError) -> DependencyError {
    match error {
        DependencyError::MissingArgument { .. } | DependencyError::ArgumentTypeMismatch { .. } => {
            DependencyError::UnableToInvokeBoundFunction {
                function: spec.name().to_string(),
                message: error.to_string(),
                unresolvable: unsupplied,
            }
        }
        other => other,
    }
}

/// 为函数的全部参数解析值，有默认值的参数解析失败时留空
pub(crate) fn inject_arguments(resolver: &Resolver, spec: &FunctionSpec) -> DependencyResult<Arguments> {
    let mut arguments = Arguments::new();
    for param in spec.parameters() {
        let options = candidate_options(BindMode::Explicit, &param);
        if let Some(instance) = resolver.resolve_with(param.key, options)? {
            arguments.insert(param.name, instance);
        }
    }
    Ok(arguments)
}

/// [`inject_arguments`] 的异步版本
pub(crate) async fn inject_arguments_async(
    resolver: &Resolver,
    spec: &FunctionSpec,
) -> DependencyResult<Arguments> {
    let params: Vec<Parameter> = spec.parameters().collect();
    let mut arguments = Arguments::new();
    for param in params {
        let options = candidate_options(BindMode::Explicit, &param);
        if let Some(instance) = resolver.resolve_with_async(param.key, options).await? {
            arguments.insert(param.name, instance);
        }
    }
    Ok(arguments)
}

/// 绑定了容器的同步函数
pub struct BoundFunction<C> {
    container: Container,
    callable: C,
    mode: BindMode,
    options: BindOptions,
}

impl<C: Callable> BoundFunction<C> {
    pub(crate) fn new(container: Container, callable: C, mode: BindMode, options: BindOptions) -> Self {
        Self {
            container,
            callable,
            mode,
            options,
        }
    }

    /// 被绑定函数的签名
    pub fn spec(&self) -> &FunctionSpec {
        self.callable.spec()
    }

    /// 被绑定函数的名称
    pub fn name(&self) -> &str {
        self.spec().name()
    }

    /// 被绑定函数的文档
    pub fn docs(&self) -> Option<&str> {
        self.spec().docs()
    }

    /// 绑定模式
    pub fn mode(&self) -> BindMode {
        self.mode
    }

    /// 不提供参数调用
    pub fn invoke(&self) -> DependencyResult<C::Output> {
        self.call(CallArgs::new())
    }

    /// 调用函数，未提供的参数从容器解析
    pub fn call(&self, args: CallArgs) -> DependencyResult<C::Output> {
        let spec = self.callable.spec();
        let mut prepared = prepare_call(&self.container, spec, self.mode, &self.options, args)?;

        let resolver = prepared.container.resolver();
        for param in &prepared.candidates {
            let resolved = resolver.resolve_with(param.key, candidate_options(self.mode, param));
            accept_candidate(&mut prepared.arguments, param, resolved)?;
        }

        let missing = unsupplied(spec, &prepared.arguments);
        debug!("调用绑定函数: {}", spec.name());
        self.callable
            .invoke(&mut prepared.arguments)
            .map_err(|error| invoke_error(spec, missing, error))
    }
}

impl<C: Callable> fmt::Debug for BoundFunction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFunction")
            .field("name", &self.name())
            .field("spec", &self.spec().to_string())
            .field("mode", &self.mode)
            .finish()
    }
}

/// 绑定了容器的异步函数
pub struct AsyncBoundFunction<C> {
    container: Container,
    callable: C,
    mode: BindMode,
    options: BindOptions,
}

impl<C: AsyncCallable> AsyncBoundFunction<C> {
    pub(crate) fn new(container: Container, callable: C, mode: BindMode, options: BindOptions) -> Self {
        Self {
            container,
            callable,
            mode,
            options,
        }
    }

    /// 被绑定函数的签名
    pub fn spec(&self) -> &FunctionSpec {
        self.callable.spec()
    }

    /// 被绑定函数的名称
    pub fn name(&self) -> &str {
        self.spec().name()
    }

    /// 被绑定函数的文档
    pub fn docs(&self) -> Option<&str> {
        self.spec().docs()
    }

    /// 绑定模式
    pub fn mode(&self) -> BindMode {
        self.mode
    }

    /// 不提供参数调用
    pub async fn invoke(&self) -> DependencyResult<C::Output> {
        self.call(CallArgs::new()).await
    }

    /// 调用函数，未提供的参数从容器异步解析
    pub async fn call(&self, args: CallArgs) -> DependencyResult<C::Output> {
        let spec = self.callable.spec();
        let mut prepared = prepare_call(&self.container, spec, self.mode, &self.options, args)?;

        let resolver = prepared.container.resolver();
        for param in &prepared.candidates {
            let resolved = resolver
                .resolve_with_async(param.key, candidate_options(self.mode, param))
                .await;
            accept_candidate(&mut prepared.arguments, param, resolved)?;
        }

        let missing = unsupplied(spec, &prepared.arguments);
        debug!("调用异步绑定函数: {}", spec.name());
        let pending = self
            .callable
            .invoke(&mut prepared.arguments)
            .map_err(|error| invoke_error(spec, missing, error))?;
        Ok(pending.await)
    }
}

impl<C: AsyncCallable> fmt::Debug for AsyncBoundFunction<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncBoundFunction")
            .field("name", &self.name())
            .field("spec", &self.spec().to_string())
            .field("mode", &self.mode)
            .finish()
    }
}
