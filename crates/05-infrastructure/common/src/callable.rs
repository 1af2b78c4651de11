//! 可调用对象抽象
//!
//! 绑定器通过签名得知参数，再把解析好的参数交给 [`Callable::invoke`]

use crate::arguments::Arguments;
use crate::errors::DependencyResult;
use crate::signature::FunctionSpec;
use futures::future::BoxFuture;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// 同步可调用对象
pub trait Callable: Send + Sync + 'static {
    /// 返回值类型
    type Output: Send + 'static;

    /// 签名
    fn spec(&self) -> &FunctionSpec;

    /// 用参数调用
    fn invoke(&self, args: &mut Arguments) -> DependencyResult<Self::Output>;
}

/// 异步可调用对象
///
/// 参数在 `invoke` 中同步取出，返回的 future 持有全部参数
pub trait AsyncCallable: Send + Sync + 'static {
    /// 返回值类型
    type Output: Send + 'static;

    /// 签名
    fn spec(&self) -> &FunctionSpec;

    /// 用参数调用
    fn invoke(&self, args: &mut Arguments) -> DependencyResult<BoxFuture<'static, Self::Output>>;
}

impl<C: Callable + ?Sized> Callable for Arc<C> {
    type Output = C::Output;

    fn spec(&self) -> &FunctionSpec {
        (**self).spec()
    }

    fn invoke(&self, args: &mut Arguments) -> DependencyResult<Self::Output> {
        (**self).invoke(args)
    }
}

impl<C: AsyncCallable + ?Sized> AsyncCallable for Arc<C> {
    type Output = C::Output;

    fn spec(&self) -> &FunctionSpec {
        (**self).spec()
    }

    fn invoke(&self, args: &mut Arguments) -> DependencyResult<BoxFuture<'static, Self::Output>> {
        (**self).invoke(args)
    }
}

/// 由签名和闭包组成的同步可调用对象
pub struct FnCallable<F, R> {
    spec: FunctionSpec,
    func: F,
    _output: PhantomData<fn() -> R>,
}

impl<F, R> FnCallable<F, R>
where
    F: Fn(&mut Arguments) -> DependencyResult<R> + Send + Sync + 'static,
    R: Send + 'static,
{
    /// 创建可调用对象
    pub fn new(spec: FunctionSpec, func: F) -> Self {
        Self {
            spec,
            func,
            _output: PhantomData,
        }
    }
}

impl<F, R> Callable for FnCallable<F, R>
where
    F: Fn(&mut Arguments) -> DependencyResult<R> + Send + Sync + 'static,
    R: Send + 'static,
{
    type Output = R;

    fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    fn invoke(&self, args: &mut Arguments) -> DependencyResult<R> {
        (self.func)(args)
    }
}

/// 由签名和返回 future 的闭包组成的异步可调用对象
pub struct AsyncFnCallable<F, Fut> {
    spec: FunctionSpec,
    func: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnCallable<F, Fut>
where
    F: Fn(&mut Arguments) -> DependencyResult<Fut> + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    /// 创建异步可调用对象，签名会被标记为异步
    pub fn new(spec: FunctionSpec, func: F) -> Self {
        Self {
            spec: spec.asynchronous(),
            func,
            _future: PhantomData,
        }
    }
}

impl<F, Fut> AsyncCallable for AsyncFnCallable<F, Fut>
where
    F: Fn(&mut Arguments) -> DependencyResult<Fut> + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    type Output = Fut::Output;

    fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    fn invoke(&self, args: &mut Arguments) -> DependencyResult<BoxFuture<'static, Fut::Output>> {
        let future = (self.func)(args)?;
        Ok(Box::pin(future))
    }
}
