//! # 依赖注入具体实现
//!
//! 提供依赖注入容器、解析引擎、作用域、函数绑定和容器组合的实现
//!
//! ## 快速上手
//!
//! ```ignore
//! use di_abstractions::DependencyResolver;
//! use di_impl::Container;
//!
//! let container = Container::new();
//! container.define_singleton(|_| Ok(Database::connect("memory")))?;
//! let service = container.resolve::<UserService>()?;
//! ```

pub mod async_scope;
pub mod binding;
pub mod composition;
pub mod container;
pub mod reflector;
pub mod scope;
pub mod settings;
pub mod updaters;

pub use async_scope::{AsyncScope, AsyncScopedContainer, ScopedAsyncBoundFunction};
pub use binding::{AsyncBoundFunction, BindMode, BindOptions, BoundFunction, CallArgs, CallTimeUpdate};
pub use composition::{compose, compose_with, SourceList};
pub use container::{Container, ContainerBuilder};
pub use reflector::CachingReflector;
pub use scope::{Scope, ScopedBoundFunction, ScopedContainer};
pub use settings::ContainerSettings;
pub use updaters::{with_singletons, TemporarySingletons};

// 方便使用者只依赖本 crate
pub use di_abstractions::{
    Alias, AsyncManaged, ContainerDebugInfo, Definition, DefinitionsSource, DependencyResolver,
    Managed, ReadableContainer, ResolveOptions, Resolver,
};
pub use di_common::{
    register_injectable, Arguments, AsyncCallable, AsyncFnCallable, Callable, DependencyError,
    DependencyResult, FnCallable, FunctionSpec, Injectable, Instance, TypeKey,
};
