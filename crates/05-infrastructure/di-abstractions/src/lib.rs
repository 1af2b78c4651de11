//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义依赖定义和依赖解析的核心接口。
//!
//! ## 核心接口
//!
//! - [`Definition`] - 依赖定义的各种形态
//! - [`DefinitionsSource`] - 定义来源接口
//! - [`ReadableContainer`] - 可读容器接口
//! - [`DependencyResolver`] - 按类型解析的便捷接口
//! - [`Resolver`] - 交给工厂函数的解析器
//! - [`Managed`] / [`AsyncManaged`] - 成对的获取与释放

pub mod container;
pub mod debug_info;
pub mod definition;
pub mod managed;
pub mod resolver;

pub use container::*;
pub use debug_info::*;
pub use definition::*;
pub use managed::*;
pub use resolver::*;
