//! # DI Common
//!
//! Joinery 依赖注入容器的公共模型。
//!
//! ## 核心类型
//!
//! - [`TypeKey`] - 被请求能力的类型键，区分可选、列表、可等待与托管形态
//! - [`Instance`] - 类型擦除的共享实例
//! - [`FunctionSpec`] - 构造函数与绑定函数的签名
//! - [`Injectable`] - 可由容器反射构建的类型
//! - [`Callable`] / [`AsyncCallable`] - 可由绑定器注入参数的函数
//! - [`DependencyError`] - 统一的错误类型

pub mod arguments;
pub mod callable;
pub mod errors;
pub mod injectable;
pub mod instance;
pub mod key;
pub mod signature;

pub use arguments::*;
pub use callable::*;
pub use errors::*;
pub use injectable::*;
pub use instance::*;
pub use key::*;
pub use signature::*;
