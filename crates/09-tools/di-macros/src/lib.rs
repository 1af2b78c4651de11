//! # DI Macros
//!
//! 这个 crate 提供了生成构造签名和函数签名的过程宏，容器依据这些签名反射构建类型、注入函数参数。
//!
//! ## 核心宏
//!
//! - [`Injectable`] - 为结构体生成构造签名，并在程序启动时注册
//! - [`bindable`] - 为函数生成可绑定的可调用对象
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use di_macros::{bindable, Injectable};
//! use std::sync::Arc;
//!
//! #[derive(Injectable)]
//! pub struct UserService {
//!     repository: Arc<dyn UserRepository>,
//!     #[inject(default = 30)]
//!     timeout_secs: u64,
//! }
//!
//! #[bindable]
//! fn register_user(#[inject] service: Arc<UserService>, name: String) -> bool {
//!     service.create(&name)
//! }
//! ```

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod bindable;
mod injectable;
mod utils;

/// 可注入类型派生宏
///
/// 自动为结构体实现 `Injectable` trait，每个字段对应一个构造参数：
///
/// - `Arc<T>` - 解析 `T`，`T` 可以是 trait 对象
/// - `Option<Arc<T>>` - 可选依赖，无法构建时为 `None`
/// - `Vec<Arc<T>>` - 解析 `T` 的列表定义
/// - 其他类型 - 解析该类型并克隆
///
/// 字段上的 `#[inject(default)]` 或 `#[inject(default = 表达式)]` 在无法解析时使用默认值。
/// 非泛型结构体会通过 `ctor` 在程序启动时注册，使用方需要依赖 `ctor` 和 `di-common`。
///
/// # 示例
///
/// ```rust,ignore
/// #[derive(Injectable)]
/// pub struct Car {
///     engine: Arc<Engine>,
///     #[inject(default = 4)]
///     wheels: u8,
/// }
/// ```
#[proc_macro_derive(Injectable, attributes(inject))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    injectable::derive_injectable_impl(input)
}

/// 可绑定函数宏
///
/// 保留原函数，并生成 `<函数名>_callable()`。参数上的 `#[inject]` 标记显式注入，
/// `#[default(表达式)]` 提供默认值；函数的文档注释会写入签名。
///
/// # 示例
///
/// ```rust,ignore
/// /// 发送欢迎邮件
/// #[bindable]
/// fn send_welcome(#[inject] mailer: Arc<Mailer>, to: String) -> bool {
///     mailer.send(&to)
/// }
///
/// let bound = container.bind(send_welcome_callable(), BindOptions::new());
/// ```
#[proc_macro_attribute]
pub fn bindable(args: TokenStream, input: TokenStream) -> TokenStream {
    bindable::bindable_impl(args, input)
}
