//! 类型键定义
//!
//! 类型键标识一个被请求的能力，并区分 `Option<T>`、列表、可等待、托管资源等形态

use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 类型键的泛型形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// 裸类型 T
    Plain,
    /// 可选的 T，解析失败时得到缺省值
    Optional,
    /// T 的列表
    List,
    /// 异步产生的 T
    Awaitable,
    /// 需要成对获取与释放的 T
    Managed,
    /// 异步获取与释放的 T
    AsyncManaged,
}

/// 类型键
///
/// 相等性与哈希只取决于类型ID和形态，名称仅用于诊断输出
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    shape: Shape,
}

impl TypeKey {
    /// 裸类型键
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            shape: Shape::Plain,
        }
    }

    /// 可选类型键
    pub fn optional<T: ?Sized + 'static>() -> Self {
        Self::of::<T>().with_shape(Shape::Optional)
    }

    /// 列表类型键，对应实例类型为 `Vec<Arc<T>>`
    pub fn list<T: ?Sized + 'static>() -> Self {
        Self::of::<T>().with_shape(Shape::List)
    }

    /// 可等待类型键
    pub fn awaitable<T: ?Sized + 'static>() -> Self {
        Self::of::<T>().with_shape(Shape::Awaitable)
    }

    /// 托管资源类型键
    pub fn managed<T: ?Sized + 'static>() -> Self {
        Self::of::<T>().with_shape(Shape::Managed)
    }

    /// 异步托管资源类型键
    pub fn async_managed<T: ?Sized + 'static>() -> Self {
        Self::of::<T>().with_shape(Shape::AsyncManaged)
    }

    /// 替换形态
    pub const fn with_shape(self, shape: Shape) -> Self {
        Self {
            id: self.id,
            name: self.name,
            shape,
        }
    }

    /// 去掉形态后的裸类型键
    pub const fn inner(self) -> Self {
        self.with_shape(Shape::Plain)
    }

    /// 底层类型ID
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// 形态
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// 完整类型名（含模块路径）
    pub const fn type_name(&self) -> &'static str {
        self.name
    }

    /// 是否为可选形态
    pub fn is_optional(&self) -> bool {
        self.shape == Shape::Optional
    }

    /// 不带模块路径的类型名
    pub fn short_name(&self) -> String {
        short_type_name(self.name)
    }

    /// 是否属于永远无法构建的基础类型
    pub fn is_unconstructible(&self) -> bool {
        self.shape == Shape::Plain && UNCONSTRUCTIBLE_TYPES.contains(&self.id)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.shape == other.shape
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.shape.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({self})")
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.short_name();
        match self.shape {
            Shape::Plain => write!(f, "{name}"),
            Shape::Optional => write!(f, "Option<{name}>"),
            Shape::List => write!(f, "Vec<{name}>"),
            Shape::Awaitable => write!(f, "Awaitable<{name}>"),
            Shape::Managed => write!(f, "Managed<{name}>"),
            Shape::AsyncManaged => write!(f, "AsyncManaged<{name}>"),
        }
    }
}

/// 永远无法通过容器构建的类型：字符串、数值、布尔、原始字节缓冲与流句柄
static UNCONSTRUCTIBLE_TYPES: Lazy<HashSet<TypeId>> = Lazy::new(|| {
    [
        TypeId::of::<String>(),
        TypeId::of::<str>(),
        TypeId::of::<&'static str>(),
        TypeId::of::<char>(),
        TypeId::of::<bool>(),
        TypeId::of::<i8>(),
        TypeId::of::<i16>(),
        TypeId::of::<i32>(),
        TypeId::of::<i64>(),
        TypeId::of::<i128>(),
        TypeId::of::<isize>(),
        TypeId::of::<u8>(),
        TypeId::of::<u16>(),
        TypeId::of::<u32>(),
        TypeId::of::<u64>(),
        TypeId::of::<u128>(),
        TypeId::of::<usize>(),
        TypeId::of::<f32>(),
        TypeId::of::<f64>(),
        TypeId::of::<Vec<u8>>(),
        TypeId::of::<Box<[u8]>>(),
        TypeId::of::<[u8]>(),
        TypeId::of::<std::fs::File>(),
        TypeId::of::<std::net::TcpStream>(),
    ]
    .into_iter()
    .collect()
});

/// 去掉类型名中每一段路径的模块前缀
///
/// `alloc::sync::Arc<dyn app::Greeter>` => `Arc<dyn Greeter>`
pub fn short_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut segment = String::new();

    for ch in full_name.chars() {
        if matches!(ch, '<' | '>' | ',' | '(' | ')' | '[' | ']' | ';' | '&' | ' ') {
            result.push_str(last_path_segment(&segment));
            segment.clear();
            result.push(ch);
        } else {
            segment.push(ch);
        }
    }
    result.push_str(last_path_segment(&segment));
    result
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Engine;
    trait Greeter {}

    #[test]
    fn test_shapes_are_distinct_keys() {
        let plain = TypeKey::of::<Engine>();
        assert_ne!(plain, TypeKey::optional::<Engine>());
        assert_ne!(plain, TypeKey::list::<Engine>());
        assert_ne!(TypeKey::awaitable::<Engine>(), TypeKey::managed::<Engine>());
        assert_eq!(TypeKey::optional::<Engine>().inner(), plain);
    }

    #[test]
    fn test_display_uses_short_names() {
        assert_eq!(TypeKey::of::<Engine>().to_string(), "Engine");
        assert_eq!(TypeKey::optional::<Engine>().to_string(), "Option<Engine>");
        assert_eq!(
            short_type_name("alloc::sync::Arc<dyn app::Greeter>"),
            "Arc<dyn Greeter>"
        );
        assert_eq!(TypeKey::of::<dyn Greeter>().to_string(), "dyn Greeter");
    }

    #[test]
    fn test_unconstructible_types() {
        assert!(TypeKey::of::<String>().is_unconstructible());
        assert!(TypeKey::of::<u64>().is_unconstructible());
        assert!(TypeKey::of::<Vec<u8>>().is_unconstructible());
        assert!(!TypeKey::optional::<String>().is_unconstructible());
        assert!(!TypeKey::of::<Engine>().is_unconstructible());
    }
}
