//! 类型擦除的实例

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 容器产生的实例
///
/// 内部总是保存一个 `Arc<T>`，因此 trait 对象与普通类型都可以放入容器，
/// 并且通过 [`Arc::ptr_eq`] 可以观察实例身份
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    /// 包装一个值
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// 包装一个已共享的值，`T` 可以是 trait 对象
    pub fn from_arc<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 取出 `Arc<T>`，类型不符时返回 `None`
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// 是否保存着 `T`
    pub fn is<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.value.is::<Arc<T>>()
    }

    /// 被包装值的类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .finish()
    }
}
