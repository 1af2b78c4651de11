//! 托管资源
//!
//! 托管资源把获取到的值和对应的释放动作配成一对，作用域在退出时执行释放

use di_common::{BoxError, Instance};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 同步释放动作
pub type Release = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;
/// 异步释放动作
pub type AsyncRelease = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// 带同步释放动作的值
pub struct Managed<T: ?Sized> {
    value: Arc<T>,
    release: Option<Box<dyn FnOnce(Arc<T>) -> Result<(), BoxError> + Send>>,
}

impl<T: ?Sized + Send + Sync + 'static> Managed<T> {
    /// 配对值和释放动作
    pub fn new<F>(value: Arc<T>, release: F) -> Self
    where
        F: FnOnce(Arc<T>) -> Result<(), BoxError> + Send + 'static,
    {
        Self {
            value,
            release: Some(Box::new(release)),
        }
    }

    /// 无需释放的值
    pub fn unmanaged(value: Arc<T>) -> Self {
        Self { value, release: None }
    }

    /// 被管理的值
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// 转换为类型擦除的资源
    pub fn into_resource(self) -> ManagedResource {
        let value = self.value.clone();
        let release = self.release.map(|release| -> Release { Box::new(move || release(value)) });
        ManagedResource {
            value: Instance::from_arc(self.value),
            release: Mutex::new(release),
        }
    }
}

impl<T: Send + Sync + 'static> Managed<T> {
    /// 从拥有的值创建
    pub fn from_value<F>(value: T, release: F) -> Self
    where
        F: FnOnce(Arc<T>) -> Result<(), BoxError> + Send + 'static,
    {
        Self::new(Arc::new(value), release)
    }
}

/// 带异步释放动作的值
pub struct AsyncManaged<T: ?Sized> {
    value: Arc<T>,
    release: Option<Box<dyn FnOnce(Arc<T>) -> BoxFuture<'static, Result<(), BoxError>> + Send>>,
}

impl<T: ?Sized + Send + Sync + 'static> AsyncManaged<T> {
    /// 配对值和异步释放动作
    pub fn new<F, Fut>(value: Arc<T>, release: F) -> Self
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            value,
            release: Some(Box::new(
                move |value: Arc<T>| -> BoxFuture<'static, Result<(), BoxError>> {
                    Box::pin(release(value))
                },
            )),
        }
    }

    /// 无需释放的值
    pub fn unmanaged(value: Arc<T>) -> Self {
        Self { value, release: None }
    }

    /// 被管理的值
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// 转换为类型擦除的资源
    pub fn into_resource(self) -> AsyncManagedResource {
        let value = self.value.clone();
        let release = self
            .release
            .map(|release| -> AsyncRelease { Box::new(move || release(value)) });
        AsyncManagedResource {
            value: Instance::from_arc(self.value),
            release: Mutex::new(release),
        }
    }
}

impl<T: Send + Sync + 'static> AsyncManaged<T> {
    /// 从拥有的值创建
    pub fn from_value<F, Fut>(value: T, release: F) -> Self
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::new(Arc::new(value), release)
    }
}

/// 类型擦除的同步托管资源，释放动作只能取出一次
pub struct ManagedResource {
    value: Instance,
    release: Mutex<Option<Release>>,
}

impl ManagedResource {
    /// 资源的值
    pub fn value(&self) -> &Instance {
        &self.value
    }

    /// 取出释放动作
    pub fn take_release(&self) -> Option<Release> {
        self.release.lock().take()
    }
}

impl fmt::Debug for ManagedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedResource")
            .field("value", &self.value)
            .field("pending_release", &self.release.lock().is_some())
            .finish()
    }
}

/// 类型擦除的异步托管资源
pub struct AsyncManagedResource {
    value: Instance,
    release: Mutex<Option<AsyncRelease>>,
}

impl AsyncManagedResource {
    /// 资源的值
    pub fn value(&self) -> &Instance {
        &self.value
    }

    /// 取出释放动作
    pub fn take_release(&self) -> Option<AsyncRelease> {
        self.release.lock().take()
    }
}

impl fmt::Debug for AsyncManagedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncManagedResource")
            .field("value", &self.value)
            .field("pending_release", &self.release.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_release_taken_once() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let resource = Managed::from_value(5_u32, move |value| {
            assert_eq!(*value, 5);
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .into_resource();

        assert_eq!(*resource.value().downcast::<u32>().unwrap(), 5);
        let release = resource.take_release().unwrap();
        assert!(resource.take_release().is_none());
        release().unwrap();
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_async_release() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let resource = AsyncManaged::from_value("conn".to_string(), move |_| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .into_resource();

        resource.take_release().unwrap()().await.unwrap();
        assert!(released.load(Ordering::SeqCst));
    }
}
