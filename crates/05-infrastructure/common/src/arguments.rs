//! 按名称收集的调用参数

use crate::errors::{DependencyError, DependencyResult};
use crate::instance::Instance;
use std::collections::HashMap;
use std::sync::Arc;

/// 构造函数或绑定函数的参数集合
///
/// 引擎和绑定器把已解析的值按参数名放入，生成的构造代码再按名称取出
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: HashMap<String, Instance>,
}

impl Arguments {
    /// 创建空参数集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入参数，返回被替换的旧值
    pub fn insert(&mut self, name: impl Into<String>, value: Instance) -> Option<Instance> {
        self.values.insert(name.into(), value)
    }

    /// 是否包含指定参数
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// 参数个数
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 已提供的参数名
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// 取出共享参数，缺失或类型不符时报错
    pub fn take<T: ?Sized + Send + Sync + 'static>(&mut self, name: &str) -> DependencyResult<Arc<T>> {
        match self.values.remove(name) {
            Some(value) => downcast(name, &value),
            None => Err(DependencyError::MissingArgument {
                name: name.to_string(),
                type_name: std::any::type_name::<T>().to_string(),
            }),
        }
    }

    /// 取出可选参数，缺失时为 `None`
    pub fn take_optional<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> DependencyResult<Option<Arc<T>>> {
        self.values
            .remove(name)
            .map(|value| downcast(name, &value))
            .transpose()
    }

    /// 取出共享参数，缺失时使用默认值
    pub fn take_or<T, F>(&mut self, name: &str, default: F) -> DependencyResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Arc<T>,
    {
        Ok(self.take_optional(name)?.unwrap_or_else(default))
    }

    /// 取出参数的拥有副本
    pub fn take_owned<T: Clone + Send + Sync + 'static>(&mut self, name: &str) -> DependencyResult<T> {
        self.take::<T>(name).map(|value| T::clone(&value))
    }

    /// 取出参数的拥有副本，缺失时使用默认值
    pub fn take_owned_or<T, F>(&mut self, name: &str, default: F) -> DependencyResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        Ok(self
            .take_optional::<T>(name)?
            .map(|value| T::clone(&value))
            .unwrap_or_else(default))
    }
}

fn downcast<T: ?Sized + Send + Sync + 'static>(name: &str, value: &Instance) -> DependencyResult<Arc<T>> {
    value
        .downcast::<T>()
        .ok_or_else(|| DependencyError::ArgumentTypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
}
