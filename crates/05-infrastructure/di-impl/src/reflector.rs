//! 带缓存的反射器

use di_common::{lookup_reflection, Reflection, TypeKey};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// 带缓存的反射器
///
/// 按类型身份缓存构造签名，缓存满后仍然返回结果但不再写入
pub struct CachingReflector {
    cache: RwLock<HashMap<TypeId, Reflection>>,
    capacity: usize,
}

impl CachingReflector {
    /// 创建反射器
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// 反射一个类型，未注册为可注入类型时返回 `None`
    pub fn reflect(&self, key: &TypeKey) -> Option<Reflection> {
        if let Some(reflection) = self.cache.read().get(&key.id()) {
            return Some(reflection.clone());
        }

        let mut cache = self.cache.write();
        if let Some(existing) = cache.get(&key.id()) {
            return Some(existing.clone());
        }
        // 在写锁内查找，并发的首次反射只计算一次
        let reflection = lookup_reflection(key.id())?;
        if cache.len() < self.capacity {
            cache.insert(key.id(), reflection.clone());
        } else {
            debug!("反射缓存已满，不缓存 {}", key);
        }
        Some(reflection)
    }

    /// 已缓存的条目数
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    /// 缓存概览：类型名 => 签名
    pub fn overview(&self) -> BTreeMap<String, String> {
        self.cache
            .read()
            .values()
            .map(|reflection| {
                let spec = reflection.spec();
                let name = spec
                    .return_type()
                    .map(|key| key.to_string())
                    .unwrap_or_else(|| spec.name().to_string());
                (name, spec.to_string())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_common::{register_injectable, Arguments, DependencyResult, FunctionSpec, Injectable};

    struct Clock;

    impl Injectable for Clock {
        fn signature() -> FunctionSpec {
            FunctionSpec::new("Clock")
        }

        fn construct(_args: &mut Arguments) -> DependencyResult<Self> {
            Ok(Self)
        }
    }

    struct Calendar;

    impl Injectable for Calendar {
        fn signature() -> FunctionSpec {
            FunctionSpec::new("Calendar").param("clock", TypeKey::of::<Clock>())
        }

        fn construct(_args: &mut Arguments) -> DependencyResult<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn test_reflect_is_cached() {
        register_injectable::<Clock>();
        let reflector = CachingReflector::new(8);

        assert!(reflector.reflect(&TypeKey::of::<Clock>()).is_some());
        assert!(reflector.reflect(&TypeKey::of::<Clock>()).is_some());
        assert_eq!(reflector.len(), 1);
        assert_eq!(
            reflector.overview().get("Clock").map(String::as_str),
            Some("() -> Clock")
        );
    }

    #[test]
    fn test_capacity_bound() {
        register_injectable::<Clock>();
        register_injectable::<Calendar>();
        let reflector = CachingReflector::new(1);

        assert!(reflector.reflect(&TypeKey::of::<Clock>()).is_some());
        assert!(reflector.reflect(&TypeKey::of::<Calendar>()).is_some());
        assert_eq!(reflector.len(), 1);
    }

    #[test]
    fn test_concurrent_reflect_shares_entry() {
        register_injectable::<Clock>();
        let reflector = CachingReflector::new(8);
        let barrier = std::sync::Barrier::new(4);

        std::thread::scope(|threads| {
            for _ in 0..4 {
                threads.spawn(|| {
                    barrier.wait();
                    assert!(reflector.reflect(&TypeKey::of::<Clock>()).is_some());
                });
            }
        });
        assert_eq!(reflector.len(), 1);
    }

    #[test]
    fn test_unregistered_type() {
        struct Unknown;
        let reflector = CachingReflector::new(8);
        assert!(reflector.reflect(&TypeKey::of::<Unknown>()).is_none());
        assert!(reflector.is_empty());
    }
}
