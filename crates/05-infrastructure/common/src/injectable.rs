//! 可注入类型与全局反射表
//!
//! `#[derive(Injectable)]` 为结构体生成构造签名，并在程序启动时把反射信息写入全局表；
//! 也可以通过 [`register_injectable`] 手动注册

use crate::arguments::Arguments;
use crate::errors::DependencyResult;
use crate::instance::Instance;
use crate::key::TypeKey;
use crate::signature::FunctionSpec;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 可以由容器反射构建的类型
pub trait Injectable: Sized + Send + Sync + 'static {
    /// 构造函数签名，参数名与 [`Injectable::construct`] 读取的名称一致
    fn signature() -> FunctionSpec;

    /// 用已解析的参数构建实例
    fn construct(args: &mut Arguments) -> DependencyResult<Self>;
}

/// 一个类型的反射结果：签名加上类型擦除的构建函数
#[derive(Clone)]
pub struct Reflection {
    spec: Arc<FunctionSpec>,
    build: fn(&mut Arguments) -> DependencyResult<Instance>,
}

impl Reflection {
    /// 反射一个可注入类型
    pub fn of<T: Injectable>() -> Self {
        Self {
            spec: Arc::new(T::signature().returns(TypeKey::of::<T>())),
            build: build_instance::<T>,
        }
    }

    /// 构造签名
    pub fn spec(&self) -> &Arc<FunctionSpec> {
        &self.spec
    }

    /// 构建实例
    pub fn build(&self, args: &mut Arguments) -> DependencyResult<Instance> {
        (self.build)(args)
    }
}

impl fmt::Debug for Reflection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reflection")
            .field("spec", &self.spec.to_string())
            .finish()
    }
}

fn build_instance<T: Injectable>(args: &mut Arguments) -> DependencyResult<Instance> {
    T::construct(args).map(Instance::new)
}

/// 全局反射表
static REFLECTIONS: Lazy<RwLock<HashMap<TypeId, fn() -> Reflection>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// 注册可注入类型，重复注册会覆盖旧记录
pub fn register_injectable<T: Injectable>() {
    REFLECTIONS
        .write()
        .insert(TypeId::of::<T>(), Reflection::of::<T>);
}

/// 查找类型的反射信息
pub fn lookup_reflection(id: TypeId) -> Option<Reflection> {
    let factory = REFLECTIONS.read().get(&id).copied();
    factory.map(|reflect| reflect())
}

/// 类型是否已注册
pub fn is_injectable(id: TypeId) -> bool {
    REFLECTIONS.read().contains_key(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Wheel {
        size: u32,
    }

    impl Injectable for Wheel {
        fn signature() -> FunctionSpec {
            FunctionSpec::new("Wheel").param_with_default("size", TypeKey::of::<u32>(), "17")
        }

        fn construct(args: &mut Arguments) -> DependencyResult<Self> {
            Ok(Self {
                size: args.take_owned_or("size", || 17)?,
            })
        }
    }

    #[test]
    fn test_register_and_lookup() {
        assert!(lookup_reflection(TypeId::of::<Wheel>()).is_none());
        register_injectable::<Wheel>();
        assert!(is_injectable(TypeId::of::<Wheel>()));

        let reflection = lookup_reflection(TypeId::of::<Wheel>()).unwrap();
        assert_eq!(reflection.spec().to_string(), "(u32) -> Wheel");

        let instance = reflection.build(&mut Arguments::new()).unwrap();
        assert_eq!(instance.downcast::<Wheel>().unwrap().size, 17);
    }
}
