//! 宏与容器配合的集成测试

use di_impl::{BindOptions, CallArgs, Container, DependencyError, DependencyResolver};
use di_macros::{bindable, Injectable};
use std::sync::Arc;

pub trait Repository: Send + Sync {
    fn find(&self, id: u32) -> Option<String>;
}

#[derive(Injectable)]
pub struct MemoryRepository;

impl Repository for MemoryRepository {
    fn find(&self, id: u32) -> Option<String> {
        (id == 1).then(|| "alice".to_string())
    }
}

pub struct Clock {
    now: u64,
}

#[derive(Injectable)]
pub struct UserService {
    repository: Arc<dyn Repository>,
    clock: Option<Arc<Clock>>,
    #[inject(default = 30)]
    timeout_secs: u64,
}

impl UserService {
    fn describe(&self, id: u32) -> String {
        let name = self.repository.find(id).unwrap_or_default();
        let now = self.clock.as_ref().map_or(0, |clock| clock.now);
        format!("{name}@{now}/{}", self.timeout_secs)
    }
}

/// 查询用户
#[bindable]
fn lookup(#[inject] service: Arc<UserService>, id: u32) -> String {
    service.describe(id)
}

#[bindable]
fn lookup_with_clock(clock: Arc<Clock>, #[default(0)] offset: u64) -> u64 {
    clock.now + offset
}

#[bindable]
async fn lookup_async(#[inject] service: Arc<UserService>) -> String {
    service.describe(1)
}

fn container() -> Container {
    let container = Container::new();
    container
        .define_alias::<dyn Repository, MemoryRepository, _>(|repository| repository)
        .unwrap();
    container
}

#[test]
fn test_derived_types_are_reflected() {
    let container = container();
    let service = container.resolve::<UserService>().unwrap();
    assert_eq!(service.describe(1), "alice@0/30");

    container.define_instance(Clock { now: 7 }).unwrap();
    let service = container.resolve::<UserService>().unwrap();
    assert_eq!(service.describe(1), "alice@7/30");

    let overview = container.reflection_cache_overview();
    assert!(overview.values().any(|signature| signature.contains("-> UserService")));
}

#[test]
fn test_bound_function_injects_marked_parameters() {
    let bound = container().bind(lookup_callable(), BindOptions::new());
    assert_eq!(bound.name(), "lookup");
    assert_eq!(bound.docs(), Some("查询用户"));

    let result = bound.call(CallArgs::new().named("id", 1_u32)).unwrap();
    assert_eq!(result, "alice@0/30");
}

#[test]
fn test_missing_argument_names_unsupplied_types() {
    let bound = container().bind(lookup_callable(), BindOptions::new());
    match bound.invoke() {
        Err(DependencyError::UnableToInvokeBoundFunction { unresolvable, .. }) => {
            assert_eq!(unresolvable, vec!["u32".to_string()]);
        }
        other => panic!("期望无法调用绑定函数错误, 实际: {other:?}"),
    }
}

#[test]
fn test_magic_bind_uses_function_defaults() {
    let container = container();
    container.define_instance(Clock { now: 100 }).unwrap();

    let bound = container.magic_bind(lookup_with_clock_callable(), BindOptions::new());
    assert_eq!(bound.invoke().unwrap(), 100);
    assert_eq!(bound.call(CallArgs::new().named("offset", 5_u64)).unwrap(), 105);
}

#[tokio::test]
async fn test_async_bound_function() {
    let bound = container().bind_async(lookup_async_callable(), BindOptions::new());
    assert_eq!(bound.invoke().await.unwrap(), "alice@0/30");
}
