//! 依赖注入实现的集成测试

use anyhow::Result;
use di_abstractions::{AsyncManaged, DependencyResolver, Managed};
use di_impl::{
    compose, with_singletons, AsyncScope, BindOptions, Container, DependencyError, Scope,
    TemporarySingletons, TypeKey,
};
use di_macros::{bindable, Injectable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("di_impl=debug")
            .with_test_writer()
            .try_init();
    });
}

/// 测试组件
pub struct Engine {
    serial: usize,
}

#[derive(Injectable)]
pub struct Car {
    engine: Arc<Engine>,
}

pub struct Cache {
    serial: usize,
}

pub struct Transaction {
    name: String,
}

pub struct Connection;

#[derive(Injectable)]
pub struct Checkout {
    first: Arc<Cache>,
    second: Arc<Cache>,
}

#[bindable]
fn checkout(#[inject] first: Arc<Cache>, #[inject] second: Arc<Cache>) -> (usize, usize) {
    (first.serial, second.serial)
}

fn counting<T, F>(container: &Container, make: F) -> Result<()>
where
    T: Send + Sync + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let counter = AtomicUsize::new(0);
    container.define_factory(move || make(counter.fetch_add(1, Ordering::SeqCst)))?;
    Ok(())
}

#[test]
fn test_cars_share_singleton_engine() -> Result<()> {
    init_tracing();
    let container = Container::new();
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    container.define_singleton(move |_| {
        Ok(Engine {
            serial: counter.fetch_add(1, Ordering::SeqCst),
        })
    })?;

    let first = container.resolve::<Car>()?;
    let second = container.resolve::<Car>()?;
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.engine, &second.engine));
    assert_eq!(first.engine.serial, 0);
    assert_eq!(built.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_shared_keys_per_invocation() -> Result<()> {
    init_tracing();
    let container = Container::new();
    counting(&container, |serial| Cache { serial })?;

    let bound = container.bind(checkout_callable(), BindOptions::new().shared::<Cache>());
    let (a, b) = bound.invoke()?;
    let (c, d) = bound.invoke()?;
    assert_eq!(a, b);
    assert_eq!(c, d);
    assert_ne!(a, c);

    let unshared = container.resolve::<Checkout>()?;
    assert_ne!(unshared.first.serial, unshared.second.serial);
    Ok(())
}

#[test]
fn test_composition_conflict_names_key() -> Result<()> {
    init_tracing();
    let billing = Container::new();
    billing.define_factory(|| Cache { serial: 1 })?;
    let search = Container::new();
    search.define_factory(|| Cache { serial: 2 })?;

    let error = compose(vec![billing.as_source(), search.as_source()]).unwrap_err();
    match error {
        DependencyError::ConflictingDefinitions { type_name, .. } => assert_eq!(type_name, "Cache"),
        other => panic!("期望定义冲突错误, 实际: {other}"),
    }
    Ok(())
}

#[test]
fn test_composed_container_resolves_from_each_source() -> Result<()> {
    init_tracing();
    let engines = Container::new();
    engines.define_singleton(|_| Ok(Engine { serial: 9 }))?;
    let caches = Container::new();
    caches.define_factory(|| Cache { serial: 3 })?;

    let composed = compose(vec![engines.as_source(), caches.as_source()])?;
    assert_eq!(composed.resolve::<Car>()?.engine.serial, 9);
    assert_eq!(composed.resolve::<Cache>()?.serial, 3);
    Ok(())
}

fn transaction_container(log: Arc<Mutex<Vec<String>>>) -> Result<Container> {
    let container = Container::new();
    let tx_log = log.clone();
    container.define_managed(move |_| {
        let log = tx_log.clone();
        let name = format!("tx{}", log.lock().map(|entries| entries.len()).unwrap_or_default());
        log.lock().expect("日志锁").push(format!("begin {name}"));
        Ok(Managed::from_value(Transaction { name }, move |tx| {
            log.lock().expect("日志锁").push(format!("commit {}", tx.name));
            Ok(())
        }))
    })?;
    container.define_managed(move |_| {
        let log = log.clone();
        log.lock().expect("日志锁").push("connect".to_string());
        Ok(Managed::from_value(Connection, move |_| {
            log.lock().expect("日志锁").push("disconnect".to_string());
            Ok(())
        }))
    })?;
    Ok(container)
}

#[test]
fn test_scope_releases_after_use_in_reverse_order() -> Result<()> {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = transaction_container(log.clone())?;
    let scope = Scope::new(&container).managing::<Connection>().managing::<Transaction>();

    let name = scope.run(|scoped| {
        scoped.resolve::<Connection>()?;
        let tx = scoped.resolve::<Transaction>()?;
        log.lock().expect("日志锁").push(format!("use {}", tx.name));
        Ok(tx.name.clone())
    })?;

    assert_eq!(name, "tx1");
    assert_eq!(
        *log.lock().expect("日志锁"),
        vec!["connect", "begin tx1", "use tx1", "commit tx1", "disconnect"]
    );
    assert!(matches!(scope.enter(), Err(DependencyError::ScopeReused)));
    Ok(())
}

#[test]
fn test_scope_bound_function_gets_fresh_scope() -> Result<()> {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = transaction_container(log.clone())?;
    let scope = Scope::new(&container).singleton::<Transaction>();

    let callable = di_common::FnCallable::new(
        di_common::FunctionSpec::new("record")
            .param("first", TypeKey::of::<Transaction>())
            .inject("first")
            .param("second", TypeKey::of::<Transaction>())
            .inject("second"),
        |args: &mut di_common::Arguments| {
            let first: Arc<Transaction> = args.take("first")?;
            let second: Arc<Transaction> = args.take("second")?;
            Ok(Arc::ptr_eq(&first, &second))
        },
    );
    let bound = scope.bind(callable, BindOptions::new());

    assert!(bound.invoke()?);
    assert!(bound.invoke()?);
    let entries = log.lock().expect("日志锁").clone();
    assert_eq!(entries, vec!["begin tx0", "commit tx0", "begin tx2", "commit tx2"]);
    Ok(())
}

#[tokio::test]
async fn test_async_scope_releases_when_cancelled() -> Result<()> {
    init_tracing();
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let container = Container::new();
    container.define_async_managed(move |_| {
        let counter = counter.clone();
        async move {
            Ok(AsyncManaged::from_value(Connection, move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        }
    })?;

    let scope = AsyncScope::new(&container).managing::<Connection>();
    let consumer = scope.run(|scoped| async move {
        scoped.resolve_async::<Connection>().await?;
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    });
    assert!(tokio::time::timeout(Duration::from_millis(10), consumer).await.is_err());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(released.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_updaters() -> Result<()> {
    init_tracing();
    let container = Container::new();
    counting(&container, |serial| Cache { serial })?;

    let pinned = with_singletons(&container, &[TypeKey::of::<Cache>()])?;
    assert_eq!(pinned.resolve::<Cache>()?.serial, pinned.resolve::<Cache>()?.serial);

    let template = TemporarySingletons::new(&container, [TypeKey::of::<Cache>()]);
    let first = template.enter()?.resolve::<Cache>()?;
    let second = template.enter()?.resolve::<Cache>()?;
    assert_ne!(first.serial, second.serial);
    Ok(())
}
