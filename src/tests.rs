use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;

use super::*;

trait DataSource: Send + Sync {
    fn name(&self) -> &str;
}

#[derive(Default)]
struct MemoryRepository;

impl DataSource for MemoryRepository {
    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Default)]
struct Engine;

struct Settings {
    level: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings { level: 3 }
    }
}

struct Car {
    engine: Arc<Engine>,
}

impl Car {
    fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

struct Handler {
    repository: Arc<dyn DataSource>,
}

impl Handler {
    fn new(repository: Arc<dyn DataSource>) -> Self {
        Self { repository }
    }
}

#[derive(Default)]
struct Dashboard {
    engine: Option<Arc<Engine>>,
    settings: Option<Arc<Settings>>,
}

injectable!(MemoryRepository);
injectable!(Engine);
injectable!(Settings);
injectable!(Car => new(engine: Engine));
injectable!(Handler => new(repository => dyn DataSource));
injectable!(Dashboard { engine: Engine, settings: Settings });

#[test]
fn singleton_dependency_is_shared() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_singleton::<Engine>()?.add_transient::<Car>()?;

    let c1: Arc<Car> = container.resolve()?;
    let c2: Arc<Car> = container.resolve()?;
    assert!(!Arc::ptr_eq(&c1, &c2));
    assert!(Arc::ptr_eq(&c1.engine, &c2.engine));

    let engine: Arc<Engine> = container.resolve()?;
    assert!(Arc::ptr_eq(&engine, &c1.engine));
    Ok(())
}

#[test]
fn transient_dependency_is_rebuilt() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_transient::<Engine>()?.add_transient::<Car>()?;

    let services = container.build()?;
    let c1: Arc<Car> = services.get()?;
    let c2: Arc<Car> = services.get()?;
    assert!(!Arc::ptr_eq(&c1.engine, &c2.engine));
    Ok(())
}

#[test]
fn scoped_dependency_is_shared_within_a_scope() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_scoped::<Engine>()?.add_transient::<Car>()?;
    let services = container.build()?;

    let scope = services.create_scope();
    let c1: Arc<Car> = scope.get()?;
    let c2: Arc<Car> = scope.get()?;
    assert!(!Arc::ptr_eq(&c1, &c2));
    assert!(Arc::ptr_eq(&c1.engine, &c2.engine));

    let other = services.create_scope();
    let c3: Arc<Car> = other.get()?;
    assert!(!Arc::ptr_eq(&c1.engine, &c3.engine));

    // each call without a scope uses its own
    let c4: Arc<Car> = services.get()?;
    let c5: Arc<Car> = services.get()?;
    assert!(!Arc::ptr_eq(&c4.engine, &c5.engine));
    Ok(())
}

#[test]
fn seeded_scope_instance_takes_precedence() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_scoped::<Engine>()?.add_transient::<Car>()?;
    let services = container.build()?;

    let engine = Arc::new(Engine);
    let scope = services.create_scope();
    assert!(scope.insert(engine.clone()).is_none());

    let car: Arc<Car> = scope.get()?;
    assert!(Arc::ptr_eq(&car.engine, &engine));
    Ok(())
}

#[test]
fn duplicate_binding_is_rejected() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_singleton::<Engine>()?;

    let error = container.add_transient::<Engine>().err();
    assert!(matches!(
        error,
        Some(WiringError::DuplicateBinding { key }) if key == Key::of::<Engine>()
    ));

    // the original binding still holds
    let e1: Arc<Engine> = container.resolve()?;
    let e2: Arc<Engine> = container.resolve()?;
    assert!(Arc::ptr_eq(&e1, &e2));
    assert_eq!(container.len(), 1);
    Ok(())
}

struct Chicken {
    _egg: Arc<Egg>,
}

impl Chicken {
    fn new(egg: Arc<Egg>) -> Self {
        Self { _egg: egg }
    }
}

struct Egg {
    _chicken: Arc<Chicken>,
}

impl Egg {
    fn new(chicken: Arc<Chicken>) -> Self {
        Self { _chicken: chicken }
    }
}

injectable!(Chicken => new(egg: Egg));
injectable!(Egg => new(chicken: Chicken));

#[test]
fn circular_dependency_names_the_chain() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_transient::<Chicken>()?.add_transient::<Egg>()?;

    for _ in 0..3 {
        match container.build() {
            Err(WiringError::CircularDependency { chain }) => {
                assert_eq!(
                    chain,
                    vec![
                        TypeKey::of::<Chicken>(),
                        TypeKey::of::<Egg>(),
                        TypeKey::of::<Chicken>()
                    ]
                );
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("cycle was not detected"),
        }
    }

    let message = container.build().err().map(|e| e.to_string()).unwrap_or_default();
    assert!(message.contains("Chicken -> "));
    assert!(message.contains("Egg"));
    Ok(())
}

#[test]
fn undeclared_parameter_uses_exact_alias() -> Result<(), WiringError> {
    let mut container = Container::new();
    bind!(container, ServiceLifetime::Singleton, dyn DataSource => MemoryRepository)?;
    container.add_transient::<Handler>()?;

    // no alias derived from the type name matches "repository"
    assert!(matches!(
        container.build(),
        Err(WiringError::CannotResolveParameter { parameter: "repository", owner })
            if owner == TypeKey::of::<Handler>()
    ));

    container.set_alias::<dyn DataSource>("repository", false)?;
    let handler: Arc<Handler> = container.resolve()?;
    assert_eq!(handler.repository.name(), "memory");
    Ok(())
}

#[test]
fn undeclared_parameter_uses_added_alias() -> Result<(), WiringError> {
    let mut container = Container::new();
    bind!(container, ServiceLifetime::Singleton, dyn DataSource => MemoryRepository)?;
    container
        .add_transient::<Handler>()?
        .add_alias::<dyn DataSource>("repository")?;

    let handler: Arc<Handler> = container.resolve()?;
    assert_eq!(handler.repository.name(), "memory");

    assert!(matches!(
        container.add_alias::<dyn DataSource>("repository"),
        Err(WiringError::AliasAlreadyDefined { .. })
    ));
    Ok(())
}

#[test]
fn alias_override_requires_opt_in() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.set_alias::<Engine>("motor", false)?;
    assert!(matches!(
        container.set_alias::<Settings>("motor", false),
        Err(WiringError::AliasAlreadyDefined { name }) if name == "motor"
    ));
    container.set_alias::<Settings>("motor", true)?;
    Ok(())
}

#[test]
fn alias_to_unbound_type_fails_the_build() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_singleton::<Engine>()?;
    container.set_alias::<Settings>("config", false)?;

    assert!(matches!(
        container.build(),
        Err(WiringError::AliasConfiguration { name, target })
            if name == "config" && target == Key::of::<Settings>()
    ));
    Ok(())
}

struct Garage {
    user_store: Arc<UserStore>,
}

impl Garage {
    fn new(user_store: Arc<UserStore>) -> Self {
        Self { user_store }
    }
}

#[derive(Default)]
struct UserStore;

injectable!(UserStore);
injectable!(Garage => new(user_store => UserStore));

#[test]
fn implicit_aliases_follow_type_names() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_singleton::<UserStore>()?.add_transient::<Garage>()?;
    let services = container.build()?;

    let garage: Arc<Garage> = services.get()?;
    let store: Arc<UserStore> = services.get()?;
    assert!(Arc::ptr_eq(&garage.user_store, &store));

    for name in ["UserStore", "userstore", "user_store"] {
        let aliased: Arc<UserStore> = services.get_named(name)?;
        assert!(Arc::ptr_eq(&aliased, &store));
    }
    Ok(())
}

mod north {
    #[derive(Default)]
    pub struct Depot;
}

mod south {
    #[derive(Default)]
    pub struct Depot;
}

struct Truck;

impl Truck {
    fn new(_depot: std::sync::Arc<north::Depot>) -> Self {
        Truck
    }
}

injectable!(north::Depot);
injectable!(south::Depot);
injectable!(Truck => new(depot => north::Depot));

#[test]
fn ambiguous_alias_fails_loudly() -> Result<(), WiringError> {
    let mut container = Container::new();
    container
        .add_singleton::<north::Depot>()?
        .add_singleton::<south::Depot>()?;
    let services = container.build()?;

    match services.get_named::<north::Depot>("depot") {
        Err(WiringError::AmbiguousAlias { name, candidates }) => {
            assert_eq!(name, "depot");
            assert_eq!(candidates.len(), 2);
        }
        _ => panic!("ambiguous alias was resolved"),
    }

    // a default does not hide the ambiguity
    let fallback = Value::new(Arc::new(north::Depot));
    assert!(matches!(
        services.get_key(&Key::named("depot"), None, Some(fallback)),
        Err(WiringError::AmbiguousAlias { .. })
    ));

    container.add_transient::<Truck>()?;
    assert!(matches!(
        container.build(),
        Err(WiringError::AmbiguousAlias { .. })
    ));

    container.set_alias::<north::Depot>("depot", false)?;
    let _truck: Arc<Truck> = container.resolve()?;
    Ok(())
}

#[test]
fn strict_container_rejects_aliases() -> Result<(), WiringError> {
    let mut container = Container::strict();
    assert!(container.is_strict());
    bind!(container, ServiceLifetime::Singleton, dyn DataSource => MemoryRepository)?;

    assert!(matches!(
        container.add_alias::<dyn DataSource>("repository"),
        Err(WiringError::StrictMode { .. })
    ));
    assert!(matches!(
        container.set_alias::<dyn DataSource>("repository", true),
        Err(WiringError::StrictMode { .. })
    ));

    container.add_transient::<Handler>()?;
    assert!(matches!(
        container.build(),
        Err(WiringError::CannotResolveParameter { parameter: "repository", .. })
    ));

    let services = Container::with_options(ContainerOptions::new().strict(true))
        .add_singleton::<Engine>()?
        .build()?;
    assert!(services.get_named::<Engine>("engine").is_err());
    Ok(())
}

struct Either;

impl Injectable for Either {
    fn signature() -> Signature {
        Signature::Constructor(vec![Dependency::union(
            "value",
            vec![TypeKey::of::<Engine>(), TypeKey::of::<Settings>()],
        )])
    }

    fn construct(_args: &mut Arguments) -> Result<Self, WiringError> {
        Ok(Either)
    }
}

struct Maybe;

impl Injectable for Maybe {
    fn signature() -> Signature {
        Signature::Fields(vec![Dependency::optional::<Engine>("engine")])
    }

    fn construct(_args: &mut Arguments) -> Result<Self, WiringError> {
        Ok(Maybe)
    }
}

#[test]
fn union_and_optional_parameters_are_rejected() -> Result<(), WiringError> {
    let mut container = Container::new();
    container
        .add_singleton::<Engine>()?
        .add_singleton::<Settings>()?
        .add_transient::<Either>()?;
    assert!(matches!(
        container.build(),
        Err(WiringError::UnsupportedUnion { parameter: "value", owner })
            if owner == TypeKey::of::<Either>()
    ));

    let mut container = Container::new();
    container.add_singleton::<Engine>()?.add_transient::<Maybe>()?;
    assert!(matches!(
        container.build(),
        Err(WiringError::UnsupportedUnion { parameter: "engine", .. })
    ));
    Ok(())
}

#[test]
fn failed_build_can_be_retried() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_transient::<Car>()?;
    assert!(matches!(
        container.build(),
        Err(WiringError::CannotResolveParameter { parameter: "engine", .. })
    ));

    container.add_singleton::<Engine>()?;
    let car: Arc<Car> = container.resolve()?;
    let engine: Arc<Engine> = container.resolve()?;
    assert!(Arc::ptr_eq(&car.engine, &engine));
    Ok(())
}

#[test]
fn registration_invalidates_services() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_singleton::<Engine>()?;
    assert!(!container.services()?.contains(&Key::of::<Settings>()));

    container.add_singleton::<Settings>()?;
    assert!(container.services()?.contains(&Key::of::<Settings>()));
    Ok(())
}

#[test]
fn property_injection_assigns_fields() -> Result<(), WiringError> {
    let mut container = Container::new();
    container
        .add_singleton::<Engine>()?
        .add_singleton::<Settings>()?
        .add_transient::<Dashboard>()?;
    let services = container.build()?;

    let dashboard: Arc<Dashboard> = services.get()?;
    let engine: Arc<Engine> = services.get()?;
    assert!(dashboard.engine.as_ref().is_some_and(|e| Arc::ptr_eq(e, &engine)));
    assert_eq!(dashboard.settings.as_ref().map(|s| s.level), Some(3));
    Ok(())
}

#[derive(Debug)]
struct Missing(usize);

#[test]
fn default_is_returned_for_unbound_keys() -> Result<(), WiringError> {
    let services = Container::new().build()?;

    let fallback = Arc::new(Missing(7));
    let value: Arc<Missing> = services.get_or(fallback.clone())?;
    assert!(Arc::ptr_eq(&value, &fallback));
    assert_eq!(value.0, 7);

    assert!(matches!(
        services.get::<Missing>(),
        Err(WiringError::CannotResolveKey { key }) if key == Key::of::<Missing>()
    ));
    Ok(())
}

#[test]
fn instances_and_named_instances() -> Result<(), WiringError> {
    let settings = Arc::new(Settings { level: 9 });
    let mut container = Container::new();
    container
        .bind_instance(settings.clone())?
        .bind_named_instance("connection_string", Arc::new(String::from("db://local")))?;
    let services = container.build()?;

    let resolved: Arc<Settings> = services.get()?;
    assert!(Arc::ptr_eq(&resolved, &settings));
    let url: Arc<String> = services.get_named("connection_string")?;
    assert_eq!(url.as_str(), "db://local");
    assert!(matches!(
        services.get_named::<usize>("connection_string"),
        Err(WiringError::TypeMismatch { .. })
    ));
    Ok(())
}

struct Connector {
    url: Arc<String>,
}

impl Connector {
    fn new(url: Arc<String>) -> Self {
        Self { url }
    }
}

injectable!(Connector => new(connection_string => String));

#[test]
fn undeclared_parameter_uses_named_binding() -> Result<(), WiringError> {
    let mut container = Container::new();
    container
        .bind_named_instance("connection_string", Arc::new(String::from("db://local")))?
        .add_transient::<Connector>()?;

    let connector: Arc<Connector> = container.resolve()?;
    assert_eq!(connector.url.as_str(), "db://local");
    Ok(())
}

struct Label(String);

#[test]
fn factories_receive_scope_and_requested_key() -> Result<(), WiringError> {
    let mut container = Container::new();
    container
        .add_scoped::<Engine>()?
        .bind_factory(ServiceLifetime::Transient, || Settings { level: 5 })?
        .bind_factory(ServiceLifetime::Transient, |scope: &ActivationScope| {
            Label(format!("shared engine: {}", scope.get::<Engine>().is_ok()))
        })?
        .bind_factory_for(
            "label",
            ServiceLifetime::Transient,
            |_: &ActivationScope, requested: &Key| requested.to_string(),
        )?
        .bind_shared_factory(ServiceLifetime::Singleton, || -> Arc<dyn DataSource> {
            Arc::new(MemoryRepository)
        })?;
    let services = container.build()?;

    assert_eq!(services.get::<Settings>()?.level, 5);
    assert_eq!(services.get::<Label>()?.0, "shared engine: true");
    assert_eq!(services.get_named::<String>("label")?.as_str(), "\"label\"");

    let r1: Arc<dyn DataSource> = services.get()?;
    let r2: Arc<dyn DataSource> = services.get()?;
    assert!(Arc::ptr_eq(&r1, &r2));
    Ok(())
}

struct Connection;

#[test]
fn resource_released_once_when_scope_closes() -> Result<(), WiringError> {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let mut container = Container::new();
    container.bind_resource(ServiceLifetime::Scoped, move || {
        let counter = counter.clone();
        Managed::new(Connection, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    })?;
    let services = container.build()?;

    let scope = services.create_scope();
    let c1: Arc<Connection> = scope.get()?;
    let c2: Arc<Connection> = scope.get()?;
    assert!(Arc::ptr_eq(&c1, &c2));
    assert_eq!(released.load(Ordering::SeqCst), 0);

    scope.close();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    scope.close();
    drop(scope);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    // a throwaway scope releases the resource before returning
    let _c3: Arc<Connection> = services.get()?;
    assert_eq!(released.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn releases_run_in_reverse_order() -> Result<(), WiringError> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (first, second) = (log.clone(), log.clone());
    let mut container = Container::new();
    container
        .bind_resource(ServiceLifetime::Scoped, move || {
            let log = first.clone();
            Managed::new(Engine, move |_| log.lock().push("engine"))
        })?
        .bind_resource(ServiceLifetime::Scoped, move || {
            let log = second.clone();
            Managed::new(Settings::default(), move |_| log.lock().push("settings"))
        })?;
    let services = container.build()?;

    let scope = services.create_scope();
    scope.get::<Engine>()?;
    scope.get::<Settings>()?;
    drop(scope);
    assert_eq!(*log.lock(), vec!["settings", "engine"]);
    Ok(())
}

#[test]
fn singleton_resource_released_with_creating_scope() -> Result<(), WiringError> {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let mut container = Container::new();
    container.bind_resource(ServiceLifetime::Singleton, move || {
        let counter = counter.clone();
        Managed::new(Connection, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    })?;
    let services = container.build()?;

    let first = services.create_scope();
    let c1: Arc<Connection> = first.get()?;
    let second = services.create_scope();
    let c2: Arc<Connection> = second.get()?;
    assert!(Arc::ptr_eq(&c1, &c2));

    second.close();
    assert_eq!(released.load(Ordering::SeqCst), 0);
    first.close();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn exec_injects_method_parameters() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_singleton::<Engine>()?.add_singleton::<Settings>()?;
    let services = container.build()?;

    let level = services.exec(|_engine: Arc<Engine>, settings: Arc<Settings>| settings.level + 1)?;
    assert_eq!(level, 4);
    // memoized executor
    let level = services.exec(|_engine: Arc<Engine>, settings: Arc<Settings>| settings.level + 1)?;
    assert_eq!(level, 4);

    assert_eq!(services.exec(|| 42)?, 42);
    assert!(matches!(
        services.exec(|missing: Arc<Missing>| missing.0),
        Err(WiringError::CannotResolveKey { .. })
    ));
    Ok(())
}

struct Request {
    path: &'static str,
}

#[test]
fn exec_with_seeded_scope() -> Result<(), WiringError> {
    let services = Container::new().build()?;

    let mut seed = HashMap::new();
    seed.insert(Key::of::<Request>(), Value::new(Arc::new(Request { path: "/users" })));
    let path = services.exec_with(|request: Arc<Request>| request.path.to_string(), seed)?;
    assert_eq!(path, "/users");
    Ok(())
}

#[test]
fn dependency_mix_classification() {
    assert_eq!(DependencyMix::classify(&[]), DependencyMix::None);
    let ready: Provider = Arc::new(InstanceProvider::new(Value::new(Arc::new(Engine))));
    assert_eq!(DependencyMix::classify(&[ready.clone(), ready]), DependencyMix::AllSync);
    assert!(!DependencyMix::AllSync.is_async());
    assert!(DependencyMix::Mixed.is_async());
}

#[test]
fn introspection_accessors() -> Result<(), WiringError> {
    let mut container = Container::new();
    container.add_singleton::<Engine>()?.add_transient::<Car>()?;
    let services = container.build()?;

    assert!(!services.is_empty());
    assert_eq!(services.keys().count(), services.len());
    assert!(services.keys().any(|key| key == &Key::of::<Car>()));
    let scope = services.create_scope();
    assert!(scope.services().contains(&Key::of::<Engine>()));

    let engine = scope.get::<Engine>()?;
    let first = services.get_key(&Key::of::<Engine>(), Some(&scope), None)?;
    let second = services.get_key(&Key::of::<Engine>(), None, None)?;
    assert!(first.ptr_eq(&second));
    assert!(first
        .downcast::<Engine>()
        .is_some_and(|value| Arc::ptr_eq(&value, &engine)));

    assert_eq!(Key::of::<Car>().as_type(), Some(&TypeKey::of::<Car>()));
    assert_eq!(Key::of::<Car>().as_name(), None);
    assert_eq!(Key::named("car").as_name(), Some("car"));
    assert_eq!(Key::named("car").as_type(), None);
    Ok(())
}

#[test]
fn resolution_chain_tracks_nesting() {
    let mut context = ResolutionContext::new();
    let (car, engine) = (TypeKey::of::<Car>(), TypeKey::of::<Engine>());
    assert!(context.enter(car).is_ok());
    assert!(context.enter(engine).is_ok());
    assert_eq!(context.chain(), &[car, engine]);
    assert!(matches!(
        context.enter(car),
        Err(WiringError::CircularDependency { chain }) if chain == vec![car, engine, car]
    ));
    assert_eq!(context.chain().len(), 2);
    context.leave(engine);
    context.leave(car);
    assert!(context.chain().is_empty());
}

#[test]
fn arguments_are_consumed_in_order() -> Result<(), WiringError> {
    let owner = TypeKey::of::<Car>();
    let mut args = Arguments::new(owner, vec![Value::new(Arc::new(Engine))]);
    assert_eq!(args.owner(), owner);
    assert_eq!(args.remaining(), 1);
    args.next::<Engine>()?;
    assert_eq!(args.remaining(), 0);
    assert!(matches!(
        args.next_value(),
        Err(WiringError::MissingArgument { position: 1, .. })
    ));
    Ok(())
}

#[derive(Debug)]
struct Clock {
    id: usize,
}

#[tokio::test]
async fn async_singleton_is_awaited_once() -> Result<(), WiringError> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut container = Container::new();
    container.bind_async_factory(ServiceLifetime::Singleton, move || {
        let counter = counter.clone();
        async move {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Clock { id }
        }
    })?;
    let services = container.build()?;

    assert!(matches!(
        services.get::<Clock>(),
        Err(WiringError::RequiresAwait { .. })
    ));

    let c1: Arc<Clock> = services.aget().await?;
    let c2: Arc<Clock> = services.aget().await?;
    let c3: Arc<Clock> = services.get()?;
    assert!(Arc::ptr_eq(&c1, &c2));
    assert!(Arc::ptr_eq(&c1, &c3));
    assert_eq!(c1.id, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_singleton_initialization() -> Result<(), WiringError> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut container = Container::new();
    container.bind_async_factory(ServiceLifetime::Singleton, move || {
        let counter = counter.clone();
        async move {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Clock { id }
        }
    })?;
    let services = container.build()?;

    let tasks = (0..8).map(|_| {
        let services = services.clone();
        tokio::spawn(async move { services.aget::<Clock>().await })
    });
    let clocks = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect::<Result<Vec<_>, _>>()?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(clocks.iter().all(|clock| Arc::ptr_eq(clock, &clocks[0])));
    Ok(())
}

struct Report {
    clock: Arc<Clock>,
    settings: Arc<Settings>,
}

impl Report {
    fn new(clock: Arc<Clock>, settings: Arc<Settings>) -> Self {
        Self { clock, settings }
    }
}

injectable!(Report => new(clock: Clock, settings: Settings));

#[tokio::test]
async fn mixed_dependencies_are_awaited() -> Result<(), WiringError> {
    let mut container = Container::new();
    container
        .bind_async_factory(ServiceLifetime::Transient, || async { Clock { id: 11 } })?
        .add_singleton::<Settings>()?
        .add_scoped::<Report>()?;
    let services = container.build()?;

    assert!(matches!(
        services.get::<Report>(),
        Err(WiringError::RequiresAwait { .. })
    ));

    let scope = services.create_scope();
    let r1: Arc<Report> = scope.aget().await?;
    let r2: Arc<Report> = scope.aget().await?;
    assert!(Arc::ptr_eq(&r1, &r2));
    assert_eq!(r1.clock.id, 11);
    assert_eq!(r1.settings.level, 3);
    // cached in the scope: no suspension needed anymore
    let r3: Arc<Report> = scope.get()?;
    assert!(Arc::ptr_eq(&r1, &r3));
    scope.aclose().await;
    Ok(())
}

struct First;
struct Second;

struct Pipeline;

impl Pipeline {
    fn new(_first: Arc<First>, _second: Arc<Second>) -> Self {
        Pipeline
    }
}

injectable!(Pipeline => new(first: First, second: Second));

#[tokio::test]
async fn dependencies_are_awaited_in_declaration_order() -> Result<(), WiringError> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (first, second) = (log.clone(), log.clone());
    let mut container = Container::new();
    container
        .bind_async_factory(ServiceLifetime::Transient, move || {
            let log = first.clone();
            async move {
                log.lock().push("first started");
                tokio::time::sleep(Duration::from_millis(20)).await;
                log.lock().push("first done");
                First
            }
        })?
        .bind_async_factory(ServiceLifetime::Transient, move || {
            let log = second.clone();
            async move {
                log.lock().push("second started");
                log.lock().push("second done");
                Second
            }
        })?
        .add_transient::<Pipeline>()?;

    let _pipeline: Arc<Pipeline> = container.resolve_async().await?;
    assert_eq!(
        *log.lock(),
        vec!["first started", "first done", "second started", "second done"]
    );
    Ok(())
}

#[tokio::test]
async fn async_resource_released_by_aclose() -> Result<(), WiringError> {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let mut container = Container::new();
    container.bind_async_resource(ServiceLifetime::Scoped, move |_scope: ActivationScope| {
        let counter = counter.clone();
        async move {
            Managed::with_async_teardown(Connection, move |_| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }
    })?;
    let services = container.build()?;

    let scope = services.create_scope();
    let c1: Arc<Connection> = scope.aget().await?;
    let c2: Arc<Connection> = scope.aget().await?;
    assert!(Arc::ptr_eq(&c1, &c2));

    // synchronous close leaves the deferred releases pending, and keeps the instance
    scope.close();
    assert_eq!(released.load(Ordering::SeqCst), 0);
    let c3: Arc<Connection> = scope.aget().await?;
    assert!(Arc::ptr_eq(&c1, &c3));

    scope.aclose().await;
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(scope.cached(&Key::of::<Connection>()).is_none());
    scope.aclose().await;
    assert_eq!(released.load(Ordering::SeqCst), 1);
    Ok(())
}

struct Lease {
    connection: Arc<Connection>,
    clock: Arc<Clock>,
}

impl Lease {
    fn new(connection: Arc<Connection>, clock: Arc<Clock>) -> Self {
        Self { connection, clock }
    }
}

injectable!(Lease => new(connection: Connection, clock: Clock));

#[tokio::test]
async fn rejected_sync_lookup_builds_nothing() -> Result<(), WiringError> {
    let built = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicUsize::new(0));
    let (on_build, on_release) = (built.clone(), released.clone());
    let mut container = Container::new();
    container
        .bind_resource(ServiceLifetime::Scoped, move || {
            on_build.fetch_add(1, Ordering::SeqCst);
            let counter = on_release.clone();
            Managed::new(Connection, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })?
        .bind_async_factory(ServiceLifetime::Singleton, || async { Clock { id: 4 } })?
        .add_transient::<Lease>()?;
    let services = container.build()?;
    let connection = Key::of::<Connection>();

    let scope = services.create_scope();
    assert!(services.lookup(&Key::of::<Lease>(), &scope, None)?.is_pending());
    assert!(matches!(
        scope.get::<Lease>(),
        Err(WiringError::RequiresAwait { .. })
    ));
    assert_eq!(built.load(Ordering::SeqCst), 0);
    assert!(scope.cached(&connection).is_none());
    scope.close();
    assert_eq!(released.load(Ordering::SeqCst), 0);

    let scope = services.create_scope();
    let lease: Arc<Lease> = scope.aget().await?;
    assert_eq!(lease.clock.id, 4);
    assert_eq!(built.load(Ordering::SeqCst), 1);
    let cached = scope
        .cached(&connection)
        .and_then(|value| value.downcast::<Connection>());
    assert!(cached.is_some_and(|cached| Arc::ptr_eq(&cached, &lease.connection)));
    scope.close();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn aexec_awaits_method_result() -> Result<(), WiringError> {
    let mut container = Container::new();
    container
        .bind_async_factory(ServiceLifetime::Singleton, || async { Clock { id: 3 } })?
        .add_singleton::<Settings>()?;
    let services = container.build()?;

    let total = services
        .aexec(|clock: Arc<Clock>, settings: Arc<Settings>| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            clock.id + settings.level
        })
        .await?;
    assert_eq!(total, 6);
    Ok(())
}
