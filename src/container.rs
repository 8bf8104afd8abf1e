//! Binding registry.
//!
//! The [Container] collects bindings during a registration phase, then compiles them
//! into [Services] in a single build pass. The compiled services are cached and
//! invalidated by any later registration.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::FutureExt;
use parking_lot::Mutex;
use tracing::debug;

use crate::context::{ActivationScope, ResolutionContext};
use crate::error::WiringError;
use crate::factory::{AsyncFactory, Factory, Managed, Produced};
use crate::helpers::to_standard_param_name;
use crate::key::{Key, TypeKey};
use crate::providers::{AsyncFactoryFn, ServiceLifetime, SyncFactoryFn};
use crate::resolve::{Provider, Resolve, Value};
use crate::resolvers::{DynamicResolver, FactoryResolver, InstanceResolver};
use crate::services::Services;
use crate::signature::Injectable;

/// Options of a container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Disable aliases: every dependency must be resolvable by its declared type
    pub strict: bool,
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Registered bindings and aliases, as seen by the resolvers
pub struct Registry {
    bindings: Vec<(Key, Box<dyn Resolve>)>,
    index: HashMap<Key, usize>,
    aliases: BTreeMap<String, Vec<TypeKey>>,
    exact_aliases: BTreeMap<String, TypeKey>,
    strict: bool,
}

impl Registry {
    fn new(options: ContainerOptions) -> Self {
        Self {
            bindings: Vec::new(),
            index: HashMap::new(),
            aliases: BTreeMap::new(),
            exact_aliases: BTreeMap::new(),
            strict: options.strict,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    pub fn resolver(&self, key: &Key) -> Option<&dyn Resolve> {
        self.index
            .get(key)
            .map(|&position| self.bindings[position].1.as_ref())
    }

    /// Alias set explicitly for a parameter name
    pub fn exact_alias(&self, name: &str) -> Option<&TypeKey> {
        self.exact_aliases.get(name)
    }

    /// Candidate types inferred for a parameter name
    pub fn implicit_aliases(&self, name: &str) -> &[TypeKey] {
        self.aliases.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.bindings.iter().map(|(key, _)| key)
    }

    fn bind(&mut self, key: Key, resolver: Box<dyn Resolve>) -> Result<(), WiringError> {
        if self.contains(&key) {
            return Err(WiringError::DuplicateBinding { key });
        }
        if let Key::Type(target) = &key {
            self.infer_aliases(*target);
        }
        self.index.insert(key.clone(), self.bindings.len());
        self.bindings.push((key, resolver));
        Ok(())
    }

    /// Register the exact, lowercase and snake case names of a bound type
    fn infer_aliases(&mut self, target: TypeKey) {
        if self.strict {
            return;
        }
        let Some(name) = target.short_name() else {
            return;
        };
        for alias in [
            name.to_string(),
            name.to_lowercase(),
            to_standard_param_name(name),
        ] {
            let candidates = self.aliases.entry(alias).or_default();
            if !candidates.contains(&target) {
                candidates.push(target);
            }
        }
    }
}

/// Configuration of a collection of services.
pub struct Container {
    registry: Registry,
    services: Mutex<Option<Services>>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    /// A container without alias machinery
    pub fn strict() -> Self {
        Self::with_options(ContainerOptions::new().strict(true))
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        Self {
            registry: Registry::new(options),
            services: Mutex::default(),
        }
    }

    pub fn is_strict(&self) -> bool {
        self.registry.strict
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.registry.contains(key)
    }

    pub fn len(&self) -> usize {
        self.registry.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.bindings.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.registry.keys()
    }

    fn bind(
        &mut self,
        key: Key,
        resolver: impl Resolve + 'static,
    ) -> Result<&mut Self, WiringError> {
        self.registry.bind(key, Box::new(resolver))?;
        self.invalidate();
        Ok(self)
    }

    fn invalidate(&mut self) {
        *self.services.get_mut() = None;
    }

    /// Bind a type to itself, built by resolving its dependencies
    pub fn bind_type<T: Injectable>(
        &mut self,
        lifetime: ServiceLifetime,
    ) -> Result<&mut Self, WiringError> {
        self.bind(Key::of::<T>(), DynamicResolver::<T>::new(lifetime))
    }

    /// Bind an abstraction to an implementation type.
    ///
    /// The [bind!](crate::bind) macro writes the upcast for trait objects.
    pub fn bind_type_as<S, I>(
        &mut self,
        lifetime: ServiceLifetime,
        upcast: fn(Arc<I>) -> Arc<S>,
    ) -> Result<&mut Self, WiringError>
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable,
    {
        self.bind(Key::of::<S>(), DynamicResolver::<I>::upcast(lifetime, upcast))
    }

    pub fn add_singleton<T: Injectable>(&mut self) -> Result<&mut Self, WiringError> {
        self.bind_type::<T>(ServiceLifetime::Singleton)
    }

    pub fn add_scoped<T: Injectable>(&mut self) -> Result<&mut Self, WiringError> {
        self.bind_type::<T>(ServiceLifetime::Scoped)
    }

    pub fn add_transient<T: Injectable>(&mut self) -> Result<&mut Self, WiringError> {
        self.bind_type::<T>(ServiceLifetime::Transient)
    }

    /// Pin a shared value, bound to its declared type
    pub fn bind_instance<T>(&mut self, instance: Arc<T>) -> Result<&mut Self, WiringError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.bind(Key::of::<T>(), InstanceResolver::new(Value::new(instance)))
    }

    /// Pin a shared value under a name
    pub fn bind_named_instance<T>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        instance: Arc<T>,
    ) -> Result<&mut Self, WiringError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.bind(Key::named(name), InstanceResolver::new(Value::new(instance)))
    }

    /// Bind a factory, keyed by the type it returns
    pub fn bind_factory<T, F, Args>(
        &mut self,
        lifetime: ServiceLifetime,
        factory: F,
    ) -> Result<&mut Self, WiringError>
    where
        T: Send + Sync + 'static,
        F: Factory<Args, T>,
        Args: 'static,
    {
        self.bind_factory_for(Key::of::<T>(), lifetime, factory)
    }

    /// Bind a factory under an explicit key
    pub fn bind_factory_for<T, F, Args>(
        &mut self,
        key: impl Into<Key>,
        lifetime: ServiceLifetime,
        factory: F,
    ) -> Result<&mut Self, WiringError>
    where
        T: Send + Sync + 'static,
        F: Factory<Args, T>,
        Args: 'static,
    {
        let call: SyncFactoryFn = Arc::new(move |scope: &ActivationScope, requested: &Key| {
            let value = <F as Factory<Args, T>>::call(&factory, scope, requested);
            Produced::plain(Value::new(Arc::new(value)))
        });
        self.bind_sync(key.into(), lifetime, call)
    }

    /// Bind a factory returning shared values, keyed by the shared type
    pub fn bind_shared_factory<S, F, Args>(
        &mut self,
        lifetime: ServiceLifetime,
        factory: F,
    ) -> Result<&mut Self, WiringError>
    where
        S: ?Sized + Send + Sync + 'static,
        F: Factory<Args, Arc<S>>,
        Args: 'static,
    {
        let call: SyncFactoryFn = Arc::new(move |scope: &ActivationScope, requested: &Key| {
            let value = <F as Factory<Args, Arc<S>>>::call(&factory, scope, requested);
            Produced::plain(Value::new(value))
        });
        self.bind_sync(Key::of::<S>(), lifetime, call)
    }

    /// Bind a factory producing values that must be released with their scope
    pub fn bind_resource<T, F, Args>(
        &mut self,
        lifetime: ServiceLifetime,
        factory: F,
    ) -> Result<&mut Self, WiringError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Factory<Args, Managed<T>>,
        Args: 'static,
    {
        let call: SyncFactoryFn = Arc::new(move |scope: &ActivationScope, requested: &Key| {
            <F as Factory<Args, Managed<T>>>::call(&factory, scope, requested).into_produced()
        });
        self.bind_sync(Key::of::<T>(), lifetime, call)
    }

    /// Bind an asynchronous factory, keyed by the type it returns
    pub fn bind_async_factory<T, F, Args>(
        &mut self,
        lifetime: ServiceLifetime,
        factory: F,
    ) -> Result<&mut Self, WiringError>
    where
        T: Send + Sync + 'static,
        F: AsyncFactory<Args, T>,
        Args: 'static,
    {
        let call: AsyncFactoryFn = Arc::new(move |scope: ActivationScope, requested: Key| {
            <F as AsyncFactory<Args, T>>::call(&factory, scope, requested)
                .map(|value| Produced::plain(Value::new(Arc::new(value))))
                .boxed()
        });
        self.bind_async(Key::of::<T>(), lifetime, call)
    }

    /// Bind an asynchronous factory producing values that must be released with their scope
    pub fn bind_async_resource<T, F, Args>(
        &mut self,
        lifetime: ServiceLifetime,
        factory: F,
    ) -> Result<&mut Self, WiringError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: AsyncFactory<Args, Managed<T>>,
        Args: 'static,
    {
        let call: AsyncFactoryFn = Arc::new(move |scope: ActivationScope, requested: Key| {
            <F as AsyncFactory<Args, Managed<T>>>::call(&factory, scope, requested)
                .map(Managed::into_produced)
                .boxed()
        });
        self.bind_async(Key::of::<T>(), lifetime, call)
    }

    fn bind_sync(
        &mut self,
        key: Key,
        lifetime: ServiceLifetime,
        call: SyncFactoryFn,
    ) -> Result<&mut Self, WiringError> {
        self.bind(key.clone(), FactoryResolver::sync(key, lifetime, call))
    }

    fn bind_async(
        &mut self,
        key: Key,
        lifetime: ServiceLifetime,
        call: AsyncFactoryFn,
    ) -> Result<&mut Self, WiringError> {
        self.bind(key.clone(), FactoryResolver::asynchronous(key, lifetime, call))
    }

    /// Add a name to the inferred aliases of a type
    pub fn add_alias<T: ?Sized + 'static>(
        &mut self,
        name: impl Into<String>,
    ) -> Result<&mut Self, WiringError> {
        self.add_alias_key(name.into(), TypeKey::of::<T>())
    }

    pub fn add_aliases<I, N>(&mut self, aliases: I) -> Result<&mut Self, WiringError>
    where
        I: IntoIterator<Item = (N, TypeKey)>,
        N: Into<String>,
    {
        for (name, target) in aliases {
            self.add_alias_key(name.into(), target)?;
        }
        Ok(self)
    }

    fn add_alias_key(&mut self, name: String, target: TypeKey) -> Result<&mut Self, WiringError> {
        if self.registry.strict {
            return Err(WiringError::StrictMode {
                operation: "add an alias",
            });
        }
        if self.registry.aliases.contains_key(&name)
            || self.registry.exact_aliases.contains_key(&name)
        {
            return Err(WiringError::AliasAlreadyDefined { name });
        }
        self.registry.aliases.insert(name, vec![target]);
        self.invalidate();
        Ok(self)
    }

    /// Set the exact type resolved for a parameter name
    pub fn set_alias<T: ?Sized + 'static>(
        &mut self,
        name: impl Into<String>,
        override_existing: bool,
    ) -> Result<&mut Self, WiringError> {
        self.set_alias_key(name.into(), TypeKey::of::<T>(), override_existing)
    }

    pub fn set_aliases<I, N>(
        &mut self,
        aliases: I,
        override_existing: bool,
    ) -> Result<&mut Self, WiringError>
    where
        I: IntoIterator<Item = (N, TypeKey)>,
        N: Into<String>,
    {
        for (name, target) in aliases {
            self.set_alias_key(name.into(), target, override_existing)?;
        }
        Ok(self)
    }

    fn set_alias_key(
        &mut self,
        name: String,
        target: TypeKey,
        override_existing: bool,
    ) -> Result<&mut Self, WiringError> {
        if self.registry.strict {
            return Err(WiringError::StrictMode {
                operation: "set an alias",
            });
        }
        if !override_existing && self.registry.exact_aliases.contains_key(&name) {
            return Err(WiringError::AliasAlreadyDefined { name });
        }
        self.registry.exact_aliases.insert(name, target);
        self.invalidate();
        Ok(self)
    }

    /// Compile all bindings into services.
    ///
    /// The whole dependency graph is validated here: a missing dependency, a cycle or
    /// a misconfigured alias fails the build, leaving the bindings untouched.
    pub fn build(&self) -> Result<Services, WiringError> {
        let registry = &self.registry;
        debug!(
            bindings = registry.bindings.len(),
            strict = registry.strict,
            "building services"
        );
        let mut context = ResolutionContext::new();
        let mut map: HashMap<Key, Provider> = HashMap::with_capacity(registry.bindings.len());

        for (key, resolver) in &registry.bindings {
            let memoized = context.resolved(key).cloned();
            let provider = match memoized {
                // compiled earlier as a dependency of another binding
                Some(provider) => {
                    if map.contains_key(key) {
                        return Err(WiringError::DuplicateBinding { key: key.clone() });
                    }
                    provider
                }
                None => {
                    let provider = resolver.build_provider(&mut context, registry)?;
                    context.memoize(key.clone(), provider.clone())?;
                    provider
                }
            };
            map.insert(key.clone(), provider);
        }

        let mut ambiguous = HashMap::new();
        if !registry.strict {
            for (name, candidates) in &registry.aliases {
                let alias = Key::named(name.clone());
                match candidates.as_slice() {
                    // explicit named bindings take precedence over inferred names
                    [target] if !registry.contains(&alias) => {
                        let provider = alias_target(&map, name, *target)?;
                        map.insert(alias, provider);
                    }
                    [_] => {}
                    _ => {
                        ambiguous.insert(name.clone(), candidates.clone());
                    }
                }
            }
            for (name, target) in &registry.exact_aliases {
                let provider = alias_target(&map, name, *target)?;
                ambiguous.remove(name);
                map.insert(Key::named(name.clone()), provider);
            }
        }

        debug!(
            providers = map.len(),
            ambiguous = ambiguous.len(),
            "services built"
        );
        Ok(Services::new(map, ambiguous))
    }

    /// Compiled services, built on first access and after any registration
    pub fn services(&self) -> Result<Services, WiringError> {
        let mut cached = self.services.lock();
        if let Some(services) = cached.as_ref() {
            return Ok(services.clone());
        }
        let services = self.build()?;
        *cached = Some(services.clone());
        Ok(services)
    }

    /// Resolve a service in a throwaway scope.
    ///
    /// The scope is closed before returning: a resource built for this call is handed
    /// over already torn down. Use [Container::resolve_in] to keep it alive.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, WiringError> {
        self.services()?.get::<T>()
    }

    /// Resolve a service in a scope supplied by the caller
    pub fn resolve_in<T: ?Sized + Send + Sync + 'static>(
        &self,
        scope: &ActivationScope,
    ) -> Result<Arc<T>, WiringError> {
        self.services()?.get_in::<T>(scope)
    }

    /// Resolve a service in a throwaway scope, awaiting asynchronous providers.
    ///
    /// Resources are released before the value is returned, as with [Container::resolve].
    pub async fn resolve_async<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<T>, WiringError> {
        self.services()?.aget::<T>().await
    }
}

fn alias_target(
    map: &HashMap<Key, Provider>,
    name: &str,
    target: TypeKey,
) -> Result<Provider, WiringError> {
    map.get(&Key::Type(target))
        .cloned()
        .ok_or_else(|| WiringError::AliasConfiguration {
            name: name.to_string(),
            target: Key::Type(target),
        })
}
