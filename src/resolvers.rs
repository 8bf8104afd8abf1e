//! Resolvers compiling each kind of binding into a provider.
//!
//! The [DynamicResolver] walks the dependency graph of an injectable type: every
//! dependency is compiled recursively through the [ResolutionContext], which reuses
//! providers already compiled during the same build.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::container::Registry;
use crate::context::ResolutionContext;
use crate::error::WiringError;
use crate::key::{Key, TypeKey};
use crate::providers::{
    AsyncFactoryFn, BuildFn, DependencyMix, InstanceProvider, ServiceLifetime, ServiceProvider,
    Strategy, SyncFactoryFn,
};
use crate::resolve::{Provider, Resolve, Value};
use crate::signature::{Arguments, Declared, Dependency, Injectable, Signature};

type Convert<T> = Arc<dyn Fn(T) -> Value + Send + Sync>;

/// Build instances of an injectable type, stored under a service key
pub struct DynamicResolver<T> {
    key: Key,
    lifetime: ServiceLifetime,
    convert: Convert<T>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Injectable> DynamicResolver<T> {
    /// Store instances of the type itself
    pub fn new(lifetime: ServiceLifetime) -> Self {
        Self::with_conversion(
            Key::of::<T>(),
            lifetime,
            Arc::new(|instance: T| Value::new(Arc::new(instance))),
        )
    }

    /// Store instances as another shared type, usually a trait object
    pub fn upcast<S: ?Sized + Send + Sync + 'static>(
        lifetime: ServiceLifetime,
        upcast: fn(Arc<T>) -> Arc<S>,
    ) -> Self {
        Self::with_conversion(
            Key::of::<S>(),
            lifetime,
            Arc::new(move |instance: T| Value::new(upcast(Arc::new(instance)))),
        )
    }

    fn with_conversion(key: Key, lifetime: ServiceLifetime, convert: Convert<T>) -> Self {
        Self {
            key,
            lifetime,
            convert,
            _target: PhantomData,
        }
    }

    /// Determine the key to resolve for a parameter or a field
    fn dependency_key(
        &self,
        dependency: &Dependency,
        registry: &Registry,
    ) -> Result<Key, WiringError> {
        let owner = TypeKey::of::<T>();
        let parameter = dependency.name();
        let key = match dependency.declared() {
            Declared::Union(_) | Declared::Optional(_) => {
                return Err(WiringError::UnsupportedUnion { parameter, owner })
            }
            Declared::Type(declared) => Key::Type(*declared),
            Declared::Undeclared => {
                if registry.is_strict() {
                    return Err(WiringError::CannotResolveParameter { parameter, owner });
                }
                let named = Key::named(parameter);
                if let Some(exact) = registry.exact_alias(parameter) {
                    Key::Type(*exact)
                } else if registry.contains(&named) {
                    named
                } else {
                    match registry.implicit_aliases(parameter) {
                        [single] => Key::Type(*single),
                        [] => return Err(WiringError::CannotResolveParameter { parameter, owner }),
                        candidates => {
                            return Err(WiringError::AmbiguousAlias {
                                name: parameter.to_string(),
                                candidates: candidates.to_vec(),
                            })
                        }
                    }
                }
            }
        };
        if !registry.contains(&key) {
            return Err(WiringError::CannotResolveParameter { parameter, owner });
        }
        Ok(key)
    }

    /// Resolve the providers of all dependencies, in declaration order
    fn dependency_providers(
        &self,
        dependencies: &[Dependency],
        context: &mut ResolutionContext,
        registry: &Registry,
    ) -> Result<Vec<Provider>, WiringError> {
        dependencies
            .iter()
            .map(|dependency| {
                let key = self.dependency_key(dependency, registry)?;
                context.provider_for(&key, registry)
            })
            .collect()
    }

    fn compile(
        &self,
        context: &mut ResolutionContext,
        registry: &Registry,
    ) -> Result<Provider, WiringError> {
        let owner = TypeKey::of::<T>();
        let convert = self.convert.clone();
        let (dependencies, build) = match T::signature() {
            Signature::Trivial => (Vec::new(), constructor(owner, convert)),
            Signature::Constructor(parameters) => (
                self.dependency_providers(&parameters, context, registry)?,
                constructor(owner, convert),
            ),
            Signature::Fields(fields) => (
                self.dependency_providers(&fields, context, registry)?,
                field_injector(owner, convert, fields.iter().map(Dependency::name).collect()),
            ),
        };

        let mix = DependencyMix::classify(&dependencies);
        trace!(key = %self.key, lifetime = ?self.lifetime, ?mix, "compiled type provider");
        let strategy = Strategy::Construct {
            dependencies,
            build,
        };
        Ok(Arc::new(ServiceProvider::new(
            self.key.clone(),
            self.lifetime,
            strategy,
        )))
    }
}

impl<T: Injectable> Resolve for DynamicResolver<T> {
    fn build_provider(
        &self,
        context: &mut ResolutionContext,
        registry: &Registry,
    ) -> Result<Provider, WiringError> {
        let owner = TypeKey::of::<T>();
        context.enter(owner)?;
        let provider = self.compile(context, registry);
        context.leave(owner);
        provider
    }
}

#[derive(Clone)]
enum FactoryFn {
    Sync(SyncFactoryFn),
    Async(AsyncFactoryFn),
}

/// Delegate to a user factory, with arguments normalized to the scope and requested key
pub struct FactoryResolver {
    key: Key,
    lifetime: ServiceLifetime,
    factory: FactoryFn,
}

impl FactoryResolver {
    pub(crate) fn sync(key: Key, lifetime: ServiceLifetime, factory: SyncFactoryFn) -> Self {
        Self {
            key,
            lifetime,
            factory: FactoryFn::Sync(factory),
        }
    }

    pub(crate) fn asynchronous(
        key: Key,
        lifetime: ServiceLifetime,
        factory: AsyncFactoryFn,
    ) -> Self {
        Self {
            key,
            lifetime,
            factory: FactoryFn::Async(factory),
        }
    }
}

impl Resolve for FactoryResolver {
    fn build_provider(
        &self,
        _context: &mut ResolutionContext,
        _registry: &Registry,
    ) -> Result<Provider, WiringError> {
        let strategy = match self.factory.clone() {
            FactoryFn::Sync(factory) => Strategy::SyncFactory(factory),
            FactoryFn::Async(factory) => Strategy::AsyncFactory(factory),
        };
        trace!(key = %self.key, lifetime = ?self.lifetime, "compiled factory provider");
        Ok(Arc::new(ServiceProvider::new(
            self.key.clone(),
            self.lifetime,
            strategy,
        )))
    }
}

/// Return a pinned value
pub struct InstanceResolver {
    value: Value,
}

impl InstanceResolver {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Resolve for InstanceResolver {
    fn build_provider(
        &self,
        _context: &mut ResolutionContext,
        _registry: &Registry,
    ) -> Result<Provider, WiringError> {
        Ok(Arc::new(InstanceProvider::new(self.value.clone())))
    }
}

/// Build the instance from its constructor arguments
fn constructor<T: Injectable>(owner: TypeKey, convert: Convert<T>) -> BuildFn {
    Box::new(move |values: Vec<Value>| -> Result<Value, WiringError> {
        let instance = T::construct(&mut Arguments::new(owner, values))?;
        Ok(convert(instance))
    })
}

/// Build a bare instance, then assign each field in declaration order
fn field_injector<T: Injectable>(
    owner: TypeKey,
    convert: Convert<T>,
    fields: Vec<&'static str>,
) -> BuildFn {
    Box::new(move |values: Vec<Value>| -> Result<Value, WiringError> {
        let mut instance = T::construct(&mut Arguments::new(owner, Vec::new()))?;
        let mut args = Arguments::new(owner, values);
        for field in fields.iter().copied() {
            instance.assign(field, &mut args)?;
        }
        Ok(convert(instance))
    })
}
