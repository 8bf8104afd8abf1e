//! The provider family.
//!
//! A [ServiceProvider] is assembled from three independent parts:
//!
//! * a caching policy derived from the [ServiceLifetime] of the binding,
//! * an argument strategy, either constructing a type from its ordered dependencies
//!   or delegating to a user factory,
//! * an invocation mode, immediate or awaitable, decided at build time from the
//!   dependencies and the factory.
//!
//! Values produced by resource factories register their teardown on the activation
//! scope that produced them, whatever their lifetime.

use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use tokio::sync::Mutex as AsyncMutex;

use crate::context::ActivationScope;
use crate::error::WiringError;
use crate::factory::Produced;
use crate::key::Key;
use crate::resolve::{Production, Provide, Provider, Value};

/// Reuse policy of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceLifetime {
    /// New instance per resolve
    Transient,
    /// Per-scope instance (shared within active scope)
    Scoped,
    /// Single instance for the lifetime of the compiled services
    Singleton,
}

/// Sync or async nature of the dependencies of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyMix {
    None,
    AllSync,
    Mixed,
    AllAsync,
}

impl DependencyMix {
    pub fn classify(providers: &[Provider]) -> Self {
        let asynchronous = providers.iter().filter(|p| p.is_async()).count();
        match (providers.len(), asynchronous) {
            (0, _) => DependencyMix::None,
            (_, 0) => DependencyMix::AllSync,
            (total, count) if total == count => DependencyMix::AllAsync,
            _ => DependencyMix::Mixed,
        }
    }

    pub fn is_async(self) -> bool {
        matches!(self, DependencyMix::Mixed | DependencyMix::AllAsync)
    }
}

pub(crate) type BuildFn = Box<dyn Fn(Vec<Value>) -> Result<Value, WiringError> + Send + Sync>;
pub(crate) type SyncFactoryFn = Arc<dyn Fn(&ActivationScope, &Key) -> Produced + Send + Sync>;
pub(crate) type AsyncFactoryFn =
    Arc<dyn Fn(ActivationScope, Key) -> BoxFuture<'static, Produced> + Send + Sync>;

/// How the value is obtained once the cache misses
pub(crate) enum Strategy {
    /// Build from the values of ordered dependencies (possibly none)
    Construct {
        dependencies: Vec<Provider>,
        build: BuildFn,
    },
    SyncFactory(SyncFactoryFn),
    AsyncFactory(AsyncFactoryFn),
}

impl Strategy {
    fn is_async(&self) -> bool {
        match self {
            Strategy::Construct { dependencies, .. } => {
                DependencyMix::classify(dependencies).is_async()
            }
            Strategy::SyncFactory(_) => false,
            Strategy::AsyncFactory(_) => true,
        }
    }
}

/// Guarded first initialization of a singleton
#[derive(Default)]
struct SingletonCell {
    value: OnceCell<Value>,
    init: AsyncMutex<()>,
}

enum Caching {
    Transient,
    Scoped,
    Singleton(SingletonCell),
}

impl From<ServiceLifetime> for Caching {
    fn from(lifetime: ServiceLifetime) -> Self {
        match lifetime {
            ServiceLifetime::Transient => Caching::Transient,
            ServiceLifetime::Scoped => Caching::Scoped,
            ServiceLifetime::Singleton => Caching::Singleton(SingletonCell::default()),
        }
    }
}

/// Provider composed of a caching policy and an argument strategy
pub struct ServiceProvider {
    key: Key,
    caching: Caching,
    strategy: Strategy,
    awaitable: bool,
}

impl ServiceProvider {
    pub(crate) fn new(key: Key, lifetime: ServiceLifetime, strategy: Strategy) -> Self {
        let awaitable = strategy.is_async();
        Self {
            key,
            caching: lifetime.into(),
            strategy,
            awaitable,
        }
    }

    /// Produce a new value, bypassing the cache.
    ///
    /// An awaitable provider does no work until its production is awaited: a
    /// synchronous caller rejecting the pending production leaves the scope untouched.
    fn produce<'a>(
        &'a self,
        scope: &'a ActivationScope,
        requested: &'a Key,
    ) -> Result<Production<'a>, WiringError> {
        match &self.strategy {
            Strategy::Construct {
                dependencies,
                build,
            } if self.awaitable => Ok(Production::Pending(Box::pin(async move {
                // declaration order, one dependency at a time
                let mut values = Vec::with_capacity(dependencies.len());
                for dependency in dependencies.iter() {
                    let value = dependency.provide(scope, &self.key)?.resolve().await?;
                    values.push(value);
                }
                build(values)
            }))),
            Strategy::Construct {
                dependencies,
                build,
            } => {
                let values = dependencies
                    .iter()
                    .map(|dependency| dependency.provide(scope, &self.key)?.into_ready(&self.key))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Production::Ready(build(values)?))
            }
            Strategy::SyncFactory(factory) => {
                let produced = factory(scope, requested);
                Ok(Production::Ready(scope.adopt(produced)))
            }
            Strategy::AsyncFactory(factory) => Ok(Production::Pending(Box::pin(async move {
                let produced = factory(scope.clone(), requested.clone()).await;
                Ok::<_, WiringError>(scope.adopt(produced))
            }))),
        }
    }
}

impl Provide for ServiceProvider {
    fn provide<'a>(
        &'a self,
        scope: &'a ActivationScope,
        requested: &'a Key,
    ) -> Result<Production<'a>, WiringError> {
        match &self.caching {
            Caching::Transient => self.produce(scope, requested),
            Caching::Scoped => {
                if let Some(value) = scope.cached(&self.key) {
                    return Ok(Production::Ready(value));
                }
                match self.produce(scope, requested)? {
                    Production::Ready(value) => {
                        Ok(Production::Ready(scope.cache_first(self.key.clone(), value)))
                    }
                    Production::Pending(pending) => Ok(Production::Pending(Box::pin(async move {
                        let value = pending.await?;
                        Ok::<_, WiringError>(scope.cache_first(self.key.clone(), value))
                    }))),
                }
            }
            Caching::Singleton(cell) => {
                if let Some(value) = cell.value.get() {
                    return Ok(Production::Ready(value.clone()));
                }
                if !self.awaitable {
                    return cell
                        .value
                        .get_or_try_init(|| self.produce(scope, requested)?.into_ready(&self.key))
                        .map(|value| Production::Ready(value.clone()));
                }
                Ok(Production::Pending(Box::pin(async move {
                    let _guard = cell.init.lock().await;
                    if let Some(value) = cell.value.get() {
                        return Ok(value.clone());
                    }
                    let value = self.produce(scope, requested)?.resolve().await?;
                    Ok::<_, WiringError>(cell.value.get_or_init(|| value).clone())
                })))
            }
        }
    }

    fn is_async(&self) -> bool {
        self.awaitable
    }
}

/// Generic provider of a pinned value, ignoring the scope
pub struct InstanceProvider(Value);

impl InstanceProvider {
    pub fn new(value: Value) -> Self {
        InstanceProvider(value)
    }
}

impl Provide for InstanceProvider {
    fn provide<'a>(
        &'a self,
        _scope: &'a ActivationScope,
        _requested: &'a Key,
    ) -> Result<Production<'a>, WiringError> {
        Ok(Production::Ready(self.0.clone()))
    }

    fn is_async(&self) -> bool {
        false
    }
}
