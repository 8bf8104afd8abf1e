use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::container::Registry;
use crate::error::WiringError;
use crate::factory::{Produced, Release};
use crate::key::{Key, TypeKey};
use crate::resolve::{Provider, Value};
use crate::services::Services;

/// State of a single build pass.
///
/// The context guarantees that the provider of a key is compiled once per pass and
/// keeps the ordered chain of types being resolved, to reject cycles before
/// descending into them.
#[derive(Default)]
pub struct ResolutionContext {
    resolved: HashMap<Key, Provider>,
    chain: Vec<TypeKey>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider already compiled during this pass
    pub fn resolved(&self, key: &Key) -> Option<&Provider> {
        self.resolved.get(key)
    }

    /// Record the provider compiled for a key.
    ///
    /// Return an error if a provider was already recorded for this key.
    pub fn memoize(&mut self, key: Key, provider: Provider) -> Result<(), WiringError> {
        if self.resolved.contains_key(&key) {
            return Err(WiringError::DuplicateBinding { key });
        }
        self.resolved.insert(key, provider);
        Ok(())
    }

    /// Obtain the provider of a dependency, compiling it if needed
    pub fn provider_for(
        &mut self,
        key: &Key,
        registry: &Registry,
    ) -> Result<Provider, WiringError> {
        if let Some(provider) = self.resolved.get(key) {
            return Ok(provider.clone());
        }
        let resolver = registry
            .resolver(key)
            .ok_or_else(|| WiringError::CannotResolveKey { key: key.clone() })?;
        let provider = resolver.build_provider(self, registry)?;
        self.memoize(key.clone(), provider.clone())?;
        Ok(provider)
    }

    /// Start resolving a type, failing if it is already being resolved
    pub fn enter(&mut self, owner: TypeKey) -> Result<(), WiringError> {
        if self.chain.contains(&owner) {
            let mut chain = self.chain.clone();
            chain.push(owner);
            return Err(WiringError::CircularDependency { chain });
        }
        self.chain.push(owner);
        Ok(())
    }

    pub fn leave(&mut self, owner: TypeKey) {
        let last = self.chain.pop();
        debug_assert_eq!(last, Some(owner), "unbalanced resolution chain");
    }

    pub fn chain(&self) -> &[TypeKey] {
        &self.chain
    }
}

type DeferredRelease = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A bounded unit of resolution work.
///
/// The scope caches the instances of scoped services and owns the teardown of the
/// resources produced while it is active. Handles are cheap to clone and share the
/// same state; the scope is unwound by [ActivationScope::close] or
/// [ActivationScope::aclose], and in any case when the last handle is dropped.
#[derive(Clone)]
pub struct ActivationScope {
    inner: Arc<ScopeState>,
}

struct ScopeState {
    services: Services,
    instances: Mutex<HashMap<Key, Value>>,
    immediate: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    deferred: Mutex<Vec<DeferredRelease>>,
}

impl ActivationScope {
    pub(crate) fn new(services: Services, instances: HashMap<Key, Value>) -> Self {
        Self {
            inner: Arc::new(ScopeState {
                services,
                instances: Mutex::new(instances),
                immediate: Mutex::default(),
                deferred: Mutex::default(),
            }),
        }
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    /// Resolve a service within this scope
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, WiringError> {
        self.inner.services.get_in::<T>(self)
    }

    /// Resolve a service within this scope, awaiting asynchronous providers
    pub async fn aget<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, WiringError> {
        self.inner.services.aget_in::<T>(self).await
    }

    /// Seed a scoped instance, returning the instance it replaces
    pub fn insert<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> Option<Value> {
        self.inner
            .instances
            .lock()
            .insert(Key::of::<T>(), Value::new(value))
    }

    pub fn cached(&self, key: &Key) -> Option<Value> {
        self.inner.instances.lock().get(key).cloned()
    }

    /// Cache a scoped instance unless one was stored first, and return the stored one
    pub(crate) fn cache_first(&self, key: Key, value: Value) -> Value {
        self.inner
            .instances
            .lock()
            .entry(key)
            .or_insert(value)
            .clone()
    }

    /// Register the teardown of a produced value on the matching stack
    pub(crate) fn adopt(&self, produced: Produced) -> Value {
        match produced.release {
            Some(Release::Immediate(release)) => self.inner.immediate.lock().push(release),
            Some(Release::Deferred(release)) => self.inner.deferred.lock().push(release),
            None => {}
        }
        produced.value
    }

    /// Unwind the immediate cleanup stack and clear the scoped instances.
    ///
    /// Deferred (asynchronous) releases are kept for [ActivationScope::aclose]. While
    /// some are pending, the scoped instances stay cached as well: the scope is only
    /// half closed, and resolving a scoped service again returns the instance awaiting
    /// its release instead of building a second one.
    pub fn close(&self) {
        self.inner.unwind_immediate();
        let pending = self.inner.deferred.lock().len();
        if pending > 0 {
            trace!(count = pending, "scoped instances kept until deferred releases run");
            return;
        }
        self.inner.instances.lock().clear();
    }

    /// Unwind both cleanup stacks and clear the scoped instances.
    pub async fn aclose(&self) {
        self.inner.unwind_immediate();
        let releases = std::mem::take(&mut *self.inner.deferred.lock());
        if !releases.is_empty() {
            trace!(count = releases.len(), "awaiting deferred releases");
        }
        for release in releases.into_iter().rev() {
            release().await;
        }
        self.inner.instances.lock().clear();
    }
}

impl ScopeState {
    fn unwind_immediate(&self) {
        let releases = std::mem::take(&mut *self.immediate.lock());
        if !releases.is_empty() {
            trace!(count = releases.len(), "running scope releases");
        }
        for release in releases.into_iter().rev() {
            release();
        }
    }
}

impl Drop for ScopeState {
    fn drop(&mut self) {
        self.unwind_immediate();
        let pending = self.deferred.get_mut().len();
        if pending > 0 {
            warn!(
                count = pending,
                "activation scope dropped with asynchronous releases that were never awaited"
            );
        }
    }
}
