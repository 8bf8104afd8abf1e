//! Runtime facade over compiled providers.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::context::ActivationScope;
use crate::error::WiringError;
use crate::inject::Method;
use crate::key::{Key, TypeKey};
use crate::resolve::{Production, Provider, Value};
use crate::signature::Arguments;

/// Compiled services, shared read-only between callers.
///
/// Cloning is cheap: all clones share the same providers, singletons and executors.
#[derive(Clone)]
pub struct Services {
    inner: Arc<ServicesInner>,
}

struct ServicesInner {
    map: HashMap<Key, Provider>,
    ambiguous: HashMap<String, Vec<TypeKey>>,
    executors: DashMap<TypeId, Arc<[Key]>>,
}

impl Services {
    pub(crate) fn new(
        map: HashMap<Key, Provider>,
        ambiguous: HashMap<String, Vec<TypeKey>>,
    ) -> Self {
        Self {
            inner: Arc::new(ServicesInner {
                map,
                ambiguous,
                executors: DashMap::new(),
            }),
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.inner.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.map.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.inner.map.keys()
    }

    pub fn create_scope(&self) -> ActivationScope {
        ActivationScope::new(self.clone(), HashMap::new())
    }

    /// Open a scope with seeded scoped instances
    pub fn create_scope_with(&self, seed: HashMap<Key, Value>) -> ActivationScope {
        ActivationScope::new(self.clone(), seed)
    }

    /// Find the value of a key in a scope.
    ///
    /// The scoped instances are consulted first, then the providers, then the default.
    pub fn lookup<'a>(
        &'a self,
        key: &'a Key,
        scope: &'a ActivationScope,
        default: Option<Value>,
    ) -> Result<Production<'a>, WiringError> {
        if let Some(value) = scope.cached(key) {
            return Ok(Production::Ready(value));
        }
        if let Some(provider) = self.inner.map.get(key) {
            return provider.provide(scope, key);
        }
        if let Key::Name(name) = key {
            if let Some(candidates) = self.inner.ambiguous.get(name.as_ref()) {
                return Err(WiringError::AmbiguousAlias {
                    name: name.to_string(),
                    candidates: candidates.clone(),
                });
            }
        }
        default
            .map(Production::Ready)
            .ok_or_else(|| WiringError::CannotResolveKey { key: key.clone() })
    }

    /// Obtain the value of a key without suspending.
    ///
    /// Without a scope, a throwaway scope is used and closed before returning: the
    /// immediate teardowns of the resources it created have already run when the value
    /// is handed over. Resolve resources in an explicit scope to use them before release.
    pub fn get_key(
        &self,
        key: &Key,
        scope: Option<&ActivationScope>,
        default: Option<Value>,
    ) -> Result<Value, WiringError> {
        if let Some(scope) = scope {
            return self.lookup(key, scope, default)?.into_ready(key);
        }
        let scope = self.create_scope();
        let value = self
            .lookup(key, &scope, default)
            .and_then(|production| production.into_ready(key));
        scope.close();
        value
    }

    /// Obtain the value of a key, awaiting asynchronous providers.
    ///
    /// Without a scope, a throwaway scope is used and awaited closed before returning,
    /// so every resource it created is already released.
    pub async fn aget_key(
        &self,
        key: &Key,
        scope: Option<&ActivationScope>,
        default: Option<Value>,
    ) -> Result<Value, WiringError> {
        if let Some(scope) = scope {
            return self.lookup(key, scope, default)?.resolve().await;
        }
        let scope = self.create_scope();
        let value = match self.lookup(key, &scope, default) {
            Ok(production) => production.resolve().await,
            Err(e) => Err(e),
        };
        scope.aclose().await;
        value
    }

    /// Obtain a value in a throwaway scope.
    ///
    /// The scope is closed before returning, so a resource built for this call is
    /// handed over already torn down. Use [Services::get_in] to keep it alive.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, WiringError> {
        let key = Key::of::<T>();
        self.get_key(&key, None, None)?.downcast_for::<T>(&key)
    }

    pub fn get_in<T: ?Sized + Send + Sync + 'static>(
        &self,
        scope: &ActivationScope,
    ) -> Result<Arc<T>, WiringError> {
        let key = Key::of::<T>();
        self.get_key(&key, Some(scope), None)?.downcast_for::<T>(&key)
    }

    /// Obtain a value, falling back to a default for unbound types
    pub fn get_or<T: ?Sized + Send + Sync + 'static>(
        &self,
        default: Arc<T>,
    ) -> Result<Arc<T>, WiringError> {
        let key = Key::of::<T>();
        self.get_key(&key, None, Some(Value::new(default)))?
            .downcast_for::<T>(&key)
    }

    /// Obtain a value bound or aliased under a name
    pub fn get_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, WiringError> {
        let key = Key::named(name.to_string());
        self.get_key(&key, None, None)?.downcast_for::<T>(&key)
    }

    /// Obtain a value in a throwaway scope, awaiting asynchronous providers.
    ///
    /// As with [Services::get], resources are released before the value is returned.
    pub async fn aget<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, WiringError> {
        let key = Key::of::<T>();
        self.aget_key(&key, None, None).await?.downcast_for::<T>(&key)
    }

    pub async fn aget_in<T: ?Sized + Send + Sync + 'static>(
        &self,
        scope: &ActivationScope,
    ) -> Result<Arc<T>, WiringError> {
        let key = Key::of::<T>();
        self.aget_key(&key, Some(scope), None)
            .await?
            .downcast_for::<T>(&key)
    }

    /// Ordered dependency keys of a method, computed once per method type
    fn executor<M, Args, Ret>(&self, method: &M) -> Arc<[Key]>
    where
        M: Method<Args, Ret>,
    {
        if let Some(keys) = self.inner.executors.get(&TypeId::of::<M>()) {
            return keys.value().clone();
        }
        let keys: Arc<[Key]> = method.dependencies().into();
        trace!(method = std::any::type_name::<M>(), arity = keys.len(), "compiled executor");
        self.inner
            .executors
            .entry(TypeId::of::<M>())
            .or_insert(keys)
            .value()
            .clone()
    }

    fn arguments<M>(&self, keys: &[Key], scope: &ActivationScope) -> Result<Arguments, WiringError>
    where
        M: 'static,
    {
        let values = keys
            .iter()
            .map(|key| self.lookup(key, scope, None)?.into_ready(key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arguments::new(TypeKey::of::<M>(), values))
    }

    async fn aarguments<M>(
        &self,
        keys: &[Key],
        scope: &ActivationScope,
    ) -> Result<Arguments, WiringError>
    where
        M: 'static,
    {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.lookup(key, scope, None)?.resolve().await?);
        }
        Ok(Arguments::new(TypeKey::of::<M>(), values))
    }

    /// Call a method with injected parameters, in a scope closed after the call
    pub fn exec<M, Args, Ret>(&self, method: M) -> Result<Ret, WiringError>
    where
        M: Method<Args, Ret>,
    {
        self.exec_with(method, HashMap::new())
    }

    /// Call a method in a scope seeded with the given instances
    pub fn exec_with<M, Args, Ret>(
        &self,
        method: M,
        seed: HashMap<Key, Value>,
    ) -> Result<Ret, WiringError>
    where
        M: Method<Args, Ret>,
    {
        let keys = self.executor(&method);
        let scope = self.create_scope_with(seed);
        let result = self
            .arguments::<M>(&keys, &scope)
            .and_then(|mut args| method.call(&mut args));
        scope.close();
        result
    }

    /// Call an asynchronous method with injected parameters, awaiting its result
    pub async fn aexec<M, Args, Fut>(&self, method: M) -> Result<Fut::Output, WiringError>
    where
        M: Method<Args, Fut>,
        Fut: Future,
    {
        self.aexec_with(method, HashMap::new()).await
    }

    pub async fn aexec_with<M, Args, Fut>(
        &self,
        method: M,
        seed: HashMap<Key, Value>,
    ) -> Result<Fut::Output, WiringError>
    where
        M: Method<Args, Fut>,
        Fut: Future,
    {
        let keys = self.executor(&method);
        let scope = self.create_scope_with(seed);
        let result = match self.aarguments::<M>(&keys, &scope).await {
            Ok(mut args) => match method.call(&mut args) {
                Ok(pending) => Ok(pending.await),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        scope.aclose().await;
        result
    }
}
