//! User factories and scoped resources.
//!
//! Factories are accepted with several arities and normalized to a call taking the
//! activation scope and the requested key. The argument tuple of a factory is used
//! as a marker type to keep the implementations apart.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::context::ActivationScope;
use crate::key::Key;
use crate::resolve::Value;

/// A synchronous factory producing values of type ```T```
pub trait Factory<Args, T>: Send + Sync + 'static {
    fn call(&self, scope: &ActivationScope, requested: &Key) -> T;
}

impl<F, T> Factory<(), T> for F
where
    F: Fn() -> T + Send + Sync + 'static,
{
    fn call(&self, _scope: &ActivationScope, _requested: &Key) -> T {
        (self)()
    }
}

impl<F, T> Factory<(ActivationScope,), T> for F
where
    F: Fn(&ActivationScope) -> T + Send + Sync + 'static,
{
    fn call(&self, scope: &ActivationScope, _requested: &Key) -> T {
        (self)(scope)
    }
}

impl<F, T> Factory<(ActivationScope, Key), T> for F
where
    F: Fn(&ActivationScope, &Key) -> T + Send + Sync + 'static,
{
    fn call(&self, scope: &ActivationScope, requested: &Key) -> T {
        (self)(scope, requested)
    }
}

/// An asynchronous factory producing values of type ```T```
///
/// Async factories receive owned handles, so that the returned future does not
/// borrow from the caller.
pub trait AsyncFactory<Args, T>: Send + Sync + 'static {
    fn call(&self, scope: ActivationScope, requested: Key) -> BoxFuture<'static, T>;
}

impl<F, Fut, T> AsyncFactory<(), T> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    fn call(&self, _scope: ActivationScope, _requested: Key) -> BoxFuture<'static, T> {
        (self)().boxed()
    }
}

impl<F, Fut, T> AsyncFactory<(ActivationScope,), T> for F
where
    F: Fn(ActivationScope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    fn call(&self, scope: ActivationScope, _requested: Key) -> BoxFuture<'static, T> {
        (self)(scope).boxed()
    }
}

impl<F, Fut, T> AsyncFactory<(ActivationScope, Key), T> for F
where
    F: Fn(ActivationScope, Key) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    fn call(&self, scope: ActivationScope, requested: Key) -> BoxFuture<'static, T> {
        (self)(scope, requested).boxed()
    }
}

/// Teardown of a scoped resource
pub enum Release {
    /// Runs when the owning scope is closed
    Immediate(Box<dyn FnOnce() + Send>),
    /// Awaited when the owning scope is closed asynchronously
    Deferred(Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>),
}

/// A value whose teardown is bound to the activation scope that created it
pub struct Managed<T: ?Sized> {
    value: Arc<T>,
    release: Release,
}

impl<T: Send + Sync + 'static> Managed<T> {
    pub fn new(value: T, teardown: impl FnOnce(Arc<T>) + Send + 'static) -> Self {
        Self::from_arc(Arc::new(value), teardown)
    }

    pub fn with_async_teardown<F, Fut>(value: T, teardown: F) -> Self
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::from_arc_async(Arc::new(value), teardown)
    }
}

impl<T: ?Sized + Send + Sync + 'static> Managed<T> {
    pub fn from_arc(value: Arc<T>, teardown: impl FnOnce(Arc<T>) + Send + 'static) -> Self {
        let target = value.clone();
        Self {
            value,
            release: Release::Immediate(Box::new(move || teardown(target))),
        }
    }

    pub fn from_arc_async<F, Fut>(value: Arc<T>, teardown: F) -> Self
    where
        F: FnOnce(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let target = value.clone();
        Self {
            value,
            release: Release::Deferred(Box::new(move || teardown(target).boxed())),
        }
    }

    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    pub(crate) fn into_produced(self) -> Produced {
        Produced {
            value: Value::new(self.value),
            release: Some(self.release),
        }
    }
}

/// A freshly produced value, with the teardown to register on the scope
pub struct Produced {
    pub(crate) value: Value,
    pub(crate) release: Option<Release>,
}

impl Produced {
    pub(crate) fn plain(value: Value) -> Self {
        Self {
            value,
            release: None,
        }
    }
}
