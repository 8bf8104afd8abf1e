//! Traits and structs supporting the resolution rules
//!
//! The injection mechanism relies on type-erased shared values, based on the
//! [std::any::Any] trait, and on two layers of traits.
//!
//! * The [Provide] trait describes a compiled production rule: invoked with an
//!   activation scope, a provider returns a value that is either ready or still
//!   pending (when an asynchronous factory sits somewhere in its dependency graph).
//! * The [Resolve] trait describes how a binding is compiled into a [Provider].
//!   Resolvers are invoked once per build, with a [ResolutionContext] memoizing
//!   already compiled providers and tracking the chain of types being resolved.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::container::Registry;
use crate::context::{ActivationScope, ResolutionContext};
use crate::error::WiringError;
use crate::key::Key;

/// Type-erased shared value
///
/// A value always wraps an ```Arc<T>```, so that unsized targets like trait objects
/// can be stored and retrieved with the same API as concrete types.
#[derive(Clone)]
pub struct Value(Arc<dyn Any + Send + Sync>);

impl Value {
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Value(Arc::new(value))
    }

    /// Retrieve the shared value if it has the expected type
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.0.downcast_ref::<Arc<T>>().cloned()
    }

    pub(crate) fn downcast_for<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &Key,
    ) -> Result<Arc<T>, WiringError> {
        self.downcast::<T>().ok_or_else(|| WiringError::TypeMismatch {
            key: key.clone(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Two values are the same if they share the same allocation
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Value(..)")
    }
}

/// Outcome of a provider invocation
pub enum Production<'a> {
    Ready(Value),
    Pending(BoxFuture<'a, Result<Value, WiringError>>),
}

impl<'a> Production<'a> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Production::Pending(_))
    }

    /// Await the value if needed
    pub async fn resolve(self) -> Result<Value, WiringError> {
        match self {
            Production::Ready(value) => Ok(value),
            Production::Pending(pending) => pending.await,
        }
    }

    /// Obtain the value without suspending, failing if it is still pending
    pub fn into_ready(self, key: &Key) -> Result<Value, WiringError> {
        match self {
            Production::Ready(value) => Ok(value),
            Production::Pending(_) => Err(WiringError::RequiresAwait { key: key.clone() }),
        }
    }
}

/// Produce values in an activation scope
///
/// This trait allows to use a uniform API for all lifetimes: the provider may hold
/// a singleton, look up the scoped instances or build a new instance on each call.
pub trait Provide: Send + Sync {
    /// Produce a value for the requested key.
    ///
    /// Side effects of cached lifetimes only happen on the first invocation.
    fn provide<'a>(
        &'a self,
        scope: &'a ActivationScope,
        requested: &'a Key,
    ) -> Result<Production<'a>, WiringError>;

    /// Whether invocations may return a pending value
    fn is_async(&self) -> bool;
}

/// Shared trait object implementing [Provide]
pub type Provider = Arc<dyn Provide>;

/// Compile a binding into a provider.
///
/// This function should not be called directly but will be triggered by the
/// container when building its services.
pub trait Resolve: Send + Sync {
    fn build_provider(
        &self,
        context: &mut ResolutionContext,
        registry: &Registry,
    ) -> Result<Provider, WiringError>;
}
