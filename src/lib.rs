//! Dependency injection container with build-time graph resolution.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use wiring::*;
//! // Define traits and implementors
//! trait Repository: Send + Sync {
//!     fn name(&self) -> &str;
//! }
//!
//! #[derive(Default)]
//! struct MemoryRepository;
//!
//! impl Repository for MemoryRepository {
//!     fn name(&self) -> &str {
//!         "memory"
//!     }
//! }
//!
//! struct UserService {
//!     repository: Arc<dyn Repository>,
//! }
//!
//! impl UserService {
//!     fn new(repository: Arc<dyn Repository>) -> Self {
//!         Self { repository }
//!     }
//! }
//!
//! // Describe how to build them
//! injectable!(MemoryRepository);
//! injectable!(UserService => new(repository: dyn Repository));
//!
//! # fn main() -> Result<(), WiringError> {
//! let mut container = Container::new();
//! bind!(container, ServiceLifetime::Singleton, dyn Repository => MemoryRepository)?;
//! container.add_transient::<UserService>()?;
//!
//! let services = container.build()?;
//! let service: Arc<UserService> = services.get()?;
//! assert_eq!(service.repository.name(), "memory");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! Registration and resolution are two separate phases.
//!
//! * The [Container] records bindings: a [Key] (a type identity or a name) associated to
//!   a resolver, which knows how to build a provider for the binding. Types describe their
//!   own dependencies by implementing [Injectable], usually through the [injectable!] macro.
//! * [Container::build] walks the dependency graph of every binding once, rejecting
//!   missing dependencies and cycles, and compiles each binding into a [Provider].
//!   The result is an immutable [Services] map.
//! * At run time, [Services] produce values within an [ActivationScope], which caches
//!   scoped instances and releases the resources created while it is active.
//!
//! Providers may be asynchronous when an async factory is bound somewhere in the graph:
//! use [Services::aget] to await them. A synchronous lookup of such a provider fails with
//! [WiringError::RequiresAwait] until its value has been cached.

mod container;
mod context;
mod error;
mod factory;
mod helpers;
mod inject;
mod key;
mod providers;
mod resolve;
mod resolvers;
mod services;
mod signature;

pub use container::{Container, ContainerOptions, Registry};
pub use context::{ActivationScope, ResolutionContext};
pub use error::WiringError;
pub use factory::{AsyncFactory, Factory, Managed, Produced, Release};
pub use helpers::{short_type_name, to_standard_param_name};
pub use inject::Method;
pub use key::{Key, TypeKey};
pub use providers::{DependencyMix, InstanceProvider, ServiceLifetime, ServiceProvider};
pub use resolve::{Production, Provide, Provider, Resolve, Value};
pub use resolvers::{DynamicResolver, FactoryResolver, InstanceResolver};
pub use services::Services;
pub use signature::{Arguments, Declared, Dependency, Injectable, Signature};

#[cfg(test)]
mod tests;
