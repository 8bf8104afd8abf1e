//! Construction recipes of injectable types.
//!
//! Rust has no runtime reflection on constructors: each injectable type describes its
//! own shape through the [Injectable] trait, usually generated by the
//! [injectable!](crate::injectable) macro. The resolver treats this description as
//! the source of truth for the parameter names and declared types of a type.

use std::sync::Arc;

use crate::error::WiringError;
use crate::key::TypeKey;
use crate::resolve::Value;

/// A type that the container can build by resolving its dependencies.
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Describe the dependencies of this type.
    fn signature() -> Signature;

    /// Build an instance from the values resolved for its dependencies.
    ///
    /// Values are supplied in declaration order. For [Signature::Fields] this is
    /// called with no argument to obtain the bare instance.
    fn construct(args: &mut Arguments) -> Result<Self, WiringError>;

    /// Inject the next resolved value into a field of a bare instance.
    fn assign(&mut self, field: &'static str, args: &mut Arguments) -> Result<(), WiringError> {
        let _ = args;
        Err(WiringError::UnknownField {
            field,
            owner: TypeKey::of::<Self>(),
        })
    }
}

/// Shape of a constructible type
#[derive(Clone, Debug)]
pub enum Signature {
    /// No dependency at all
    Trivial,
    /// Ordered constructor parameters
    Constructor(Vec<Dependency>),
    /// Fields assigned on a bare instance
    Fields(Vec<Dependency>),
}

/// Type declared for a parameter or a field
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Declared {
    Type(TypeKey),
    /// Resolved through aliases or named bindings, using the parameter name
    Undeclared,
    Union(Vec<TypeKey>),
    Optional(TypeKey),
}

/// A named parameter or field of an injectable type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    name: &'static str,
    declared: Declared,
}

impl Dependency {
    pub fn typed<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            declared: Declared::Type(TypeKey::of::<T>()),
        }
    }

    pub fn untyped(name: &'static str) -> Self {
        Self {
            name,
            declared: Declared::Undeclared,
        }
    }

    pub fn union(name: &'static str, members: Vec<TypeKey>) -> Self {
        Self {
            name,
            declared: Declared::Union(members),
        }
    }

    pub fn optional<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            declared: Declared::Optional(TypeKey::of::<T>()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn declared(&self) -> &Declared {
        &self.declared
    }
}

/// Ordered values resolved for the dependencies of a type
pub struct Arguments {
    owner: TypeKey,
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Arguments {
    pub(crate) fn new(owner: TypeKey, values: Vec<Value>) -> Self {
        Self {
            owner,
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Take the next value, downcast to the expected shared type.
    pub fn next<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>, WiringError> {
        let position = self.position;
        let value = self.next_value()?;
        value
            .downcast::<T>()
            .ok_or(WiringError::ArgumentMismatch {
                owner: self.owner,
                position,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Take the next value without inspecting it.
    pub fn next_value(&mut self) -> Result<Value, WiringError> {
        let position = self.position;
        self.position += 1;
        self.values.next().ok_or(WiringError::MissingArgument {
            owner: self.owner,
            position,
        })
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    pub fn owner(&self) -> TypeKey {
        self.owner
    }
}
