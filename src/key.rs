//! Lookup keys for bindings.
//!
//! A binding is identified either by a type identity tag ([TypeKey]) or by a plain
//! string name, used for aliases and for named bindings of values that lack a
//! distinguishing type.

use std::any::{type_name, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::helpers::short_type_name;

/// Identity of a (possibly unsized) type, with its name kept for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, as reported by the compiler.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Unqualified name used to derive implicit aliases, if the type has one.
    pub fn short_name(&self) -> Option<&'static str> {
        short_type_name(self.name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Key of a binding in the registry and in the compiled [crate::Services].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Type(TypeKey),
    Name(Cow<'static, str>),
}

impl Key {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Key::Type(TypeKey::of::<T>())
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Key::Name(name.into())
    }

    pub fn as_type(&self) -> Option<&TypeKey> {
        match self {
            Key::Type(key) => Some(key),
            Key::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Type(_) => None,
            Key::Name(name) => Some(name),
        }
    }
}

impl From<TypeKey> for Key {
    fn from(key: TypeKey) -> Self {
        Key::Type(key)
    }
}

impl From<&'static str> for Key {
    fn from(name: &'static str) -> Self {
        Key::Name(Cow::Borrowed(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(Cow::Owned(name))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Type(key) => fmt::Display::fmt(key, f),
            Key::Name(name) => write!(f, "\"{}\"", name),
        }
    }
}
