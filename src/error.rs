use thiserror::Error;

use crate::key::{Key, TypeKey};

/// Errors triggered while registering bindings or during the autowiring process
#[derive(Error, Debug)]
pub enum WiringError {
    #[error("Consistency error: {key} is already bound")]
    DuplicateBinding { key: Key },
    #[error("Alias \"{name}\" is already defined")]
    AliasAlreadyDefined { name: String },
    #[error("Alias \"{name}\" targets {target}, which is not bound")]
    AliasConfiguration { name: String, target: Key },
    #[error("Cannot {operation} on a strict container")]
    StrictMode { operation: &'static str },
    #[error("Parameter \"{parameter}\" of {owner} declares a union or optional type")]
    UnsupportedUnion {
        parameter: &'static str,
        owner: TypeKey,
    },
    #[error("Unable to resolve parameter \"{parameter}\" of {owner}")]
    CannotResolveParameter {
        parameter: &'static str,
        owner: TypeKey,
    },
    #[error("Alias \"{name}\" is ambiguous, candidates: {}", join(.candidates, ", "))]
    AmbiguousAlias { name: String, candidates: Vec<TypeKey> },
    #[error("Unable to resolve {key}")]
    CannotResolveKey { key: Key },
    #[error("Cyclic dependencies: {}", join(.chain, " -> "))]
    CircularDependency { chain: Vec<TypeKey> },
    #[error("Value bound to {key} is not a {expected}")]
    TypeMismatch { key: Key, expected: &'static str },
    #[error("Argument {position} of {owner} is not a {expected}")]
    ArgumentMismatch {
        owner: TypeKey,
        position: usize,
        expected: &'static str,
    },
    #[error("Argument {position} of {owner} was not supplied")]
    MissingArgument { owner: TypeKey, position: usize },
    #[error("{owner} has no injectable field \"{field}\"")]
    UnknownField {
        field: &'static str,
        owner: TypeKey,
    },
    #[error("Resolving {key} requires awaiting an asynchronous provider")]
    RequiresAwait { key: Key },
}

fn join<T: std::fmt::Display>(items: &[T], separator: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}
