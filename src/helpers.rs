use once_cell::sync::Lazy;
use regex::Regex;

static FIRST_CAP: Lazy<Regex> =
    Lazy::new(|| Regex::new("(.)([A-Z][a-z]+)").expect("Invalid regex"));
static ALL_CAP: Lazy<Regex> =
    Lazy::new(|| Regex::new("([a-z0-9])([A-Z])").expect("Invalid regex"));

/// Unqualified name of a type, without module path.
///
/// Generic, reference, tuple, slice and compound trait object names have no short
/// form and return ```None```.
pub fn short_type_name(name: &'static str) -> Option<&'static str> {
    let name = name.strip_prefix("dyn ").unwrap_or(name);
    if name.is_empty() || name.contains(|c: char| "<>()[]&*+,; ".contains(c)) {
        return None;
    }
    let short = name.rsplit("::").next().unwrap_or(name);
    if short.is_empty() {
        None
    } else {
        Some(short)
    }
}

/// Parameter name conventionally used for a type name (snake case).
///
/// A leading interface marker is kept attached: ```IRepository``` gives ```irepository```.
pub fn to_standard_param_name(name: &str) -> String {
    let value = FIRST_CAP.replace_all(name, "${1}_${2}");
    let value = ALL_CAP.replace_all(&value, "${1}_${2}").to_lowercase();
    match value.strip_prefix("i_") {
        Some(rest) => format!("i{}", rest),
        None => value,
    }
}

/// Implement [Injectable](crate::Injectable) for a type.
///
/// * ```injectable!(Type)``` builds the type with its ```Default``` implementation.
/// * ```injectable!(Type => constructor(a: A, b => B))``` calls a constructor taking
///   ```Arc``` parameters. ```a: A``` declares the type to resolve, while ```b => B```
///   leaves it undeclared: the value is found using the parameter name.
/// * ```injectable!(Type { a: A, b => B })``` assigns ```Option<Arc<_>>``` fields of
///   a default instance.
///
/// ```
/// # use std::sync::Arc;
/// # use wiring::*;
/// #[derive(Default)]
/// struct Settings;
///
/// struct Database {
///     settings: Arc<Settings>,
/// }
///
/// impl Database {
///     fn new(settings: Arc<Settings>) -> Self {
///         Self { settings }
///     }
/// }
///
/// injectable!(Settings);
/// injectable!(Database => new(settings: Settings));
/// ```
#[macro_export]
macro_rules! injectable {
    (@dependency $name:ident : $declared:ty) => {
        $crate::Dependency::typed::<$declared>(stringify!($name))
    };
    (@dependency $name:ident => $declared:ty) => {
        $crate::Dependency::untyped(stringify!($name))
    };

    ($target:ty) => {
        impl $crate::Injectable for $target {
            fn signature() -> $crate::Signature {
                $crate::Signature::Trivial
            }

            fn construct(
                _args: &mut $crate::Arguments,
            ) -> ::std::result::Result<Self, $crate::WiringError> {
                ::std::result::Result::Ok(<$target as ::std::default::Default>::default())
            }
        }
    };

    ($target:ty => $constructor:ident ( $($name:ident $sep:tt $param:ty),* $(,)? )) => {
        impl $crate::Injectable for $target {
            fn signature() -> $crate::Signature {
                $crate::Signature::Constructor(::std::vec![
                    $($crate::injectable!(@dependency $name $sep $param),)*
                ])
            }

            #[allow(unused_variables)]
            fn construct(
                args: &mut $crate::Arguments,
            ) -> ::std::result::Result<Self, $crate::WiringError> {
                ::std::result::Result::Ok(<$target>::$constructor($(args.next::<$param>()?),*))
            }
        }
    };

    ($target:ty { $($name:ident $sep:tt $field:ty),* $(,)? }) => {
        impl $crate::Injectable for $target {
            fn signature() -> $crate::Signature {
                $crate::Signature::Fields(::std::vec![
                    $($crate::injectable!(@dependency $name $sep $field),)*
                ])
            }

            fn construct(
                _args: &mut $crate::Arguments,
            ) -> ::std::result::Result<Self, $crate::WiringError> {
                ::std::result::Result::Ok(<$target as ::std::default::Default>::default())
            }

            fn assign(
                &mut self,
                field: &'static str,
                args: &mut $crate::Arguments,
            ) -> ::std::result::Result<(), $crate::WiringError> {
                $(
                    if field == stringify!($name) {
                        self.$name = ::std::option::Option::Some(args.next::<$field>()?);
                        return ::std::result::Result::Ok(());
                    }
                )*
                ::std::result::Result::Err($crate::WiringError::UnknownField {
                    field,
                    owner: $crate::TypeKey::of::<Self>(),
                })
            }
        }
    };
}

/// Bind an abstraction, usually a trait object, to an injectable implementation.
///
/// ```
/// # use std::sync::Arc;
/// # use wiring::*;
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// #[derive(Default)]
/// struct English;
///
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".into()
///     }
/// }
///
/// injectable!(English);
///
/// # fn main() -> Result<(), WiringError> {
/// let mut container = Container::new();
/// bind!(container, ServiceLifetime::Singleton, dyn Greeter => English)?;
/// let greeter: Arc<dyn Greeter> = container.resolve()?;
/// assert_eq!(greeter.greet(), "hello");
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! bind {
    ($container:expr, $lifetime:expr, $service:ty => $implementation:ty) => {
        $container.bind_type_as::<$service, $implementation>(
            $lifetime,
            |instance: ::std::sync::Arc<$implementation>| -> ::std::sync::Arc<$service> {
                instance
            },
        )
    };
}
