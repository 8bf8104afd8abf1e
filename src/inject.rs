use std::sync::Arc;

use crate::error::WiringError;
use crate::key::Key;
use crate::signature::Arguments;

// method_tuple! implements Method for each function arity: the parameter types
// become lookup keys, and every Arc argument is taken from Services in order.

/// A method whose parameters are resolved from the services.
///
/// This trait is implemented for all functions taking up to 10 shared parameters
/// (```Arc<A>```, where ```A``` may be a trait object), using a tuple of these
/// parameters as a marker type.
pub trait Method<Args, Ret>: Send + Sync + 'static {
    /// Keys to resolve, in parameter order
    fn dependencies(&self) -> Vec<Key>;

    /// Invoke the method with the resolved values
    fn call(&self, args: &mut Arguments) -> Result<Ret, WiringError>;
}

macro_rules! method_tuple ({ $($param:ident)* } => {
    impl<Func, Ret, $($param,)*> Method<($(Arc<$param>,)*), Ret> for Func
    where
        Func: Fn($(Arc<$param>),*) -> Ret + Send + Sync + 'static,
        $($param: ?Sized + Send + Sync + 'static,)*
    {
        #[inline]
        fn dependencies(&self) -> Vec<Key> {
            vec![$(Key::of::<$param>(),)*]
        }

        #[inline]
        #[allow(non_snake_case, unused_variables)]
        fn call(&self, args: &mut Arguments) -> Result<Ret, WiringError> {
            $(let $param = args.next::<$param>()?;)*
            Ok((self)($($param),*))
        }
    }
});

method_tuple! {}
method_tuple! { A }
method_tuple! { A B }
method_tuple! { A B C }
method_tuple! { A B C D }
method_tuple! { A B C D E }
method_tuple! { A B C D E F }
method_tuple! { A B C D E F G }
method_tuple! { A B C D E F G H }
method_tuple! { A B C D E F G H I }
method_tuple! { A B C D E F G H I J }
