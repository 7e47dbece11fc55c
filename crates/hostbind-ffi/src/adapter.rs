//! Adapters from statically typed Rust callables to [`NativeFn`].
//!
//! Each adapter trait is implemented for closures and fn items of arity
//! 0 through 8. Argument converters are picked from the parameter types at
//! compile time; the resulting [`NativeFn`] binds, converts and calls.
//!
//! - [`IntoNativeFn`]: `Fn(A, B, ..) -> R` for module functions
//! - [`IntoMethod`]: `Fn(&T, A, ..) -> R` for methods of a bound type
//! - [`IntoConstructor`]: `Fn(&HostObject, A, ..) -> R` for constructors;
//!   the first parameter is the freshly allocated host proxy
//!
//! Closures must annotate their parameter types.

use std::rc::Rc;

use hostbind_core::runtime;
use hostbind_core::{BindError, BindResult, FromHost, HostObject, NativeType, ToHost};

use crate::native_fn::{CallContext, CallableKind, NativeFn};

/// Convert a callable into a module-level [`NativeFn`].
pub trait IntoNativeFn<Args, Ret> {
    fn into_native_fn(self, name: &str) -> NativeFn;
}

/// Convert a callable taking `&T` first into a method [`NativeFn`].
pub trait IntoMethod<T: ?Sized, Args, Ret> {
    fn into_method(self, name: &str) -> NativeFn;
}

/// Convert a callable into a constructor [`NativeFn`] for `T`.
///
/// The callable receives the host proxy being constructed, so it can keep a
/// back-reference for override dispatch. Its result becomes the shared
/// holder stored in the proxy.
pub trait IntoConstructor<T: ?Sized, Args, Ret> {
    fn into_constructor(self, name: &str) -> NativeFn;
}

/// What a constructor may return.
pub trait IntoInstance<T: ?Sized> {
    fn into_instance(self) -> BindResult<Rc<T>>;
}

impl<T: ?Sized> IntoInstance<T> for Rc<T> {
    fn into_instance(self) -> BindResult<Rc<T>> {
        Ok(self)
    }
}

impl<T: ?Sized> IntoInstance<T> for Box<T> {
    fn into_instance(self) -> BindResult<Rc<T>> {
        Ok(Rc::from(self))
    }
}

impl<T: ?Sized, R: IntoInstance<T>, E: Into<BindError>> IntoInstance<T> for Result<R, E> {
    fn into_instance(self) -> BindResult<Rc<T>> {
        self.map_err(Into::into)?.into_instance()
    }
}

macro_rules! impl_adapters {
    ($count:expr; $($arg:ident),*) => {
        impl<Func, Ret, $($arg),*> IntoNativeFn<($($arg,)*), Ret> for Func
        where
            Func: Fn($($arg),*) -> Ret + 'static,
            Ret: ToHost,
            $($arg: FromHost,)*
        {
            #[allow(non_snake_case)]
            fn into_native_fn(self, name: &str) -> NativeFn {
                NativeFn::new(name, CallableKind::Function, $count, move |ctx: &mut CallContext<'_>| {
                    let ($($arg,)*) = ctx.args::<($($arg,)*)>()?;
                    (self)($($arg),*).to_host()
                })
            }
        }

        impl<Func, T, Ret, $($arg),*> IntoMethod<T, ($($arg,)*), Ret> for Func
        where
            Func: Fn(&T, $($arg),*) -> Ret + 'static,
            T: NativeType + ?Sized,
            Ret: ToHost,
            $($arg: FromHost,)*
        {
            #[allow(non_snake_case)]
            fn into_method(self, name: &str) -> NativeFn {
                NativeFn::new(name, CallableKind::Method, $count, move |ctx: &mut CallContext<'_>| {
                    let this = ctx.this::<T>()?;
                    let ($($arg,)*) = ctx.args::<($($arg,)*)>()?;
                    (self)(&*this, $($arg),*).to_host()
                })
            }
        }

        impl<Func, T, Ret, $($arg),*> IntoConstructor<T, ($($arg,)*), Ret> for Func
        where
            Func: Fn(&HostObject, $($arg),*) -> Ret + 'static,
            T: NativeType + ?Sized,
            Ret: IntoInstance<T>,
            $($arg: FromHost,)*
        {
            #[allow(non_snake_case)]
            fn into_constructor(self, name: &str) -> NativeFn {
                NativeFn::new(name, CallableKind::Constructor, $count, move |ctx: &mut CallContext<'_>| {
                    let proxy = ctx.receiver()?.clone();
                    let ($($arg,)*) = ctx.args::<($($arg,)*)>()?;
                    let shared: Rc<T> = (self)(&proxy, $($arg),*).into_instance()?;
                    store_instance(&proxy, shared, ctx.name())?;
                    Ok(HostObject::none())
                })
            }
        }
    };
}

/// Store the shared holder in the proxy's native storage.
fn store_instance<T: NativeType + ?Sized>(
    proxy: &HostObject,
    shared: Rc<T>,
    name: &str,
) -> BindResult<()> {
    runtime::instance_set_payload(proxy.as_raw(), Box::new(shared))
        .ok_or_else(|| BindError::host_error(Some(name)))
}

impl_adapters!(0;);
impl_adapters!(1; A);
impl_adapters!(2; A, B);
impl_adapters!(3; A, B, C);
impl_adapters!(4; A, B, C, D);
impl_adapters!(5; A, B, C, D, E);
impl_adapters!(6; A, B, C, D, E, F);
impl_adapters!(7; A, B, C, D, E, F, G);
impl_adapters!(8; A, B, C, D, E, F, G, H);
