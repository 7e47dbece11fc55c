//! Conversions between native values and host objects.
//!
//! - [`FromHost`]: extract a native value from a [`HostObject`]
//! - [`ToHost`]: turn a native value into a new [`HostObject`]
//! - [`IntoHostTuple`]: convert a Rust tuple element-wise into a [`HostTuple`]
//!
//! ## Built-in entries
//!
//! - Integers: `i8`..`i64`, `isize`, `u8`..`u64`, `usize`, range checked
//! - Floats: `f32`, `f64` (ints are accepted and widened)
//! - `bool`, `String`, `&str` (to host only), `()` (none)
//! - `Option<T>`: none maps to `None`
//! - `Result<T, E>` (to host only): `Err` becomes a pending host error
//! - [`ArrayData`] for array-like objects
//! - `HostObject` and the views, passed through unchanged
//!
//! ## Native classes
//!
//! Types bound with a type binding convert in one of two idioms:
//!
//! - **shared**: `Rc<T>` moves shared ownership in and out of the host
//!   instance. The pointee is never copied, so a round trip preserves
//!   identity. Available for every `T: NativeType`, including trait objects.
//! - **value**: `T` itself, opted in with [`value_semantics!`]. Extraction
//!   clones the pointee out of the instance. Converting a `&T` clones it once
//!   into a fresh instance; converting an owned `T` moves it without cloning.

use std::any::TypeId;
use std::rc::Rc;

use crate::error::{BindError, BindResult};
use crate::object::HostObject;
use crate::runtime::{self, ArrayData};
use crate::views::{HostDict, HostTuple, HostType};

/// Extract a native value from a host object.
pub trait FromHost: Sized {
    /// `location` names the call site in error messages.
    fn from_host(obj: &HostObject, location: &str) -> BindResult<Self>;
}

/// Convert a native value into a host object.
pub trait ToHost {
    fn to_host(self) -> BindResult<HostObject>;
}

/// A native type that can be bound as a host class.
pub trait NativeType: 'static {
    /// Host-visible name, used in diagnostics.
    const NAME: &'static str;
}

/// Convert a Rust tuple into a host tuple, element by element.
pub trait IntoHostTuple {
    fn into_host_tuple(self) -> BindResult<HostTuple>;
}

// ============================================================================
// Integers
// ============================================================================

macro_rules! impl_int {
    ($($ty:ty),*) => {
        $(
            impl FromHost for $ty {
                fn from_host(obj: &HostObject, location: &str) -> BindResult<Self> {
                    let value = runtime::as_int(obj.as_raw()).ok_or_else(|| {
                        BindError::type_mismatch("int", obj.type_name(), Some(location))
                    })?;
                    <$ty>::try_from(value).map_err(|_| BindError::Overflow {
                        value: value as i128,
                        target: stringify!($ty),
                        location: Some(location.to_owned()),
                    })
                }
            }

            impl ToHost for $ty {
                fn to_host(self) -> BindResult<HostObject> {
                    let value = i64::try_from(self).map_err(|_| BindError::Overflow {
                        value: self as i128,
                        target: "int",
                        location: None,
                    })?;
                    HostObject::adopted(runtime::new_int(value), "int")
                }
            }
        )*
    };
}

impl_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

// ============================================================================
// Floats
// ============================================================================

impl FromHost for f64 {
    fn from_host(obj: &HostObject, location: &str) -> BindResult<Self> {
        let raw = obj.as_raw();
        runtime::as_float(raw)
            .or_else(|| runtime::as_int(raw).map(|v| v as f64))
            .ok_or_else(|| BindError::type_mismatch("float", obj.type_name(), Some(location)))
    }
}

impl ToHost for f64 {
    fn to_host(self) -> BindResult<HostObject> {
        HostObject::adopted(runtime::new_float(self), "float")
    }
}

impl FromHost for f32 {
    fn from_host(obj: &HostObject, location: &str) -> BindResult<Self> {
        f64::from_host(obj, location).map(|v| v as f32)
    }
}

impl ToHost for f32 {
    fn to_host(self) -> BindResult<HostObject> {
        f64::from(self).to_host()
    }
}

// ============================================================================
// Bool, strings, unit
// ============================================================================

impl FromHost for bool {
    fn from_host(obj: &HostObject, location: &str) -> BindResult<Self> {
        runtime::as_bool(obj.as_raw())
            .ok_or_else(|| BindError::type_mismatch("bool", obj.type_name(), Some(location)))
    }
}

impl ToHost for bool {
    fn to_host(self) -> BindResult<HostObject> {
        HostObject::adopted(runtime::new_bool(self), "bool")
    }
}

impl FromHost for String {
    fn from_host(obj: &HostObject, location: &str) -> BindResult<Self> {
        runtime::as_str(obj.as_raw())
            .ok_or_else(|| BindError::type_mismatch("str", obj.type_name(), Some(location)))
    }
}

impl ToHost for String {
    fn to_host(self) -> BindResult<HostObject> {
        self.as_str().to_host()
    }
}

impl ToHost for &str {
    fn to_host(self) -> BindResult<HostObject> {
        HostObject::adopted(runtime::new_str(self), "str")
    }
}

impl ToHost for () {
    fn to_host(self) -> BindResult<HostObject> {
        Ok(HostObject::none())
    }
}

// ============================================================================
// Option / Result
// ============================================================================

impl<T: FromHost> FromHost for Option<T> {
    fn from_host(obj: &HostObject, location: &str) -> BindResult<Self> {
        if obj.is_none() {
            Ok(None)
        } else {
            T::from_host(obj, location).map(Some)
        }
    }
}

impl<T: ToHost> ToHost for Option<T> {
    fn to_host(self) -> BindResult<HostObject> {
        match self {
            Some(value) => value.to_host(),
            None => Ok(HostObject::none()),
        }
    }
}

impl<T: ToHost, E: Into<BindError>> ToHost for Result<T, E> {
    fn to_host(self) -> BindResult<HostObject> {
        self.map_err(Into::into)?.to_host()
    }
}

// ============================================================================
// Host objects and views
// ============================================================================

impl FromHost for HostObject {
    fn from_host(obj: &HostObject, _location: &str) -> BindResult<Self> {
        Ok(obj.clone())
    }
}

impl ToHost for HostObject {
    fn to_host(self) -> BindResult<HostObject> {
        Ok(self)
    }
}

impl ToHost for &HostObject {
    fn to_host(self) -> BindResult<HostObject> {
        Ok(self.clone())
    }
}

macro_rules! impl_view_conversions {
    ($($view:ty),*) => {
        $(
            impl FromHost for $view {
                fn from_host(obj: &HostObject, location: &str) -> BindResult<Self> {
                    <$view>::from_object(obj.clone(), location)
                }
            }

            impl ToHost for $view {
                fn to_host(self) -> BindResult<HostObject> {
                    Ok(self.into_object())
                }
            }
        )*
    };
}

impl_view_conversions!(HostTuple, HostDict, HostType);

// ============================================================================
// Arrays
// ============================================================================

impl FromHost for ArrayData {
    fn from_host(obj: &HostObject, location: &str) -> BindResult<Self> {
        runtime::as_array(obj.as_raw())
            .ok_or_else(|| BindError::type_mismatch("array", obj.type_name(), Some(location)))
    }
}

impl ToHost for ArrayData {
    fn to_host(self) -> BindResult<HostObject> {
        HostObject::adopted(runtime::new_array(self), "array")
    }
}

// ============================================================================
// Native classes
// ============================================================================

/// The type object bound to `T`.
pub fn bound_type<T: NativeType + ?Sized>() -> BindResult<HostType> {
    let ty = runtime::binding_for(TypeId::of::<T>()).ok_or_else(|| BindError::UnregisteredType {
        type_name: T::NAME.to_owned(),
    })?;
    HostType::from_object(HostObject::borrowed(Some(ty), T::NAME)?, T::NAME)
}

/// The shared holder stored in an instance of `T`'s type (or a subtype).
pub fn shared_from_host<T: NativeType + ?Sized>(
    obj: &HostObject,
    location: &str,
) -> BindResult<Rc<T>> {
    let ty = bound_type::<T>()?;
    if !ty.is_instance(obj) {
        return Err(BindError::type_mismatch(
            T::NAME,
            obj.type_name(),
            Some(location),
        ));
    }
    runtime::instance_payload::<Rc<T>>(obj.as_raw()).ok_or_else(|| {
        BindError::type_mismatch(
            T::NAME,
            format!("uninitialized {}", obj.type_name()),
            Some(location),
        )
    })
}

/// A new instance of `T`'s type holding `shared`.
pub fn shared_to_host<T: NativeType + ?Sized>(shared: Rc<T>) -> BindResult<HostObject> {
    let ty = bound_type::<T>()?;
    HostObject::adopted(
        runtime::new_instance(ty.as_raw(), Some(Box::new(shared))),
        T::NAME,
    )
}

impl<T: NativeType + ?Sized> FromHost for Rc<T> {
    fn from_host(obj: &HostObject, location: &str) -> BindResult<Self> {
        shared_from_host(obj, location)
    }
}

impl<T: NativeType + ?Sized> ToHost for Rc<T> {
    fn to_host(self) -> BindResult<HostObject> {
        shared_to_host(self)
    }
}

/// Opt native classes into the value idiom.
///
/// Each type must implement `Clone` and [`NativeType`]. Extraction clones
/// the pointee out of the host instance; converting a reference clones it
/// into a new instance; converting an owned value moves it.
///
/// ```ignore
/// #[derive(Clone)]
/// struct X { id: i64 }
/// impl NativeType for X { const NAME: &'static str = "X"; }
/// value_semantics!(X);
/// ```
#[macro_export]
macro_rules! value_semantics {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::FromHost for $ty {
                fn from_host(
                    obj: &$crate::HostObject,
                    location: &str,
                ) -> $crate::BindResult<Self> {
                    $crate::shared_from_host::<$ty>(obj, location)
                        .map(|shared| <$ty as ::core::clone::Clone>::clone(&shared))
                }
            }

            impl $crate::ToHost for $ty {
                fn to_host(self) -> $crate::BindResult<$crate::HostObject> {
                    $crate::shared_to_host(::std::rc::Rc::new(self))
                }
            }

            impl $crate::ToHost for &$ty {
                fn to_host(self) -> $crate::BindResult<$crate::HostObject> {
                    $crate::shared_to_host(::std::rc::Rc::new(
                        <$ty as ::core::clone::Clone>::clone(self),
                    ))
                }
            }
        )+
    };
}

// ============================================================================
// Tuples
// ============================================================================

impl IntoHostTuple for () {
    fn into_host_tuple(self) -> BindResult<HostTuple> {
        HostTuple::make_empty(0)
    }
}

impl IntoHostTuple for HostTuple {
    fn into_host_tuple(self) -> BindResult<HostTuple> {
        Ok(self)
    }
}

impl<T: ToHost> IntoHostTuple for Vec<T> {
    fn into_host_tuple(self) -> BindResult<HostTuple> {
        let mut tuple = HostTuple::make_empty(self.len())?;
        for (pos, value) in self.into_iter().enumerate() {
            tuple.set_item(pos, &value.to_host()?)?;
        }
        Ok(tuple)
    }
}

macro_rules! impl_tuples {
    ($len:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: ToHost),+> IntoHostTuple for ($($name,)+) {
            fn into_host_tuple(self) -> BindResult<HostTuple> {
                let mut tuple = HostTuple::make_empty($len)?;
                $(
                    tuple.set_item($idx, &self.$idx.to_host()?)?;
                )+
                Ok(tuple)
            }
        }

        impl<$($name: ToHost),+> ToHost for ($($name,)+) {
            fn to_host(self) -> BindResult<HostObject> {
                self.into_host_tuple().map(HostTuple::into_object)
            }
        }
    };
}

impl_tuples!(1; A: 0);
impl_tuples!(2; A: 0, B: 1);
impl_tuples!(3; A: 0, B: 1, C: 2);
impl_tuples!(4; A: 0, B: 1, C: 2, D: 3);
impl_tuples!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_tuples!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_tuples!(7; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_tuples!(8; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
