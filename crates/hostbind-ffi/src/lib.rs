//! The native side of the boundary.
//!
//! - [`NativeFn`]: a type-erased callable with its signature
//! - [`IntoNativeFn`], [`IntoMethod`], [`IntoConstructor`]: adapters from
//!   typed Rust callables
//! - [`boundary`]: the shim that turns native failures into host errors
//! - [`TypeBinding`]: a native class exposed as a host type
//! - [`BackReference`]: override dispatch from native code into host
//!   subclasses

mod adapter;
mod back_reference;
pub mod boundary;
mod native_fn;
mod type_binding;

pub use adapter::{IntoConstructor, IntoInstance, IntoMethod, IntoNativeFn};
pub use back_reference::BackReference;
pub use boundary::{function_object, host_function, host_method, translate};
pub use native_fn::{CallContext, CallableKind, FromCallArgs, NativeCallable, NativeFn, Signature};
pub use type_binding::TypeBinding;
