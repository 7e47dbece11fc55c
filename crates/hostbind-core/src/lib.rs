//! Core types for hostbind.
//!
//! This crate provides the pieces every other hostbind crate builds on:
//!
//! - [`runtime`]: the host runtime object model (heap, reference counts,
//!   error indicator, class registry) and its raw C-style API
//! - [`HostObject`]: owner of exactly one counted reference
//! - [`HostTuple`], [`HostDict`], [`HostType`]: tag-checked views
//! - [`FromHost`] / [`ToHost`]: the conversion registry
//! - [`BindError`]: every failure that can occur at the boundary
//! - [`TypeHash`]: deterministic identity for registered names

mod convert;
mod error;
mod object;
pub mod runtime;
mod type_hash;
mod views;

pub use convert::{
    FromHost, IntoHostTuple, NativeType, ToHost, bound_type, shared_from_host, shared_to_host,
};
pub use error::{BindError, BindResult, ExceptionKind, HostException};
pub use object::HostObject;
pub use runtime::{ArrayData, DictKey, ObjectHandle, RawObject, WeakHandle};
pub use type_hash::{TypeHash, hash_constants};
pub use views::{HostDict, HostTuple, HostType};
