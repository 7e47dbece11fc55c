//! hostbind: native Rust functions and classes, callable from a
//! reference-counted dynamic host runtime.
//!
//! # Architecture
//!
//! ```text
//! host call ──> boundary shim ──> CallContext::bind ──> FromHost (args)
//!                    │                                       │
//!   pending error <──┘ (Err / panic)         native fn <─────┘
//!                                                │
//! host result <──────────── ToHost (return) <────┘
//! ```
//!
//! - [`HostObject`] owns one counted reference; views ([`HostTuple`],
//!   [`HostDict`], [`HostType`]) additionally guarantee the runtime tag.
//! - [`FromHost`] / [`ToHost`] are the conversion registry. Value types use
//!   [`value_semantics!`] (copy on the way out); `Rc<T>` preserves identity.
//! - [`ExtensionModule`] collects functions and [`TypeBinding`]s and
//!   finalizes them into a module object exactly once.
//! - [`BackReference`] lets a native trampoline call host-side overrides.
//!
//! # Example
//!
//! ```ignore
//! use hostbind::prelude::*;
//!
//! let mut module = ExtensionModule::new("maths", "Arithmetic")?;
//! module.add_function("add", |x: i64, y: i64| x + y)?;
//! let object = module.finalize()?;
//! let sum = object.getattr("add")?.call(&HostTuple::make((2_i64, 3_i64))?)?;
//! assert_eq!(i64::from_host(&sum, "sum")?, 5);
//! ```

pub use hostbind_core::*;
pub use hostbind_ffi::{
    BackReference, CallContext, CallableKind, FromCallArgs, IntoConstructor, IntoInstance,
    IntoMethod, IntoNativeFn, NativeCallable, NativeFn, Signature, TypeBinding, boundary,
};
pub use hostbind_module::{ClassBuilder, ExtensionModule, FunctionBuilder, load_module};

pub mod prelude {
    pub use hostbind_core::runtime::{CallFlags, TypeFlags};
    pub use hostbind_core::{
        BindError, BindResult, ExceptionKind, FromHost, HostDict, HostObject, HostTuple,
        HostType, IntoHostTuple, NativeType, ToHost, value_semantics,
    };
    pub use hostbind_ffi::{BackReference, TypeBinding, host_function, host_method};
    pub use hostbind_module::{ExtensionModule, load_module};
}
