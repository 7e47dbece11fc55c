//! Extension module registration.
//!
//! ```text
//! ExtensionModule (setup) -> finalize() -> module object (host runtime)
//! ```
//!
//! Functions are added directly or through a [`FunctionBuilder`]; native
//! classes through a [`ClassBuilder`]. See [`load_module`] for the load-time
//! entry point.

mod class_builder;
mod function_builder;
mod module;

pub use class_builder::ClassBuilder;
pub use function_builder::FunctionBuilder;
pub use module::{ExtensionModule, load_module};
