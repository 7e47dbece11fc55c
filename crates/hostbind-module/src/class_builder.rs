//! Fluent registration of a native class.
//!
//! ```ignore
//! module.register_type::<Vec2>("Vec2")
//!     .doc("A 2D vector")
//!     .constructor(|_: &HostObject, x: f64, y: f64| Rc::new(Vec2 { x, y }))?
//!     .method("length", |v: &Vec2| v.x.hypot(v.y))?
//!     .build()?;
//! ```
//!
//! For a class that host code may subclass, bind the trait object and have
//! the constructor return a trampoline holding a
//! [`BackReference`](hostbind_ffi::BackReference) to the proxy:
//!
//! ```ignore
//! module.register_type::<dyn Shape>("Shape")
//!     .subclassable()
//!     .constructor(|proxy: &HostObject| -> Rc<dyn Shape> { Rc::new(HostShape::new(proxy)) })?
//!     .build()?;
//! module.add_function("area_of", |s: Rc<dyn Shape>| s.area())?;
//! ```

use hostbind_core::{BindResult, HostType, NativeType};
use hostbind_ffi::{IntoConstructor, IntoMethod, TypeBinding};

use crate::module::ExtensionModule;

/// Builder for a native type, created by [`ExtensionModule::register_type`].
pub struct ClassBuilder<'m, T: NativeType + ?Sized> {
    module: &'m mut ExtensionModule,
    binding: TypeBinding<T>,
}

impl<'m, T: NativeType + ?Sized> ClassBuilder<'m, T> {
    pub(crate) fn new(module: &'m mut ExtensionModule, name: &str) -> Self {
        Self {
            module,
            binding: TypeBinding::new(name),
        }
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.binding.set_doc(doc);
        self
    }

    /// Allow host classes to derive from this type.
    pub fn subclassable(mut self) -> Self {
        self.binding.set_subclassable();
        self
    }

    pub fn constructor<F, Args, Ret>(mut self, f: F) -> BindResult<Self>
    where
        F: IntoConstructor<T, Args, Ret>,
    {
        self.binding.constructor(f)?;
        Ok(self)
    }

    /// A constructor whose parameters can also be passed by keyword.
    pub fn constructor_with_params<F, Args, Ret>(mut self, params: &[&str], f: F) -> BindResult<Self>
    where
        F: IntoConstructor<T, Args, Ret>,
    {
        self.binding.constructor_with_params(params, f)?;
        Ok(self)
    }

    pub fn method<F, Args, Ret>(self, name: &str, f: F) -> BindResult<Self>
    where
        F: IntoMethod<T, Args, Ret>,
    {
        self.method_with_doc(name, "", f)
    }

    pub fn method_with_doc<F, Args, Ret>(mut self, name: &str, doc: &str, f: F) -> BindResult<Self>
    where
        F: IntoMethod<T, Args, Ret>,
    {
        self.binding.method(name, doc, f)?;
        Ok(self)
    }

    /// A method whose parameters can also be passed by keyword.
    pub fn method_with_params<F, Args, Ret>(
        mut self,
        name: &str,
        params: &[&str],
        f: F,
    ) -> BindResult<Self>
    where
        F: IntoMethod<T, Args, Ret>,
    {
        self.binding.method_with_params(name, "", params, f)?;
        Ok(self)
    }

    /// Create the type object and add it to the module.
    pub fn build(self) -> BindResult<HostType> {
        self.module.add_type(self.binding)
    }
}
