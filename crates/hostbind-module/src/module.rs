//! The extension module: registration records and the one-time load call.
//!
//! An [`ExtensionModule`] accumulates functions and types during setup. A
//! single [`finalize`](ExtensionModule::finalize) hands them to the host
//! runtime and yields the module object. The registrar is sealed afterwards:
//! every registration call fails with [`BindError::AlreadyFinalized`] and a
//! second finalize fails with [`BindError::DoubleFinalize`].
//!
//! ```ignore
//! let module = load_module("shapes", "Geometry helpers", |m| {
//!     m.add_function("area", |w: f64, h: f64| w * h)?;
//!     m.register_type::<Rect>("Rect")
//!         .constructor(|_: &HostObject, w: f64, h: f64| Rc::new(Rect { w, h }))?
//!         .method("area", |r: &Rect| r.w * r.h)?
//!         .build()?;
//!     Ok(())
//! });
//! ```

use hostbind_core::runtime::{self, CallFlags};
use hostbind_core::{
    BindError, BindResult, HostObject, HostType, NativeType, ObjectHandle, RawObject, TypeHash,
};
use hostbind_ffi::{IntoNativeFn, NativeFn, TypeBinding, function_object, translate};
use rustc_hash::FxHashSet;

use crate::class_builder::ClassBuilder;
use crate::function_builder::FunctionBuilder;

struct FunctionRecord {
    function: NativeFn,
    doc: String,
    flags: CallFlags,
}

/// Registrar for one extension module.
pub struct ExtensionModule {
    name: String,
    doc: String,
    functions: Vec<FunctionRecord>,
    types: Vec<(String, HostType)>,
    names: FxHashSet<TypeHash>,
    object: Option<HostObject>,
}

impl ExtensionModule {
    pub fn new(name: impl Into<String>, doc: impl Into<String>) -> BindResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(BindError::InvalidRegistration(
                "module name must not be empty".to_owned(),
            ));
        }
        Ok(Self {
            name,
            doc: doc.into(),
            functions: Vec::new(),
            types: Vec::new(),
            names: FxHashSet::default(),
            object: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn is_finalized(&self) -> bool {
        self.object.is_some()
    }

    /// The loaded module object, once finalized.
    pub fn module_object(&self) -> Option<&HostObject> {
        self.object.as_ref()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Whether a function or type is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&TypeHash::from_name(name))
    }

    /// Register a function without a docstring.
    pub fn add_function<F, Args, Ret>(&mut self, name: &str, f: F) -> BindResult<()>
    where
        F: IntoNativeFn<Args, Ret>,
    {
        self.function(name).register(f)
    }

    pub fn add_function_with_doc<F, Args, Ret>(
        &mut self,
        name: &str,
        doc: &str,
        f: F,
    ) -> BindResult<()>
    where
        F: IntoNativeFn<Args, Ret>,
    {
        self.function(name).doc(doc).register(f)
    }

    /// Start registering a function with options beyond a docstring.
    pub fn function(&mut self, name: &str) -> FunctionBuilder<'_> {
        FunctionBuilder::new(self, name)
    }

    /// Start registering the native type `T` under `name`.
    pub fn register_type<T: NativeType + ?Sized>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        ClassBuilder::new(self, name)
    }

    /// Create the type object for a completed binding and add it.
    pub fn add_type<T: NativeType + ?Sized>(
        &mut self,
        binding: TypeBinding<T>,
    ) -> BindResult<HostType> {
        self.check_open("add_type")?;
        self.claim(binding.name())?;
        let name = binding.name().to_owned();
        let ty = match binding.create_type_object() {
            Ok(ty) => ty,
            Err(err) => {
                self.names.remove(&TypeHash::from_name(&name));
                return Err(err);
            }
        };
        self.types.push((name, ty.clone()));
        Ok(ty)
    }

    pub(crate) fn push_function(
        &mut self,
        function: NativeFn,
        doc: String,
        flags: CallFlags,
    ) -> BindResult<()> {
        self.check_open("add_function")?;
        self.claim(function.name())?;
        self.functions.push(FunctionRecord {
            function,
            doc,
            flags,
        });
        Ok(())
    }

    pub(crate) fn check_open(&self, operation: &'static str) -> BindResult<()> {
        if self.is_finalized() {
            return Err(BindError::AlreadyFinalized {
                module: self.name.clone(),
                operation,
            });
        }
        Ok(())
    }

    fn claim(&mut self, name: &str) -> BindResult<()> {
        if name.is_empty() {
            return Err(BindError::InvalidRegistration(format!(
                "module '{}': attribute name must not be empty",
                self.name
            )));
        }
        if !self.names.insert(TypeHash::from_name(name)) {
            return Err(BindError::InvalidRegistration(format!(
                "module '{}' already defines '{name}'",
                self.name
            )));
        }
        Ok(())
    }

    /// Hand every record to the host runtime and create the module object.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn finalize(&mut self) -> BindResult<HostObject> {
        if self.is_finalized() {
            return Err(BindError::DoubleFinalize {
                module: self.name.clone(),
            });
        }

        let mut attrs: Vec<(String, HostObject)> =
            Vec::with_capacity(self.functions.len() + self.types.len());
        for record in &self.functions {
            let name = record.function.name().to_owned();
            let object = function_object(record.function.clone(), &record.doc, record.flags)?;
            attrs.push((name, object));
        }
        for (name, ty) in &self.types {
            attrs.push((name.clone(), ty.as_object().clone()));
        }

        let raw: Vec<(String, ObjectHandle)> = attrs
            .iter()
            .map(|(name, object)| (name.clone(), object.as_raw()))
            .collect();
        let module = HostObject::adopted(
            runtime::new_module(&self.name, &self.doc, &raw),
            &self.name,
        )?;
        self.object = Some(module.clone());
        Ok(module)
    }
}

/// The module's load entry point.
///
/// Runs `setup` on a fresh registrar and finalizes it. Follows the host
/// calling convention: a new reference to the module, or `None` with the
/// error indicator set.
pub fn load_module<F>(name: &str, doc: &str, setup: F) -> RawObject
where
    F: FnOnce(&mut ExtensionModule) -> BindResult<()>,
{
    translate(name, || {
        let mut module = ExtensionModule::new(name, doc)?;
        setup(&mut module)?;
        module.finalize()
    })
}
