//! Exposing a native class as a host type.
//!
//! A [`TypeBinding<T>`] collects the constructors and methods of a native
//! class and, once complete, creates the host type object. Every instance of
//! that type stores an `Rc<T>` as its native payload, so the object stays
//! alive as long as either side holds it.
//!
//! `T` may be a trait object. Binding `dyn Trait` lets native
//! implementations and host-side subclasses share one host type; see
//! [`BackReference`](crate::BackReference) for the override path.

use std::any::TypeId;
use std::marker::PhantomData;
use std::mem;
use std::rc::Rc;

use hostbind_core::runtime::{self, CallFlags, TypeFlags, TypeSpec};
use rustc_hash::FxHashSet;
use hostbind_core::{
    BindError, BindResult, HostObject, HostType, NativeType, TypeHash, bound_type,
    shared_from_host, shared_to_host,
};

use crate::adapter::{IntoConstructor, IntoMethod};
use crate::boundary::{constructor_entry, function_object};
use crate::native_fn::{CallableKind, NativeFn};

/// Descriptor of a native class awaiting registration.
pub struct TypeBinding<T: NativeType + ?Sized> {
    name: String,
    doc: String,
    flags: TypeFlags,
    constructors: Vec<NativeFn>,
    methods: Vec<(NativeFn, String)>,
    constructor_ids: FxHashSet<TypeHash>,
    method_ids: FxHashSet<TypeHash>,
    _marker: PhantomData<fn() -> Rc<T>>,
}

impl<T: NativeType + ?Sized> TypeBinding<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            flags: TypeFlags::empty(),
            constructors: Vec::new(),
            methods: Vec::new(),
            constructor_ids: FxHashSet::default(),
            method_ids: FxHashSet::default(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_hash(&self) -> TypeHash {
        TypeHash::from_name(&self.name)
    }

    /// Size of the native storage in each instance.
    pub fn basicsize(&self) -> usize {
        mem::size_of::<Rc<T>>()
    }

    pub fn set_doc(&mut self, doc: impl Into<String>) {
        self.doc = doc.into();
    }

    /// Allow host code to derive from this type.
    pub fn set_subclassable(&mut self) {
        self.flags |= TypeFlags::BASETYPE;
    }

    pub fn is_subclassable(&self) -> bool {
        self.flags.contains(TypeFlags::BASETYPE)
    }

    /// Add a constructor. Constructors must differ in arity.
    pub fn add_constructor(&mut self, constructor: NativeFn) -> BindResult<()> {
        if constructor.signature().kind != CallableKind::Constructor {
            return Err(BindError::InvalidRegistration(format!(
                "'{}' is not a constructor",
                constructor.name()
            )));
        }
        if !self
            .constructor_ids
            .insert(TypeHash::from_constructor(self.type_hash(), constructor.arity()))
        {
            return Err(BindError::InvalidRegistration(format!(
                "'{}' already has a constructor taking {} arguments",
                self.name,
                constructor.arity()
            )));
        }
        self.constructors.push(constructor);
        Ok(())
    }

    /// Add a method. Method names must be unique.
    pub fn add_method(&mut self, method: NativeFn, doc: impl Into<String>) -> BindResult<()> {
        if method.name().is_empty() {
            return Err(BindError::InvalidRegistration(format!(
                "method of '{}' with an empty name",
                self.name
            )));
        }
        if !self
            .method_ids
            .insert(TypeHash::from_method(self.type_hash(), method.name()))
        {
            return Err(BindError::InvalidRegistration(format!(
                "'{}' already has a method '{}'",
                self.name,
                method.name()
            )));
        }
        self.methods.push((method, doc.into()));
        Ok(())
    }

    /// Adapt and add a constructor; see [`IntoConstructor`].
    pub fn constructor<F, Args, Ret>(&mut self, f: F) -> BindResult<()>
    where
        F: IntoConstructor<T, Args, Ret>,
    {
        let constructor = f.into_constructor(&self.name);
        self.add_constructor(constructor)
    }

    /// Like [`constructor`](Self::constructor), with parameter names for
    /// keyword binding. The implicit proxy argument is not named.
    pub fn constructor_with_params<F, Args, Ret>(&mut self, params: &[&str], f: F) -> BindResult<()>
    where
        F: IntoConstructor<T, Args, Ret>,
    {
        let constructor = f.into_constructor(&self.name).with_params(params)?;
        self.add_constructor(constructor)
    }

    /// Adapt and add a method; see [`IntoMethod`].
    pub fn method<F, Args, Ret>(&mut self, name: &str, doc: &str, f: F) -> BindResult<()>
    where
        F: IntoMethod<T, Args, Ret>,
    {
        self.add_method(f.into_method(name), doc)
    }

    /// Like [`method`](Self::method), with parameter names for keyword
    /// binding. The receiver is not named.
    pub fn method_with_params<F, Args, Ret>(
        &mut self,
        name: &str,
        doc: &str,
        params: &[&str],
        f: F,
    ) -> BindResult<()>
    where
        F: IntoMethod<T, Args, Ret>,
    {
        let method = f.into_method(name).with_params(params)?;
        self.add_method(method, doc)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.method_ids
            .contains(&TypeHash::from_method(self.type_hash(), name))
    }

    pub fn constructor_count(&self) -> usize {
        self.constructors.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Create the host type object and record it as `T`'s binding.
    ///
    /// A type without constructors cannot be instantiated from the host;
    /// instances then only come from native code returning `Rc<T>`.
    ///
    /// Each native type is bound at most once per runtime, otherwise
    /// instances of the earlier type object would stop converting.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create_type_object(self) -> BindResult<HostType> {
        if let Ok(existing) = bound_type::<T>() {
            return Err(BindError::InvalidRegistration(format!(
                "native type '{}' is already bound as '{}'",
                T::NAME,
                existing.name()
            )));
        }
        let methods = self
            .methods
            .into_iter()
            .map(|(method, doc)| {
                let name = method.name().to_owned();
                let object = function_object(method, &doc, CallFlags::POSITIONAL | CallFlags::KEYWORDS)?;
                Ok((name, object))
            })
            .collect::<BindResult<Vec<_>>>()?;

        let mut spec = TypeSpec::new(&self.name);
        spec.doc = self.doc;
        spec.basicsize = mem::size_of::<Rc<T>>();
        spec.flags = self.flags;
        if !self.constructors.is_empty() {
            spec.init = Some(constructor_entry(&self.name, self.constructors));
        }
        spec.attrs = methods
            .iter()
            .map(|(name, object)| (name.clone(), object.as_raw()))
            .collect();

        let object = HostObject::adopted(runtime::new_type(spec), &self.name)?;
        let ty = HostType::from_object(object, &self.name)?;
        runtime::register_binding(TypeId::of::<T>(), ty.as_raw());
        Ok(ty)
    }

    /// The host type object created for `T`.
    pub fn type_object() -> BindResult<HostType> {
        bound_type::<T>()
    }

    /// Extract the shared holder from a host instance.
    pub fn from_host(obj: &HostObject, location: &str) -> BindResult<Rc<T>> {
        shared_from_host(obj, location)
    }

    /// Wrap a shared holder in a new host instance.
    pub fn to_host(shared: Rc<T>) -> BindResult<HostObject> {
        shared_to_host(shared)
    }
}
