//! Owning wrapper around a host object reference.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{BindError, BindResult};
use crate::runtime::{self, ObjectHandle, RawObject, TypeTag, WeakHandle};
use crate::views::{HostDict, HostTuple};

/// Owns exactly one counted reference to a live host object.
///
/// Construction either *borrows* a raw handle (taking a new reference) or
/// *adopts* one (absorbing a reference the caller already owns). Cloning
/// takes another reference, moving transfers it, dropping releases it.
///
/// A `HostObject` is never null: building one from a null raw handle fails
/// with [`BindError::HostErrorOccurred`], fetching the host's pending error.
///
/// Host objects belong to the runtime of the thread that created them, so
/// this type is neither `Send` nor `Sync`.
pub struct HostObject {
    handle: ObjectHandle,
    _not_send: PhantomData<Rc<()>>,
}

impl HostObject {
    fn from_handle(handle: ObjectHandle) -> Self {
        Self {
            handle,
            _not_send: PhantomData,
        }
    }

    /// The none singleton.
    pub fn none() -> Self {
        let none = runtime::none();
        runtime::inc_ref(none);
        Self::from_handle(none)
    }

    /// Wrap a borrowed reference, incrementing its count.
    pub fn borrowed(raw: RawObject, location: &str) -> BindResult<Self> {
        let handle = raw.ok_or_else(|| BindError::host_error(Some(location)))?;
        if !runtime::inc_ref(handle) {
            return Err(freed(location));
        }
        Ok(Self::from_handle(handle))
    }

    /// Wrap a new reference without touching its count.
    pub fn adopted(raw: RawObject, location: &str) -> BindResult<Self> {
        let handle = raw.ok_or_else(|| BindError::host_error(Some(location)))?;
        if !runtime::is_live(handle) {
            return Err(freed(location));
        }
        Ok(Self::from_handle(handle))
    }

    /// The raw handle; the reference stays owned by `self`.
    pub fn as_raw(&self) -> ObjectHandle {
        self.handle
    }

    /// Give up ownership of the reference, returning the raw handle.
    pub fn into_raw(self) -> ObjectHandle {
        let handle = self.handle;
        std::mem::forget(self);
        handle
    }

    /// Point at the object `other` refers to.
    ///
    /// The new referent is incremented before the old one is released, so
    /// assigning an alias of the same object is a no-op on the count.
    pub fn assign(&mut self, other: &HostObject) {
        runtime::inc_ref(other.handle);
        let previous = std::mem::replace(&mut self.handle, other.handle);
        runtime::dec_ref(previous);
    }

    pub fn ref_count(&self) -> u32 {
        runtime::ref_count(self.handle).unwrap_or(0)
    }

    pub fn tag(&self) -> TypeTag {
        runtime::tag(self.handle).unwrap_or(TypeTag::None)
    }

    /// Host-visible type name.
    pub fn type_name(&self) -> String {
        runtime::type_name(self.handle)
    }

    pub fn is_none(&self) -> bool {
        self.handle == runtime::none()
    }

    pub fn is_tuple(&self) -> bool {
        self.tag() == TypeTag::Tuple
    }

    pub fn is_dict(&self) -> bool {
        self.tag() == TypeTag::Dict
    }

    pub fn is_array(&self) -> bool {
        self.tag() == TypeTag::Array
    }

    pub fn is_type(&self) -> bool {
        self.tag() == TypeTag::Type
    }

    pub fn is_callable(&self) -> bool {
        runtime::is_callable(self.handle)
    }

    /// Identity comparison.
    pub fn is(&self, other: &HostObject) -> bool {
        self.handle == other.handle
    }

    pub fn str(&self) -> BindResult<String> {
        let text = HostObject::adopted(runtime::str(self.handle), "str()")?;
        runtime::as_str(text.handle)
            .ok_or_else(|| BindError::type_mismatch("str", text.type_name(), Some("str()")))
    }

    pub fn repr(&self) -> BindResult<String> {
        let text = HostObject::adopted(runtime::repr(self.handle), "repr()")?;
        runtime::as_str(text.handle)
            .ok_or_else(|| BindError::type_mismatch("str", text.type_name(), Some("repr()")))
    }

    /// Call this object with positional arguments.
    pub fn call(&self, args: &HostTuple) -> BindResult<HostObject> {
        HostObject::adopted(runtime::call(self.handle, args.as_raw(), None), "call")
    }

    /// Call this object with positional and keyword arguments.
    pub fn call_with_kwargs(&self, args: &HostTuple, kwargs: &HostDict) -> BindResult<HostObject> {
        HostObject::adopted(
            runtime::call(self.handle, args.as_raw(), Some(kwargs.as_raw())),
            "call",
        )
    }

    pub fn getattr(&self, name: &str) -> BindResult<HostObject> {
        HostObject::adopted(runtime::getattr(self.handle, name), name)
    }

    pub fn setattr(&self, name: &str, value: &HostObject) -> BindResult<()> {
        runtime::setattr(self.handle, name, value.handle)
            .ok_or_else(|| BindError::host_error(Some(name)))
    }

    pub fn downgrade(&self) -> WeakHandle {
        runtime::downgrade(self.handle)
    }

    /// Counted reference to the target of `weak`, unless it has been freed.
    pub fn upgrade(weak: WeakHandle) -> Option<HostObject> {
        runtime::upgrade(weak).map(Self::from_handle)
    }
}

fn freed(location: &str) -> BindError {
    BindError::type_mismatch("live object", "freed object", Some(location))
}

impl Clone for HostObject {
    fn clone(&self) -> Self {
        runtime::inc_ref(self.handle);
        Self::from_handle(self.handle)
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl Drop for HostObject {
    fn drop(&mut self) {
        runtime::dec_ref(self.handle);
    }
}

impl Default for HostObject {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.str() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "<{} object>", self.type_name()),
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("handle", &self.handle)
            .field("type", &self.type_name())
            .finish()
    }
}
