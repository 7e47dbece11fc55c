//! Tag-checked views over [`HostObject`].
//!
//! A view is a `HostObject` that is known to carry a particular runtime type
//! tag. The tag is checked at construction and on every assignment; a
//! mismatch is a [`BindError::TypeMismatch`], never a host error, and leaves
//! reference counts balanced.

use std::ops::Deref;

use crate::convert::IntoHostTuple;
use crate::error::{BindError, BindResult};
use crate::object::HostObject;
use crate::runtime::{self, DictKey, TypeFlags, TypeTag};
use crate::type_hash::TypeHash;

fn check_tag(
    object: &HostObject,
    expected: TypeTag,
    location: &str,
) -> BindResult<()> {
    if object.tag() == expected {
        Ok(())
    } else {
        Err(BindError::type_mismatch(
            expected.name(),
            object.type_name(),
            Some(location),
        ))
    }
}

macro_rules! impl_view {
    ($view:ident, $tag:expr) => {
        impl $view {
            /// Wrap `object`, checking its runtime tag.
            pub fn from_object(object: HostObject, location: &str) -> BindResult<Self> {
                check_tag(&object, $tag, location)?;
                Ok(Self { object })
            }

            /// Re-point the view at `object`, which must carry the same tag.
            ///
            /// On mismatch the view is left untouched.
            pub fn assign(&mut self, object: &HostObject, location: &str) -> BindResult<()> {
                check_tag(object, $tag, location)?;
                self.object.assign(object);
                Ok(())
            }

            pub fn as_object(&self) -> &HostObject {
                &self.object
            }

            pub fn into_object(self) -> HostObject {
                self.object
            }
        }

        impl Deref for $view {
            type Target = HostObject;

            fn deref(&self) -> &HostObject {
                &self.object
            }
        }

        impl From<$view> for HostObject {
            fn from(view: $view) -> HostObject {
                view.object
            }
        }
    };
}

/// Fixed-length ordered sequence.
#[derive(Clone, Debug)]
pub struct HostTuple {
    object: HostObject,
}

impl_view!(HostTuple, TypeTag::Tuple);

impl HostTuple {
    /// A tuple of `len` slots, each holding none.
    pub fn make_empty(len: usize) -> BindResult<Self> {
        let size = isize::try_from(len).map_err(|_| BindError::Overflow {
            value: len as i128,
            target: "isize",
            location: Some("tuple size".to_owned()),
        })?;
        let object = HostObject::adopted(runtime::tuple_new(size), "tuple")?;
        Ok(Self { object })
    }

    /// A tuple holding each of `values` converted in order.
    ///
    /// Conversion stops at the first failure; the partially filled tuple is
    /// released and never observed by the host.
    pub fn make(values: impl IntoHostTuple) -> BindResult<Self> {
        values.into_host_tuple()
    }

    pub fn size(&self) -> usize {
        runtime::tuple_size(self.as_raw()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn get_item(&self, pos: usize) -> BindResult<HostObject> {
        HostObject::borrowed(
            runtime::tuple_get_item(self.as_raw(), pos),
            &format!("tuple index {pos}"),
        )
    }

    /// Store `value` at `pos`.
    ///
    /// The slot gets its own reference, taken before the store is attempted
    /// and given back if the store fails.
    pub fn set_item(&mut self, pos: usize, value: &HostObject) -> BindResult<()> {
        let item = value.as_raw();
        runtime::inc_ref(item);
        if runtime::tuple_set_item(self.as_raw(), pos, item).is_none() {
            runtime::dec_ref(item);
            return Err(BindError::host_error(Some(&format!("tuple index {pos}"))));
        }
        Ok(())
    }

    pub fn items(&self) -> BindResult<Vec<HostObject>> {
        (0..self.size()).map(|pos| self.get_item(pos)).collect()
    }
}

/// Key/value mapping.
#[derive(Clone, Debug)]
pub struct HostDict {
    object: HostObject,
}

impl_view!(HostDict, TypeTag::Dict);

impl HostDict {
    pub fn new() -> BindResult<Self> {
        let object = HostObject::adopted(runtime::dict_new(), "dict")?;
        Ok(Self { object })
    }

    pub fn size(&self) -> usize {
        runtime::dict_size(self.as_raw()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Value under `key`, or `None` if absent.
    pub fn get_item(&self, key: impl Into<DictKey>) -> BindResult<Option<HostObject>> {
        let key = key.into();
        match runtime::dict_get_item(self.as_raw(), &key) {
            Some(item) => HostObject::borrowed(Some(item), &key.to_string()).map(Some),
            None if runtime::err_occurred() => Err(BindError::host_error(Some(&key.to_string()))),
            None => Ok(None),
        }
    }

    pub fn set_item(&mut self, key: impl Into<DictKey>, value: &HostObject) -> BindResult<()> {
        let key = key.into();
        let location = key.to_string();
        runtime::dict_set_item(self.as_raw(), key, value.as_raw())
            .ok_or_else(|| BindError::host_error(Some(&location)))
    }

    /// Entries in key order.
    pub fn items(&self) -> BindResult<Vec<(DictKey, HostObject)>> {
        let items = runtime::dict_items(self.as_raw())
            .ok_or_else(|| BindError::host_error(Some("dict items")))?;
        items
            .into_iter()
            .map(|(key, item)| {
                let value = HostObject::borrowed(Some(item), &key.to_string())?;
                Ok((key, value))
            })
            .collect()
    }

    pub fn keys(&self) -> BindResult<Vec<DictKey>> {
        Ok(self.items()?.into_iter().map(|(key, _)| key).collect())
    }
}

/// A type object.
#[derive(Clone, Debug)]
pub struct HostType {
    object: HostObject,
}

impl_view!(HostType, TypeTag::Type);

impl HostType {
    /// The class of an instance, if `object` is one.
    pub fn of(object: &HostObject) -> Option<HostType> {
        let ty = runtime::instance_type(object.as_raw())?;
        let object = HostObject::borrowed(Some(ty), "type").ok()?;
        Some(Self { object })
    }

    pub fn name(&self) -> String {
        runtime::type_object_name(self.as_raw()).unwrap_or_default()
    }

    pub fn doc(&self) -> String {
        runtime::type_doc(self.as_raw()).unwrap_or_default()
    }

    /// Size of the per-instance native storage.
    pub fn basicsize(&self) -> usize {
        runtime::type_basicsize(self.as_raw()).unwrap_or(0)
    }

    pub fn flags(&self) -> TypeFlags {
        runtime::type_flags(self.as_raw()).unwrap_or(TypeFlags::empty())
    }

    pub fn type_hash(&self) -> TypeHash {
        runtime::type_hash(self.as_raw()).unwrap_or(TypeHash::EMPTY)
    }

    pub fn is_subtype_of(&self, base: &HostType) -> bool {
        runtime::is_subtype(self.as_raw(), base.as_raw())
    }

    /// Whether `object` is an instance of this type or a subtype.
    pub fn is_instance(&self, object: &HostObject) -> bool {
        runtime::is_instance(object.as_raw(), self.as_raw())
    }
}
