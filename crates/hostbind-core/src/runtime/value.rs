//! Object kinds stored in the host heap.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use super::heap::ObjectHandle;
use super::RawObject;
use crate::TypeHash;

/// Entry point of a host-callable function.
///
/// Arguments are `(receiver, args, kwargs)`; all three are borrowed
/// references. The result is a new reference, or `None` with the pending
/// error indicator set.
pub type HostEntry = Rc<dyn Fn(RawObject, ObjectHandle, RawObject) -> RawObject>;

bitflags! {
    /// Calling-convention flags of a function object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CallFlags: u8 {
        /// Accepts a positional argument tuple.
        const POSITIONAL = 1 << 0;
        /// Accepts a keyword argument mapping.
        const KEYWORDS = 1 << 1;
        /// Host-authored function: a bound receiver is prepended to the
        /// positional arguments instead of being passed separately.
        const SELF_IN_ARGS = 1 << 2;
    }
}

bitflags! {
    /// Flags of a type object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: u8 {
        /// May be used as the base of a host-authored class.
        const BASETYPE = 1 << 0;
        /// Authored in host code rather than bound from native code.
        const HEAPTYPE = 1 << 1;
    }
}

/// Runtime type tag of a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    None,
    Bool,
    Int,
    Float,
    Str,
    Tuple,
    Dict,
    Array,
    Function,
    BoundMethod,
    Type,
    Instance,
    Module,
}

impl TypeTag {
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::None => "NoneType",
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::Tuple => "tuple",
            TypeTag::Dict => "dict",
            TypeTag::Array => "array",
            TypeTag::Function => "builtin_function",
            TypeTag::BoundMethod => "method",
            TypeTag::Type => "type",
            TypeTag::Instance => "object",
            TypeTag::Module => "module",
        }
    }
}

/// Hashable value usable as a dict key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DictKey {
    None,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
}

impl DictKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DictKey::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for DictKey {
    fn from(value: &str) -> Self {
        DictKey::Str(value.to_owned())
    }
}

impl From<String> for DictKey {
    fn from(value: String) -> Self {
        DictKey::Str(value)
    }
}

impl From<i64> for DictKey {
    fn from(value: i64) -> Self {
        DictKey::Int(value)
    }
}

impl From<bool> for DictKey {
    fn from(value: bool) -> Self {
        DictKey::Bool(value)
    }
}

impl fmt::Display for DictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictKey::None => f.write_str("None"),
            DictKey::Bool(true) => f.write_str("True"),
            DictKey::Bool(false) => f.write_str("False"),
            DictKey::Int(v) => write!(f, "{v}"),
            DictKey::Float(v) => write!(f, "{:?}", v.into_inner()),
            DictKey::Str(s) => write!(f, "'{s}'"),
        }
    }
}

/// Contents of an array-like object: a shape and row-major f64 data.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl ArrayData {
    /// Returns None when the data length does not match the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        let expected: usize = shape.iter().product();
        (expected == data.len()).then_some(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
}

/// Everything needed to create a type object.
pub struct TypeSpec {
    pub name: String,
    pub doc: String,
    /// Size of the per-instance native storage.
    pub basicsize: usize,
    pub flags: TypeFlags,
    /// Borrowed reference to the base type.
    pub base: RawObject,
    /// Initializer run on freshly allocated instances.
    pub init: Option<HostEntry>,
    /// Class attributes; each handle is borrowed.
    pub attrs: Vec<(String, ObjectHandle)>,
}

impl TypeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            basicsize: 0,
            flags: TypeFlags::empty(),
            base: None,
            init: None,
            attrs: Vec::new(),
        }
    }
}

pub(crate) struct FunctionObject {
    pub(crate) name: String,
    pub(crate) doc: String,
    pub(crate) flags: CallFlags,
    pub(crate) entry: HostEntry,
}

pub(crate) struct TypeObject {
    pub(crate) name: String,
    pub(crate) doc: String,
    pub(crate) hash: TypeHash,
    pub(crate) basicsize: usize,
    pub(crate) flags: TypeFlags,
    pub(crate) base: Option<ObjectHandle>,
    pub(crate) attrs: FxHashMap<String, ObjectHandle>,
    pub(crate) init: Option<HostEntry>,
}

pub(crate) struct InstanceObject {
    pub(crate) ty: ObjectHandle,
    pub(crate) dict: FxHashMap<String, ObjectHandle>,
    pub(crate) payload: Option<Box<dyn Any>>,
}

pub(crate) struct ModuleObject {
    pub(crate) name: String,
    pub(crate) doc: String,
    pub(crate) attrs: FxHashMap<String, ObjectHandle>,
}

pub(crate) enum HostValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Each element is an owned reference.
    Tuple(Vec<ObjectHandle>),
    /// Each value is an owned reference.
    Dict(FxHashMap<DictKey, ObjectHandle>),
    Array(ArrayData),
    Function(FunctionObject),
    BoundMethod {
        receiver: ObjectHandle,
        function: ObjectHandle,
    },
    Type(TypeObject),
    Instance(InstanceObject),
    Module(ModuleObject),
}

impl HostValue {
    pub(crate) fn tag(&self) -> TypeTag {
        match self {
            HostValue::None => TypeTag::None,
            HostValue::Bool(_) => TypeTag::Bool,
            HostValue::Int(_) => TypeTag::Int,
            HostValue::Float(_) => TypeTag::Float,
            HostValue::Str(_) => TypeTag::Str,
            HostValue::Tuple(_) => TypeTag::Tuple,
            HostValue::Dict(_) => TypeTag::Dict,
            HostValue::Array(_) => TypeTag::Array,
            HostValue::Function(_) => TypeTag::Function,
            HostValue::BoundMethod { .. } => TypeTag::BoundMethod,
            HostValue::Type(_) => TypeTag::Type,
            HostValue::Instance(_) => TypeTag::Instance,
            HostValue::Module(_) => TypeTag::Module,
        }
    }

    /// Split a dead value into the references it owned and its native payload.
    pub(crate) fn into_parts(self) -> (Vec<ObjectHandle>, Option<Box<dyn Any>>) {
        match self {
            HostValue::Tuple(items) => (items, None),
            HostValue::Dict(entries) => (entries.into_values().collect(), None),
            HostValue::BoundMethod { receiver, function } => (vec![receiver, function], None),
            HostValue::Type(ty) => {
                let mut owned: Vec<_> = ty.attrs.into_values().collect();
                owned.extend(ty.base);
                (owned, None)
            }
            HostValue::Instance(instance) => {
                let mut owned: Vec<_> = instance.dict.into_values().collect();
                owned.push(instance.ty);
                (owned, instance.payload)
            }
            HostValue::Module(module) => (module.attrs.into_values().collect(), None),
            _ => (Vec::new(), None),
        }
    }
}
