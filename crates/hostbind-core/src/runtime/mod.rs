//! In-process model of the host runtime.
//!
//! The host is a dynamically-typed, reference-counted object system that
//! reports failures through a pending error indicator. This module exposes it
//! through a small raw API in the style of a C extension interface:
//!
//! - handles are [`ObjectHandle`]s; a raw result is a [`RawObject`] where
//!   `None` is the null handle and means "check the error indicator"
//! - constructors return new references, `*_get_item` return borrowed ones
//! - [`call`] follows the host calling convention `(receiver, args, kwargs)`
//!
//! There is one runtime per thread. All host state on a thread is serialized
//! by construction, which models the host's single global execution lock.
//! Host callbacks are never invoked while the heap is borrowed, so calls may
//! nest and recurse freely.
//!
//! The class registry ([`register_binding`]) maps native types to their type
//! objects. It lives as long as the thread's runtime, i.e. from module load
//! to unload.

mod heap;
mod value;

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt::{self, Write};

use rustc_hash::FxHashMap;

pub use heap::{ObjectHandle, WeakHandle};
pub use value::{ArrayData, CallFlags, DictKey, HostEntry, TypeFlags, TypeSpec, TypeTag};

use heap::ObjectHeap;
use value::{FunctionObject, HostValue, InstanceObject, ModuleObject, TypeObject};

use crate::TypeHash;
use crate::error::{ExceptionKind, HostException};

/// A raw handle as produced by the host API. `None` is the null handle.
pub type RawObject = Option<ObjectHandle>;

const MAX_RENDER_DEPTH: usize = 32;

struct Runtime {
    heap: RefCell<ObjectHeap>,
    pending: RefCell<Option<HostException>>,
    bindings: RefCell<FxHashMap<TypeId, ObjectHandle>>,
    none: ObjectHandle,
}

impl Runtime {
    fn new() -> Self {
        let mut heap = ObjectHeap::new();
        let none = heap.allocate_immortal(HostValue::None);
        Self {
            heap: RefCell::new(heap),
            pending: RefCell::new(None),
            bindings: RefCell::new(FxHashMap::default()),
            none,
        }
    }
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    RUNTIME.with(f)
}

// =============================================================================
// Error indicator
// =============================================================================

pub fn err_set(kind: ExceptionKind, message: impl Into<String>) {
    err_restore(HostException::new(kind, message));
}

/// Set the pending exception, replacing any previous one.
pub fn err_restore(exception: HostException) {
    with(|rt| *rt.pending.borrow_mut() = Some(exception));
}

pub fn err_occurred() -> bool {
    with(|rt| rt.pending.borrow().is_some())
}

/// Take the pending exception, clearing the indicator.
pub fn err_fetch() -> Option<HostException> {
    with(|rt| rt.pending.borrow_mut().take())
}

pub fn err_clear() {
    err_fetch();
}

fn fail<T>(kind: ExceptionKind, message: impl Into<String>) -> Option<T> {
    err_set(kind, message);
    None
}

// =============================================================================
// Reference counting
// =============================================================================

/// The none singleton (borrowed).
pub fn none() -> ObjectHandle {
    with(|rt| rt.none)
}

/// Returns false if the handle is stale.
pub fn inc_ref(handle: ObjectHandle) -> bool {
    with(|rt| rt.heap.borrow_mut().add_ref(handle))
}

/// Release one reference, tearing down whatever becomes unreachable.
///
/// Native payloads are dropped with no heap borrow held, so their
/// destructors may release host references in turn. Silently does nothing
/// once the thread's runtime has been torn down.
pub fn dec_ref(handle: ObjectHandle) {
    let mut pending = vec![handle];
    while let Some(handle) = pending.pop() {
        let freed = RUNTIME
            .try_with(|rt| rt.heap.borrow_mut().release(handle))
            .ok()
            .flatten();
        let Some(value) = freed else { continue };
        let (owned, payload) = value.into_parts();
        pending.extend(owned);
        drop(payload);
    }
}

pub fn ref_count(handle: ObjectHandle) -> Option<u32> {
    with(|rt| rt.heap.borrow().ref_count(handle))
}

pub fn is_live(handle: ObjectHandle) -> bool {
    with(|rt| rt.heap.borrow().is_live(handle))
}

/// Number of live objects on this thread's heap, the none singleton included.
pub fn live_objects() -> usize {
    with(|rt| rt.heap.borrow().live_count())
}

// =============================================================================
// Weak handles
// =============================================================================

pub fn downgrade(handle: ObjectHandle) -> WeakHandle {
    WeakHandle(handle)
}

/// New reference to the target, or `None` (no error set) if it was freed.
pub fn upgrade(weak: WeakHandle) -> RawObject {
    inc_ref(weak.0).then_some(weak.0)
}

pub fn is_expired(weak: WeakHandle) -> bool {
    !is_live(weak.0)
}

// =============================================================================
// Scalars
// =============================================================================

fn alloc(value: HostValue) -> ObjectHandle {
    with(|rt| rt.heap.borrow_mut().allocate(value))
}

pub fn new_bool(value: bool) -> RawObject {
    Some(alloc(HostValue::Bool(value)))
}

pub fn new_int(value: i64) -> RawObject {
    Some(alloc(HostValue::Int(value)))
}

pub fn new_float(value: f64) -> RawObject {
    Some(alloc(HostValue::Float(value)))
}

pub fn new_str(value: &str) -> RawObject {
    Some(alloc(HostValue::Str(value.to_owned())))
}

pub fn new_array(data: ArrayData) -> RawObject {
    Some(alloc(HostValue::Array(data)))
}

pub fn as_bool(handle: ObjectHandle) -> Option<bool> {
    with(|rt| match rt.heap.borrow().get(handle) {
        Some(HostValue::Bool(v)) => Some(*v),
        _ => None,
    })
}

pub fn as_int(handle: ObjectHandle) -> Option<i64> {
    with(|rt| match rt.heap.borrow().get(handle) {
        Some(HostValue::Int(v)) => Some(*v),
        _ => None,
    })
}

pub fn as_float(handle: ObjectHandle) -> Option<f64> {
    with(|rt| match rt.heap.borrow().get(handle) {
        Some(HostValue::Float(v)) => Some(*v),
        _ => None,
    })
}

pub fn as_str(handle: ObjectHandle) -> Option<String> {
    with(|rt| match rt.heap.borrow().get(handle) {
        Some(HostValue::Str(v)) => Some(v.clone()),
        _ => None,
    })
}

pub fn as_array(handle: ObjectHandle) -> Option<ArrayData> {
    with(|rt| match rt.heap.borrow().get(handle) {
        Some(HostValue::Array(v)) => Some(v.clone()),
        _ => None,
    })
}

// =============================================================================
// Introspection
// =============================================================================

/// Runtime type tag, or None for a stale handle.
pub fn tag(handle: ObjectHandle) -> Option<TypeTag> {
    with(|rt| rt.heap.borrow().get(handle).map(HostValue::tag))
}

pub fn is_callable(handle: ObjectHandle) -> bool {
    matches!(
        tag(handle),
        Some(TypeTag::Function | TypeTag::BoundMethod | TypeTag::Type)
    )
}

/// Host-visible type name; instances report their class name.
pub fn type_name(handle: ObjectHandle) -> String {
    with(|rt| type_name_in(&rt.heap.borrow(), handle))
}

fn type_name_in(heap: &ObjectHeap, handle: ObjectHandle) -> String {
    match heap.get(handle) {
        Some(HostValue::Instance(instance)) => match heap.get(instance.ty) {
            Some(HostValue::Type(ty)) => ty.name.clone(),
            _ => TypeTag::Instance.name().to_owned(),
        },
        Some(value) => value.tag().name().to_owned(),
        None => "<freed>".to_owned(),
    }
}

pub fn str(handle: ObjectHandle) -> RawObject {
    render(handle, false)
}

pub fn repr(handle: ObjectHandle) -> RawObject {
    render(handle, true)
}

fn render(handle: ObjectHandle, repr: bool) -> RawObject {
    let text = with(|rt| {
        let heap = rt.heap.borrow();
        let mut out = String::new();
        write_value(&heap, handle, repr, 0, &mut out).ok().map(|()| out)
    });
    match text {
        Some(text) => new_str(&text),
        None => fail(ExceptionKind::SystemError, "str() of a freed object"),
    }
}

fn write_value(
    heap: &ObjectHeap,
    handle: ObjectHandle,
    repr: bool,
    depth: usize,
    out: &mut String,
) -> fmt::Result {
    let Some(value) = heap.get(handle) else {
        return Err(fmt::Error);
    };
    if depth > MAX_RENDER_DEPTH {
        return out.write_str("...");
    }
    match value {
        HostValue::None => write!(out, "None"),
        HostValue::Bool(true) => write!(out, "True"),
        HostValue::Bool(false) => write!(out, "False"),
        HostValue::Int(v) => write!(out, "{v}"),
        HostValue::Float(v) => write!(out, "{v:?}"),
        HostValue::Str(s) if repr => write!(out, "'{s}'"),
        HostValue::Str(s) => write!(out, "{s}"),
        HostValue::Tuple(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(heap, *item, true, depth + 1, out)?;
            }
            if items.len() == 1 {
                out.push(',');
            }
            write!(out, ")")
        }
        HostValue::Dict(entries) => {
            let mut sorted: Vec<_> = entries.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write!(out, "{key}: ")?;
                write_value(heap, *item, true, depth + 1, out)?;
            }
            write!(out, "}}")
        }
        HostValue::Array(array) => {
            let dims: Vec<String> = array.shape().iter().map(usize::to_string).collect();
            write!(out, "array(shape=({}))", dims.join(", "))
        }
        HostValue::Function(f) => write!(out, "<built-in function {}>", f.name),
        HostValue::BoundMethod { receiver, function } => {
            let name = match heap.get(*function) {
                Some(HostValue::Function(f)) => f.name.as_str(),
                _ => "?",
            };
            write!(
                out,
                "<bound method {name} of {} object>",
                type_name_in(heap, *receiver)
            )
        }
        HostValue::Type(ty) => write!(out, "<class '{}'>", ty.name),
        HostValue::Instance(_) => write!(out, "<{} object>", type_name_in(heap, handle)),
        HostValue::Module(module) => write!(out, "<module '{}'>", module.name),
    }
}

// =============================================================================
// Tuples
// =============================================================================

/// New tuple of `len` slots, each holding none.
pub fn tuple_new(len: isize) -> RawObject {
    let Ok(len) = usize::try_from(len) else {
        return fail(ExceptionKind::SystemError, "negative size passed to tuple_new");
    };
    with(|rt| {
        let mut heap = rt.heap.borrow_mut();
        for _ in 0..len {
            heap.add_ref(rt.none);
        }
        Some(heap.allocate(HostValue::Tuple(vec![rt.none; len])))
    })
}

pub fn tuple_size(tuple: ObjectHandle) -> Option<usize> {
    let size = with(|rt| match rt.heap.borrow().get(tuple) {
        Some(HostValue::Tuple(items)) => Some(items.len()),
        _ => None,
    });
    size.or_else(|| fail(ExceptionKind::SystemError, "bad argument to tuple_size"))
}

/// Borrowed reference to the item at `pos`.
pub fn tuple_get_item(tuple: ObjectHandle, pos: usize) -> RawObject {
    let item = with(|rt| match rt.heap.borrow().get(tuple) {
        Some(HostValue::Tuple(items)) => Ok(items.get(pos).copied()),
        _ => Err(()),
    });
    match item {
        Ok(Some(item)) => Some(item),
        Ok(None) => fail(ExceptionKind::IndexError, "tuple index out of range"),
        Err(()) => fail(ExceptionKind::SystemError, "bad argument to tuple_get_item"),
    }
}

/// Store `item` at `pos`.
///
/// On success the slot takes over the caller's reference to `item` and the
/// previous occupant is released. On failure nothing is taken.
pub fn tuple_set_item(tuple: ObjectHandle, pos: usize, item: ObjectHandle) -> Option<()> {
    let replaced = with(|rt| match rt.heap.borrow_mut().get_mut(tuple) {
        Some(HostValue::Tuple(items)) => Ok(items
            .get_mut(pos)
            .map(|slot| std::mem::replace(slot, item))),
        _ => Err(()),
    });
    match replaced {
        Ok(Some(previous)) => {
            dec_ref(previous);
            Some(())
        }
        Ok(None) => fail(
            ExceptionKind::IndexError,
            "tuple assignment index out of range",
        ),
        Err(()) => fail(ExceptionKind::SystemError, "bad argument to tuple_set_item"),
    }
}

// =============================================================================
// Dicts
// =============================================================================

pub fn dict_new() -> RawObject {
    Some(alloc(HostValue::Dict(FxHashMap::default())))
}

pub fn dict_size(dict: ObjectHandle) -> Option<usize> {
    let size = with(|rt| match rt.heap.borrow().get(dict) {
        Some(HostValue::Dict(entries)) => Some(entries.len()),
        _ => None,
    });
    size.or_else(|| fail(ExceptionKind::SystemError, "bad argument to dict_size"))
}

/// Insert `value` (borrowed; the dict takes its own reference).
pub fn dict_set_item(dict: ObjectHandle, key: DictKey, value: ObjectHandle) -> Option<()> {
    let replaced = with(|rt| {
        let mut heap = rt.heap.borrow_mut();
        if !matches!(heap.get(dict), Some(HostValue::Dict(_))) {
            return Err("bad argument to dict_set_item");
        }
        if !heap.add_ref(value) {
            return Err("dict_set_item with a freed value");
        }
        match heap.get_mut(dict) {
            Some(HostValue::Dict(entries)) => Ok(entries.insert(key, value)),
            _ => Err("bad argument to dict_set_item"),
        }
    });
    match replaced {
        Ok(previous) => {
            if let Some(previous) = previous {
                dec_ref(previous);
            }
            Some(())
        }
        Err(message) => fail(ExceptionKind::SystemError, message),
    }
}

/// Borrowed reference to the value under `key`.
///
/// A missing key returns `None` without setting the error indicator; a
/// non-dict argument sets it.
pub fn dict_get_item(dict: ObjectHandle, key: &DictKey) -> RawObject {
    let item = with(|rt| match rt.heap.borrow().get(dict) {
        Some(HostValue::Dict(entries)) => Ok(entries.get(key).copied()),
        _ => Err(()),
    });
    match item {
        Ok(item) => item,
        Err(()) => fail(ExceptionKind::SystemError, "bad argument to dict_get_item"),
    }
}

/// Key-ordered entries with borrowed value references.
pub fn dict_items(dict: ObjectHandle) -> Option<Vec<(DictKey, ObjectHandle)>> {
    let items = with(|rt| match rt.heap.borrow().get(dict) {
        Some(HostValue::Dict(entries)) => {
            let mut items: Vec<_> = entries.iter().map(|(k, v)| (k.clone(), *v)).collect();
            items.sort_by(|a, b| a.0.cmp(&b.0));
            Some(items)
        }
        _ => None,
    });
    items.or_else(|| fail(ExceptionKind::SystemError, "bad argument to dict_items"))
}

/// Hash key for `handle`; sets TypeError for unhashable objects.
pub fn key_of(handle: ObjectHandle) -> Option<DictKey> {
    let key = with(|rt| match rt.heap.borrow().get(handle) {
        Some(HostValue::None) => Ok(DictKey::None),
        Some(HostValue::Bool(v)) => Ok(DictKey::Bool(*v)),
        Some(HostValue::Int(v)) => Ok(DictKey::Int(*v)),
        Some(HostValue::Float(v)) => Ok(DictKey::Float((*v).into())),
        Some(HostValue::Str(v)) => Ok(DictKey::Str(v.clone())),
        Some(value) => Err(value.tag().name()),
        None => Err("<freed>"),
    });
    match key {
        Ok(key) => Some(key),
        Err(name) => fail(ExceptionKind::TypeError, format!("unhashable type: '{name}'")),
    }
}

// =============================================================================
// Attributes
// =============================================================================

enum Attribute {
    Plain(ObjectHandle),
    Method(ObjectHandle),
}

fn find_in_mro(
    heap: &ObjectHeap,
    ty: ObjectHandle,
    name: &str,
    include: impl Fn(&TypeObject) -> bool,
) -> Option<ObjectHandle> {
    let mut current = Some(ty);
    while let Some(handle) = current {
        let Some(HostValue::Type(ty)) = heap.get(handle) else {
            break;
        };
        if include(ty) {
            if let Some(attr) = ty.attrs.get(name) {
                return Some(*attr);
            }
        }
        current = ty.base;
    }
    None
}

fn classify(heap: &ObjectHeap, attr: ObjectHandle) -> Attribute {
    match heap.get(attr) {
        Some(HostValue::Function(_)) => Attribute::Method(attr),
        _ => Attribute::Plain(attr),
    }
}

/// Produce a new reference for a located attribute, binding methods.
fn materialize(heap: &mut ObjectHeap, receiver: ObjectHandle, attr: Attribute) -> ObjectHandle {
    match attr {
        Attribute::Plain(attr) => {
            heap.add_ref(attr);
            attr
        }
        Attribute::Method(function) => {
            heap.add_ref(receiver);
            heap.add_ref(function);
            heap.allocate(HostValue::BoundMethod { receiver, function })
        }
    }
}

/// New reference to attribute `name` of `obj`; AttributeError if absent.
pub fn getattr(obj: ObjectHandle, name: &str) -> RawObject {
    let found = with(|rt| {
        let mut heap = rt.heap.borrow_mut();
        let attr = match heap.get(obj) {
            Some(HostValue::Instance(instance)) => instance
                .dict
                .get(name)
                .copied()
                .map(Attribute::Plain)
                .or_else(|| {
                    find_in_mro(&heap, instance.ty, name, |_| true)
                        .map(|attr| classify(&heap, attr))
                }),
            Some(HostValue::Type(_)) => find_in_mro(&heap, obj, name, |_| true).map(Attribute::Plain),
            Some(HostValue::Module(module)) => module.attrs.get(name).copied().map(Attribute::Plain),
            Some(_) => None,
            None => return Err(HostException::new(
                ExceptionKind::SystemError,
                "getattr on a freed object",
            )),
        };
        match attr {
            Some(attr) => Ok(materialize(&mut heap, obj, attr)),
            None => Err(HostException::new(
                ExceptionKind::AttributeError,
                format!(
                    "'{}' object has no attribute '{name}'",
                    type_name_in(&heap, obj)
                ),
            )),
        }
    });
    match found {
        Ok(attr) => Some(attr),
        Err(exception) => {
            err_restore(exception);
            None
        }
    }
}

/// Find a host-authored override of `name` on an instance.
///
/// Only the instance dict and host-authored classes in the type chain are
/// searched; natively bound methods never count as an override. Returns a
/// new reference, or `None` without setting the error indicator.
pub fn lookup_override(obj: ObjectHandle, name: &str) -> RawObject {
    with(|rt| {
        let mut heap = rt.heap.borrow_mut();
        let attr = match heap.get(obj) {
            Some(HostValue::Instance(instance)) => {
                instance.dict.get(name).copied().map(Attribute::Plain).or_else(|| {
                    find_in_mro(&heap, instance.ty, name, |ty| {
                        ty.flags.contains(TypeFlags::HEAPTYPE)
                    })
                    .map(|attr| classify(&heap, attr))
                })
            }
            _ => None,
        }?;
        Some(materialize(&mut heap, obj, attr))
    })
}

/// Set attribute `name` (value borrowed) on an instance, host class or module.
pub fn setattr(obj: ObjectHandle, name: &str, value: ObjectHandle) -> Option<()> {
    let replaced = with(|rt| {
        let mut heap = rt.heap.borrow_mut();
        let type_name = type_name_in(&heap, obj);
        let writable = match heap.get(obj) {
            Some(HostValue::Instance(_) | HostValue::Module(_)) => true,
            Some(HostValue::Type(ty)) => ty.flags.contains(TypeFlags::HEAPTYPE),
            _ => false,
        };
        if !writable {
            return Err(HostException::new(
                ExceptionKind::AttributeError,
                format!("cannot set attribute '{name}' on '{type_name}' object"),
            ));
        }
        if !heap.add_ref(value) {
            return Err(HostException::new(
                ExceptionKind::SystemError,
                "setattr with a freed value",
            ));
        }
        let table = match heap.get_mut(obj) {
            Some(HostValue::Instance(instance)) => &mut instance.dict,
            Some(HostValue::Module(module)) => &mut module.attrs,
            Some(HostValue::Type(ty)) => &mut ty.attrs,
            _ => unreachable!("writability checked above"),
        };
        Ok(table.insert(name.to_owned(), value))
    });
    match replaced {
        Ok(previous) => {
            if let Some(previous) = previous {
                dec_ref(previous);
            }
            Some(())
        }
        Err(exception) => {
            err_restore(exception);
            None
        }
    }
}

// =============================================================================
// Functions, types, instances, modules
// =============================================================================

pub fn new_function(name: &str, doc: &str, flags: CallFlags, entry: HostEntry) -> RawObject {
    Some(alloc(HostValue::Function(FunctionObject {
        name: name.to_owned(),
        doc: doc.to_owned(),
        flags,
        entry,
    })))
}

pub fn function_doc(function: ObjectHandle) -> Option<String> {
    with(|rt| match rt.heap.borrow().get(function) {
        Some(HostValue::Function(f)) => Some(f.doc.clone()),
        _ => None,
    })
}

/// Create a type object. The base, if any, must be flagged `BASETYPE`.
pub fn new_type(spec: TypeSpec) -> RawObject {
    let created = with(|rt| {
        let mut heap = rt.heap.borrow_mut();
        if let Some(base) = spec.base {
            match heap.get(base) {
                Some(HostValue::Type(ty)) if ty.flags.contains(TypeFlags::BASETYPE) => {}
                Some(HostValue::Type(ty)) => {
                    return Err(HostException::new(
                        ExceptionKind::TypeError,
                        format!("type '{}' is not an acceptable base type", ty.name),
                    ));
                }
                _ => {
                    return Err(HostException::new(
                        ExceptionKind::TypeError,
                        "base must be a type object",
                    ));
                }
            }
        }
        if spec.attrs.iter().any(|(_, attr)| !heap.is_live(*attr)) {
            return Err(HostException::new(
                ExceptionKind::SystemError,
                "type attribute refers to a freed object",
            ));
        }
        if let Some(base) = spec.base {
            heap.add_ref(base);
        }
        let mut attrs = FxHashMap::default();
        let mut replaced = Vec::new();
        for (name, attr) in spec.attrs {
            heap.add_ref(attr);
            replaced.extend(attrs.insert(name, attr));
        }
        let ty = heap.allocate(HostValue::Type(TypeObject {
            hash: TypeHash::from_name(&spec.name),
            name: spec.name,
            doc: spec.doc,
            basicsize: spec.basicsize,
            flags: spec.flags,
            base: spec.base,
            attrs,
            init: spec.init,
        }));
        Ok((ty, replaced))
    });
    match created {
        Ok((ty, replaced)) => {
            replaced.into_iter().for_each(dec_ref);
            Some(ty)
        }
        Err(exception) => {
            err_restore(exception);
            None
        }
    }
}

/// Host-side `class Name(base): ...` with the given class attributes.
pub fn define_class(
    name: &str,
    base: Option<ObjectHandle>,
    attrs: &[(&str, ObjectHandle)],
) -> RawObject {
    let mut spec = TypeSpec::new(name);
    spec.flags = TypeFlags::BASETYPE | TypeFlags::HEAPTYPE;
    spec.base = base;
    spec.attrs = attrs
        .iter()
        .map(|(name, attr)| ((*name).to_owned(), *attr))
        .collect();
    new_type(spec)
}

fn with_type<R>(ty: ObjectHandle, f: impl FnOnce(&TypeObject) -> R) -> Option<R> {
    with(|rt| match rt.heap.borrow().get(ty) {
        Some(HostValue::Type(ty)) => Some(f(ty)),
        _ => None,
    })
}

pub fn type_object_name(ty: ObjectHandle) -> Option<String> {
    with_type(ty, |ty| ty.name.clone())
}

pub fn type_doc(ty: ObjectHandle) -> Option<String> {
    with_type(ty, |ty| ty.doc.clone())
}

pub fn type_basicsize(ty: ObjectHandle) -> Option<usize> {
    with_type(ty, |ty| ty.basicsize)
}

pub fn type_flags(ty: ObjectHandle) -> Option<TypeFlags> {
    with_type(ty, |ty| ty.flags)
}

pub fn type_hash(ty: ObjectHandle) -> Option<TypeHash> {
    with_type(ty, |ty| ty.hash)
}

/// Whether `ty` is `base` or derives from it.
pub fn is_subtype(ty: ObjectHandle, base: ObjectHandle) -> bool {
    with(|rt| {
        let heap = rt.heap.borrow();
        let mut current = Some(ty);
        while let Some(handle) = current {
            if handle == base {
                return true;
            }
            current = match heap.get(handle) {
                Some(HostValue::Type(ty)) => ty.base,
                _ => None,
            };
        }
        false
    })
}

/// Borrowed reference to the class of an instance.
pub fn instance_type(obj: ObjectHandle) -> Option<ObjectHandle> {
    with(|rt| match rt.heap.borrow().get(obj) {
        Some(HostValue::Instance(instance)) => Some(instance.ty),
        _ => None,
    })
}

pub fn is_instance(obj: ObjectHandle, ty: ObjectHandle) -> bool {
    instance_type(obj).is_some_and(|actual| is_subtype(actual, ty))
}

/// Allocate an instance of `ty` holding an optional native payload.
pub fn new_instance(ty: ObjectHandle, payload: Option<Box<dyn Any>>) -> RawObject {
    let created = with(|rt| {
        let mut heap = rt.heap.borrow_mut();
        if !matches!(heap.get(ty), Some(HostValue::Type(_))) {
            return Err(payload);
        }
        heap.add_ref(ty);
        Ok(heap.allocate(HostValue::Instance(InstanceObject {
            ty,
            dict: FxHashMap::default(),
            payload,
        })))
    });
    match created {
        Ok(instance) => Some(instance),
        Err(payload) => {
            drop(payload);
            fail(ExceptionKind::TypeError, "new_instance requires a type object")
        }
    }
}

/// Clone of the instance payload if it has type `P`.
pub fn instance_payload<P: Clone + 'static>(obj: ObjectHandle) -> Option<P> {
    with(|rt| match rt.heap.borrow().get(obj) {
        Some(HostValue::Instance(instance)) => instance
            .payload
            .as_ref()
            .and_then(|payload| payload.downcast_ref::<P>())
            .cloned(),
        _ => None,
    })
}

/// Replace the native payload of an instance.
pub fn instance_set_payload(obj: ObjectHandle, payload: Box<dyn Any>) -> Option<()> {
    let swapped = with(|rt| match rt.heap.borrow_mut().get_mut(obj) {
        Some(HostValue::Instance(instance)) => Ok(instance.payload.replace(payload)),
        _ => Err(payload),
    });
    match swapped {
        Ok(previous) => {
            drop(previous);
            Some(())
        }
        Err(payload) => {
            drop(payload);
            fail(ExceptionKind::TypeError, "payload target is not an instance")
        }
    }
}

/// Module object exposing `attrs` (borrowed) as its attributes.
pub fn new_module(name: &str, doc: &str, attrs: &[(String, ObjectHandle)]) -> RawObject {
    let created = with(|rt| {
        let mut heap = rt.heap.borrow_mut();
        if attrs.iter().any(|(_, attr)| !heap.is_live(*attr)) {
            return None;
        }
        let mut table = FxHashMap::default();
        let mut replaced = Vec::new();
        for (name, attr) in attrs {
            heap.add_ref(*attr);
            replaced.extend(table.insert(name.clone(), *attr));
        }
        let module = heap.allocate(HostValue::Module(ModuleObject {
            name: name.to_owned(),
            doc: doc.to_owned(),
            attrs: table,
        }));
        Some((module, replaced))
    });
    match created {
        Some((module, replaced)) => {
            replaced.into_iter().for_each(dec_ref);
            Some(module)
        }
        None => fail(ExceptionKind::SystemError, "module attribute refers to a freed object"),
    }
}

pub fn module_doc(module: ObjectHandle) -> Option<String> {
    with(|rt| match rt.heap.borrow().get(module) {
        Some(HostValue::Module(module)) => Some(module.doc.clone()),
        _ => None,
    })
}

// =============================================================================
// Class registry
// =============================================================================

/// Record `ty` as the type object for native type `native`.
pub fn register_binding(native: TypeId, ty: ObjectHandle) {
    inc_ref(ty);
    let previous = with(|rt| rt.bindings.borrow_mut().insert(native, ty));
    if let Some(previous) = previous {
        dec_ref(previous);
    }
}

/// Borrowed reference to the type object bound to `native`.
pub fn binding_for(native: TypeId) -> Option<ObjectHandle> {
    with(|rt| rt.bindings.borrow().get(&native).copied()).filter(|ty| is_live(*ty))
}

// =============================================================================
// Calls
// =============================================================================

enum CallTarget {
    Function {
        name: String,
        flags: CallFlags,
        entry: HostEntry,
        receiver: RawObject,
    },
    Construct {
        ty: ObjectHandle,
        name: String,
        init: Option<HostEntry>,
        host_only: bool,
    },
}

fn resolve_call(heap: &ObjectHeap, callable: ObjectHandle) -> Result<CallTarget, HostException> {
    let function_target = |f: &FunctionObject, receiver| CallTarget::Function {
        name: f.name.clone(),
        flags: f.flags,
        entry: f.entry.clone(),
        receiver,
    };
    match heap.get(callable) {
        Some(HostValue::Function(f)) => Ok(function_target(f, None)),
        Some(HostValue::BoundMethod { receiver, function }) => match heap.get(*function) {
            Some(HostValue::Function(f)) => Ok(function_target(f, Some(*receiver))),
            _ => Err(HostException::new(
                ExceptionKind::SystemError,
                "bound method without a function",
            )),
        },
        Some(HostValue::Type(ty)) => {
            let mut init = None;
            let mut host_only = true;
            let mut current = Some(callable);
            while let Some(handle) = current {
                let Some(HostValue::Type(t)) = heap.get(handle) else {
                    break;
                };
                host_only &= t.flags.contains(TypeFlags::HEAPTYPE);
                if t.init.is_some() {
                    init = t.init.clone();
                    break;
                }
                current = t.base;
            }
            Ok(CallTarget::Construct {
                ty: callable,
                name: ty.name.clone(),
                init,
                host_only,
            })
        }
        Some(_) => Err(HostException::new(
            ExceptionKind::TypeError,
            format!("'{}' object is not callable", type_name_in(heap, callable)),
        )),
        None => Err(HostException::new(
            ExceptionKind::SystemError,
            "call on a freed object",
        )),
    }
}

/// New tuple `(first, *args)`.
fn prepend(first: ObjectHandle, args: ObjectHandle) -> RawObject {
    let built = with(|rt| {
        let mut heap = rt.heap.borrow_mut();
        let Some(HostValue::Tuple(items)) = heap.get(args) else {
            return None;
        };
        let mut all = Vec::with_capacity(items.len() + 1);
        all.push(first);
        all.extend(items.iter().copied());
        for item in &all {
            heap.add_ref(*item);
        }
        Some(heap.allocate(HostValue::Tuple(all)))
    });
    built.or_else(|| fail(ExceptionKind::SystemError, "argument list must be a tuple"))
}

/// Call `callable(*args, **kwargs)`; `args` and `kwargs` are borrowed.
///
/// Returns a new reference, or `None` with the error indicator set. A callee
/// that breaks the error protocol is reported as a `SystemError`.
pub fn call(callable: ObjectHandle, args: ObjectHandle, kwargs: RawObject) -> RawObject {
    #[cfg(feature = "profiling")]
    profiling::scope!("runtime::call");

    let target = match with(|rt| resolve_call(&rt.heap.borrow(), callable)) {
        Ok(target) => target,
        Err(exception) => {
            err_restore(exception);
            return None;
        }
    };
    let has_kwargs = match kwargs {
        Some(kwargs) => dict_size(kwargs)? > 0,
        None => false,
    };

    let result = match target {
        CallTarget::Function {
            name,
            flags,
            entry,
            receiver,
        } => {
            if has_kwargs && !flags.contains(CallFlags::KEYWORDS) {
                return fail(
                    ExceptionKind::TypeError,
                    format!("{name}() takes no keyword arguments"),
                );
            }
            match receiver {
                Some(receiver) if flags.contains(CallFlags::SELF_IN_ARGS) => {
                    let shifted = prepend(receiver, args)?;
                    let result = entry(None, shifted, kwargs);
                    dec_ref(shifted);
                    result
                }
                Some(receiver) => {
                    inc_ref(receiver);
                    let result = entry(Some(receiver), args, kwargs);
                    dec_ref(receiver);
                    result
                }
                None => entry(None, args, kwargs),
            }
        }
        CallTarget::Construct {
            ty,
            name,
            init,
            host_only,
        } => {
            let Some(init) = init else {
                // Plain host classes take no constructor arguments.
                if !host_only || tuple_size(args) != Some(0) || has_kwargs {
                    return fail(
                        ExceptionKind::TypeError,
                        format!("cannot create '{name}' instances"),
                    );
                }
                return new_instance(ty, None);
            };
            let instance = new_instance(ty, None)?;
            match init(Some(instance), args, kwargs) {
                Some(result) => {
                    dec_ref(result);
                    Some(instance)
                }
                None => {
                    dec_ref(instance);
                    None
                }
            }
        }
    };
    check_result(result)
}

fn check_result(result: RawObject) -> RawObject {
    match result {
        None if !err_occurred() => fail(
            ExceptionKind::SystemError,
            "error return without exception set",
        ),
        Some(result) if err_occurred() => {
            dec_ref(result);
            let cause = err_fetch().map(|e| e.to_string()).unwrap_or_default();
            fail(
                ExceptionKind::SystemError,
                format!("result returned with an exception set ({cause})"),
            )
        }
        other => other,
    }
}
