//! The catch-and-translate shim between host entry points and native code.
//!
//! Every entry point handed to the host runtime goes through [`translate`]:
//! a native `Err` is restored into the host's pending error indicator and a
//! panic is caught and reported as a `RuntimeError`. Nothing but "null handle
//! with the indicator set" ever reaches the host as a failure.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use hostbind_core::runtime::{self, CallFlags, HostEntry};
use hostbind_core::{
    BindError, BindResult, HostDict, HostObject, HostTuple, ObjectHandle, RawObject,
};

use crate::native_fn::{CallContext, NativeFn};

/// Run `f`, handing its outcome to the host calling convention.
///
/// Returns a new reference on success. On failure the pending error is set
/// and `None` is returned.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn translate(name: &str, f: impl FnOnce() -> BindResult<HostObject>) -> RawObject {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(result)) => Some(result.into_raw()),
        Ok(Err(err)) => {
            err.restore();
            None
        }
        Err(payload) => {
            BindError::Panic {
                message: format!("{name}(): {}", panic_message(payload.as_ref())),
            }
            .restore();
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

struct CallViews {
    receiver: Option<HostObject>,
    args: HostTuple,
    kwargs: Option<HostDict>,
}

fn views(receiver: RawObject, args: ObjectHandle, kwargs: RawObject) -> BindResult<CallViews> {
    let receiver = receiver
        .map(|raw| HostObject::borrowed(Some(raw), "receiver"))
        .transpose()?;
    let args = HostTuple::from_object(HostObject::borrowed(Some(args), "args")?, "args")?;
    let kwargs = kwargs
        .map(|raw| HostDict::from_object(HostObject::borrowed(Some(raw), "kwargs")?, "kwargs"))
        .transpose()?;
    Ok(CallViews {
        receiver,
        args,
        kwargs,
    })
}

fn invoke(
    function: &NativeFn,
    receiver: RawObject,
    args: ObjectHandle,
    kwargs: RawObject,
) -> BindResult<HostObject> {
    let call = views(receiver, args, kwargs)?;
    function.call(call.receiver.as_ref(), &call.args, call.kwargs.as_ref())
}

/// Host entry point for a native function.
pub fn into_entry(function: NativeFn) -> HostEntry {
    Rc::new(move |receiver: RawObject, args: ObjectHandle, kwargs: RawObject| {
        translate(function.name(), || invoke(&function, receiver, args, kwargs))
    })
}

/// Host entry point dispatching among constructors.
///
/// The first constructor whose signature binds the supplied positional and
/// keyword arguments is called. With a single constructor no selection
/// happens, so keyword arguments and arity errors behave exactly as for a
/// plain function.
pub fn constructor_entry(type_name: &str, constructors: Vec<NativeFn>) -> HostEntry {
    let type_name = type_name.to_owned();
    Rc::new(move |receiver: RawObject, args: ObjectHandle, kwargs: RawObject| {
        translate(&type_name, || {
            let call = views(receiver, args, kwargs)?;
            let chosen = select_overload(&constructors, &call.args, call.kwargs.as_ref())
                .ok_or_else(|| {
                BindError::InvalidRegistration(format!("'{type_name}' has no constructor"))
            })?;
            chosen.call(call.receiver.as_ref(), &call.args, call.kwargs.as_ref())
        })
    })
}

/// First candidate the arguments bind to, else the first candidate (whose
/// binding will report the mismatch).
fn select_overload<'c>(
    candidates: &'c [NativeFn],
    args: &HostTuple,
    kwargs: Option<&HostDict>,
) -> Option<&'c NativeFn> {
    if candidates.len() == 1 {
        return candidates.first();
    }
    candidates
        .iter()
        .find(|candidate| CallContext::bind(candidate.signature(), None, args, kwargs).is_ok())
        .or_else(|| candidates.first())
}

/// Wrap a native function as a host function object.
pub fn function_object(function: NativeFn, doc: &str, flags: CallFlags) -> BindResult<HostObject> {
    let name = function.name().to_owned();
    HostObject::adopted(
        runtime::new_function(&name, doc, flags, into_entry(function)),
        &name,
    )
}

/// A function authored on the host side.
///
/// Models code written in the host language: it receives the raw argument
/// views and reports failures through the host's own error indicator.
pub fn host_function<F>(name: &str, f: F) -> BindResult<HostObject>
where
    F: Fn(&HostTuple, Option<&HostDict>) -> BindResult<HostObject> + 'static,
{
    host_callable(name, CallFlags::POSITIONAL | CallFlags::KEYWORDS, f)
}

/// A method authored on the host side; the receiver arrives as `args[0]`.
pub fn host_method<F>(name: &str, f: F) -> BindResult<HostObject>
where
    F: Fn(&HostTuple, Option<&HostDict>) -> BindResult<HostObject> + 'static,
{
    host_callable(
        name,
        CallFlags::POSITIONAL | CallFlags::KEYWORDS | CallFlags::SELF_IN_ARGS,
        f,
    )
}

fn host_callable<F>(name: &str, flags: CallFlags, f: F) -> BindResult<HostObject>
where
    F: Fn(&HostTuple, Option<&HostDict>) -> BindResult<HostObject> + 'static,
{
    let label = name.to_owned();
    let entry: HostEntry = Rc::new(move |_receiver: RawObject, args: ObjectHandle, kwargs: RawObject| {
        translate(&label, || {
            let call = views(None, args, kwargs)?;
            f(&call.args, call.kwargs.as_ref())
        })
    });
    HostObject::adopted(runtime::new_function(name, "", flags, entry), name)
}

#[cfg(test)]
mod tests {
    use hostbind_core::{ExceptionKind, ToHost};

    use super::*;
    use crate::native_fn::CallableKind;

    fn call(function: &HostObject, args: &HostTuple) -> BindResult<HostObject> {
        function.call(args)
    }

    #[test]
    fn success_returns_new_reference() {
        let f = NativeFn::new("one", CallableKind::Function, 0, |_: &mut CallContext<'_>| {
            1_i64.to_host()
        });
        let object = function_object(f, "", CallFlags::POSITIONAL).unwrap();
        let result = call(&object, &HostTuple::make_empty(0).unwrap()).unwrap();
        assert_eq!(result.ref_count(), 1);
        assert_eq!(result.to_string(), "1");
    }

    #[test]
    fn native_error_becomes_pending_exception() {
        let f = NativeFn::new("fail", CallableKind::Function, 0, |_: &mut CallContext<'_>| -> BindResult<HostObject> {
            Err(BindError::native("it broke"))
        });
        let object = function_object(f, "", CallFlags::POSITIONAL).unwrap();
        let err = call(&object, &HostTuple::make_empty(0).unwrap()).unwrap_err();
        let exception = err.exception().unwrap();
        assert_eq!(exception.kind, ExceptionKind::RuntimeError);
        assert_eq!(exception.message, "it broke");
        assert!(!runtime::err_occurred());
    }

    #[test]
    fn panics_are_caught() {
        let f = NativeFn::new("explode", CallableKind::Function, 0, |_: &mut CallContext<'_>| -> BindResult<HostObject> {
            panic!("kaboom")
        });
        let entry = into_entry(f);
        let args = HostTuple::make_empty(0).unwrap();
        assert!(entry(None, args.as_raw(), None).is_none());
        let pending = runtime::err_fetch().unwrap();
        assert_eq!(pending.kind, ExceptionKind::RuntimeError);
        assert!(pending.message.contains("explode(): kaboom"));
    }

    #[test]
    fn host_errors_pass_through_unchanged() {
        let f = NativeFn::new("lookup", CallableKind::Function, 1, |ctx: &mut CallContext<'_>| {
            ctx.arg::<HostObject>(0)?.getattr("missing")
        });
        let object = function_object(f, "", CallFlags::POSITIONAL).unwrap();
        let args = HostTuple::make((1_i64,)).unwrap();
        let err = call(&object, &args).unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::AttributeError);
    }

    fn overloads() -> Vec<NativeFn> {
        let zero = NativeFn::new("__init__", CallableKind::Constructor, 0, |_: &mut CallContext<'_>| {
            0_i64.to_host()
        });
        let two = NativeFn::new("__init__", CallableKind::Constructor, 2, |ctx: &mut CallContext<'_>| {
            let (x, y) = ctx.args::<(i64, i64)>()?;
            (x * 10 + y).to_host()
        });
        vec![zero, two]
    }

    fn arity_of(candidates: &[NativeFn], args: &HostTuple, kwargs: Option<&HostDict>) -> Option<usize> {
        select_overload(candidates, args, kwargs).map(NativeFn::arity)
    }

    #[test]
    fn constructor_overloads_by_arity() {
        let candidates = overloads();
        let none = HostTuple::make_empty(0).unwrap();
        let two = HostTuple::make((1_i64, 2_i64)).unwrap();
        let five = HostTuple::make((1_i64, 2_i64, 3_i64, 4_i64, 5_i64)).unwrap();
        assert_eq!(arity_of(&candidates, &two, None), Some(2));
        assert_eq!(arity_of(&candidates, &none, None), Some(0));
        assert_eq!(arity_of(&candidates, &five, None), Some(0));
        assert!(select_overload(&[], &none, None).is_none());
    }

    #[test]
    fn constructor_overloads_count_keyword_arguments() {
        let candidates = overloads();
        let one = HostTuple::make((1_i64,)).unwrap();
        let mut kwargs = HostDict::new().unwrap();
        kwargs.set_item("arg2", &2_i64.to_host().unwrap()).unwrap();
        assert_eq!(arity_of(&candidates, &one, Some(&kwargs)), Some(2));

        let entry = constructor_entry("P", candidates);
        let result = entry(None, one.as_raw(), Some(kwargs.as_raw()));
        let result = HostObject::adopted(result, "P").unwrap();
        assert_eq!(result.to_string(), "12");
    }

    #[test]
    fn host_method_receives_self_first() {
        let method = host_method("whoami", |args, _| args.get_item(0)).unwrap();
        let args = HostTuple::make((7_i64,)).unwrap();
        let result = call(&method, &args).unwrap();
        assert_eq!(result.to_string(), "7");
    }
}
