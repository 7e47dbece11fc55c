//! Type-erased native callables and their call context.
//!
//! A [`NativeFn`] stores any callable implementing [`NativeCallable`] behind a
//! uniform interface, together with the [`Signature`] used to bind host
//! arguments. Calling it binds the host's positional and keyword arguments
//! into a [`CallContext`], from which the callable pulls typed arguments.

use std::fmt;
use std::rc::Rc;

use hostbind_core::{
    BindError, BindResult, DictKey, FromHost, HostDict, HostObject, HostTuple, NativeType,
    TypeHash, shared_from_host,
};

/// What a callable is registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    Function,
    Method,
    Constructor,
}

/// Declared name and parameter list of a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub kind: CallableKind,
    /// Parameter names, in positional order. Keyword arguments bind by these.
    pub params: Vec<String>,
}

impl Signature {
    /// A signature with placeholder parameter names `arg1..argN`.
    pub fn new(name: impl Into<String>, kind: CallableKind, arity: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            params: (1..=arity).map(|i| format!("arg{i}")).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Type-erased native function.
///
/// The inner callable is shared through `Rc`, so clones are cheap and call
/// the same implementation.
#[derive(Clone)]
pub struct NativeFn {
    id: TypeHash,
    signature: Rc<Signature>,
    inner: Rc<dyn NativeCallable>,
}

impl NativeFn {
    pub fn new<F>(name: &str, kind: CallableKind, arity: usize, f: F) -> Self
    where
        F: NativeCallable + 'static,
    {
        Self {
            id: TypeHash::from_function(name),
            signature: Rc::new(Signature::new(name, kind, arity)),
            inner: Rc::new(f),
        }
    }

    /// Name the parameters so they can be passed by keyword.
    ///
    /// The list must match the arity and contain no duplicates.
    pub fn with_params(mut self, params: &[&str]) -> BindResult<Self> {
        let signature = &self.signature;
        if params.len() != signature.arity() {
            return Err(BindError::InvalidRegistration(format!(
                "{}() takes {} parameters but {} names were given",
                signature.name,
                signature.arity(),
                params.len()
            )));
        }
        for (i, param) in params.iter().enumerate() {
            if param.is_empty() {
                return Err(BindError::InvalidRegistration(format!(
                    "{}(): parameter {} has an empty name",
                    signature.name,
                    i + 1
                )));
            }
            if params[..i].contains(param) {
                return Err(BindError::InvalidRegistration(format!(
                    "{}(): duplicate parameter name '{param}'",
                    signature.name
                )));
            }
        }
        let mut renamed = (*self.signature).clone();
        renamed.params = params.iter().map(|p| (*p).to_owned()).collect();
        self.signature = Rc::new(renamed);
        Ok(self)
    }

    pub fn id(&self) -> TypeHash {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn arity(&self) -> usize {
        self.signature.arity()
    }

    /// Bind the host arguments and call the function.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(
        &self,
        receiver: Option<&HostObject>,
        args: &HostTuple,
        kwargs: Option<&HostDict>,
    ) -> BindResult<HostObject> {
        let mut ctx = CallContext::bind(&self.signature, receiver, args, kwargs)?;
        self.inner.call(&mut ctx)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Trait for callable native functions.
///
/// The callable pulls its arguments from the [`CallContext`] and returns
/// the host result.
pub trait NativeCallable {
    fn call(&self, ctx: &mut CallContext<'_>) -> BindResult<HostObject>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut CallContext<'_>) -> BindResult<HostObject>,
{
    fn call(&self, ctx: &mut CallContext<'_>) -> BindResult<HostObject> {
        (self)(ctx)
    }
}

/// Arguments of one call, bound to a signature.
pub struct CallContext<'a> {
    signature: &'a Signature,
    receiver: Option<&'a HostObject>,
    args: Vec<HostObject>,
}

impl<'a> CallContext<'a> {
    /// Bind positional and keyword arguments to the parameters of `signature`.
    ///
    /// Without keywords the positional count must equal the arity exactly.
    /// With keywords, positionals fill the leading parameters and each
    /// keyword fills the parameter of the same name; every parameter must
    /// end up with exactly one value.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn bind(
        signature: &'a Signature,
        receiver: Option<&'a HostObject>,
        args: &HostTuple,
        kwargs: Option<&HostDict>,
    ) -> BindResult<Self> {
        let positional = args.items()?;
        let arity = signature.arity();
        let keywords = match kwargs {
            Some(kwargs) if !kwargs.is_empty() => kwargs.items()?,
            _ => Vec::new(),
        };
        let arity_mismatch = |actual| BindError::ArityMismatch {
            function: signature.name.clone(),
            expected: arity,
            actual,
        };

        if keywords.is_empty() {
            if positional.len() != arity {
                return Err(arity_mismatch(positional.len()));
            }
            return Ok(Self {
                signature,
                receiver,
                args: positional,
            });
        }
        if positional.len() > arity {
            return Err(arity_mismatch(positional.len()));
        }

        let mut slots: Vec<Option<HostObject>> = positional.into_iter().map(Some).collect();
        slots.resize_with(arity, || None);
        for (key, value) in keywords {
            let name = match key {
                DictKey::Str(name) => name,
                other => {
                    return Err(BindError::type_mismatch(
                        "str keyword",
                        other.to_string(),
                        Some(&format!("{}()", signature.name)),
                    ));
                }
            };
            let pos = signature
                .params
                .iter()
                .position(|param| *param == name)
                .ok_or_else(|| BindError::UnexpectedKeyword {
                    function: signature.name.clone(),
                    name: name.clone(),
                })?;
            if slots[pos].is_some() {
                return Err(BindError::DuplicateArgument {
                    function: signature.name.clone(),
                    name,
                });
            }
            slots[pos] = Some(value);
        }

        let args = slots
            .into_iter()
            .zip(&signature.params)
            .map(|(slot, param)| {
                slot.ok_or_else(|| BindError::MissingArgument {
                    function: signature.name.clone(),
                    name: param.clone(),
                })
            })
            .collect::<BindResult<Vec<_>>>()?;
        Ok(Self {
            signature,
            receiver,
            args,
        })
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn arg_object(&self, index: usize) -> BindResult<&HostObject> {
        self.args.get(index).ok_or_else(|| {
            BindError::native(format!(
                "{}() has no argument {}",
                self.signature.name,
                index + 1
            ))
        })
    }

    /// Convert argument `index` (zero-based) to `T`.
    pub fn arg<T: FromHost>(&self, index: usize) -> BindResult<T> {
        let obj = self.arg_object(index)?;
        T::from_host(obj, &self.arg_location(index))
    }

    /// Convert all arguments at once.
    pub fn args<Args: FromCallArgs>(&self) -> BindResult<Args> {
        Args::from_call_args(self)
    }

    fn arg_location(&self, index: usize) -> String {
        format!("{}() argument {}", self.signature.name, index + 1)
    }

    /// The object the callable was invoked on.
    pub fn receiver(&self) -> BindResult<&HostObject> {
        self.receiver.ok_or_else(|| {
            BindError::type_mismatch(
                "bound instance",
                "no receiver",
                Some(&format!("{}()", self.signature.name)),
            )
        })
    }

    /// The native object held by the receiver.
    pub fn this<T: NativeType + ?Sized>(&self) -> BindResult<Rc<T>> {
        let receiver = self.receiver()?;
        shared_from_host(receiver, &format!("{}() receiver", self.signature.name))
    }
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("function", &self.signature.name)
            .field("arg_count", &self.args.len())
            .field("has_receiver", &self.receiver.is_some())
            .finish()
    }
}

/// A tuple of native argument types that can be pulled from a context.
pub trait FromCallArgs: Sized {
    fn from_call_args(ctx: &CallContext<'_>) -> BindResult<Self>;
}

macro_rules! impl_from_call_args {
    ($($arg:ident : $idx:tt),*) => {
        impl<$($arg: FromHost),*> FromCallArgs for ($($arg,)*) {
            #[allow(unused_variables)]
            fn from_call_args(ctx: &CallContext<'_>) -> BindResult<Self> {
                Ok(($(ctx.arg::<$arg>($idx)?,)*))
            }
        }
    };
}

impl_from_call_args!();
impl_from_call_args!(A: 0);
impl_from_call_args!(A: 0, B: 1);
impl_from_call_args!(A: 0, B: 1, C: 2);
impl_from_call_args!(A: 0, B: 1, C: 2, D: 3);
impl_from_call_args!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_from_call_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_from_call_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_from_call_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

#[cfg(test)]
mod tests {
    use hostbind_core::{ExceptionKind, ToHost};

    use super::*;

    fn sum_fn() -> NativeFn {
        NativeFn::new("sum", CallableKind::Function, 2, |ctx: &mut CallContext<'_>| {
            let (x, y) = ctx.args::<(i64, i64)>()?;
            (x + y).to_host()
        })
    }

    fn kwargs(pairs: &[(&str, i64)]) -> HostDict {
        let mut dict = HostDict::new().unwrap();
        for (key, value) in pairs {
            dict.set_item(*key, &value.to_host().unwrap()).unwrap();
        }
        dict
    }

    #[test]
    fn positional_call() {
        let args = HostTuple::make((2_i64, 3_i64)).unwrap();
        let result = sum_fn().call(None, &args, None).unwrap();
        assert_eq!(result.to_string(), "5");
    }

    #[test]
    fn arity_mismatch() {
        let args = HostTuple::make((2_i64,)).unwrap();
        let err = sum_fn().call(None, &args, None).unwrap_err();
        assert!(matches!(
            err,
            BindError::ArityMismatch { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn argument_type_mismatch_names_position() {
        let args = HostTuple::make((2_i64, "three")).unwrap();
        let err = sum_fn().call(None, &args, None).unwrap_err();
        assert!(err.to_string().contains("sum() argument 2"));
        assert_eq!(err.kind(), ExceptionKind::TypeError);
    }

    #[test]
    fn keywords_fill_named_params() {
        let f = sum_fn().with_params(&["x", "y"]).unwrap();
        let args = HostTuple::make((10_i64,)).unwrap();
        let result = f.call(None, &args, Some(&kwargs(&[("y", 5)]))).unwrap();
        assert_eq!(result.to_string(), "15");
    }

    #[test]
    fn missing_argument_after_keywords() {
        let f = sum_fn().with_params(&["x", "y"]).unwrap();
        let args = HostTuple::make_empty(0).unwrap();
        let err = f.call(None, &args, Some(&kwargs(&[("x", 1)]))).unwrap_err();
        assert_eq!(
            err,
            BindError::MissingArgument {
                function: "sum".into(),
                name: "y".into()
            }
        );
    }

    #[test]
    fn unexpected_and_duplicate_keywords() {
        let f = sum_fn().with_params(&["x", "y"]).unwrap();
        let args = HostTuple::make((1_i64,)).unwrap();
        let err = f.call(None, &args, Some(&kwargs(&[("z", 1)]))).unwrap_err();
        assert!(matches!(err, BindError::UnexpectedKeyword { .. }));
        let err = f.call(None, &args, Some(&kwargs(&[("x", 1)]))).unwrap_err();
        assert!(matches!(err, BindError::DuplicateArgument { .. }));
    }

    #[test]
    fn empty_kwargs_behave_like_none() {
        let args = HostTuple::make((1_i64, 2_i64)).unwrap();
        let empty = HostDict::new().unwrap();
        let result = sum_fn().call(None, &args, Some(&empty)).unwrap();
        assert_eq!(result.to_string(), "3");
    }

    #[test]
    fn with_params_validates_names() {
        assert!(sum_fn().with_params(&["x"]).is_err());
        assert!(sum_fn().with_params(&["x", "x"]).is_err());
        assert!(sum_fn().with_params(&["x", ""]).is_err());
        let f = sum_fn().with_params(&["a", "b"]).unwrap();
        assert_eq!(f.signature().params, vec!["a", "b"]);
    }

    #[test]
    fn default_param_names() {
        let sig = Signature::new("f", CallableKind::Function, 2);
        assert_eq!(sig.params, vec!["arg1", "arg2"]);
        assert_eq!(sig.arity(), 2);
    }

    #[test]
    fn missing_receiver() {
        let f = NativeFn::new("get", CallableKind::Method, 0, |ctx: &mut CallContext<'_>| {
            ctx.receiver().cloned()
        });
        let args = HostTuple::make_empty(0).unwrap();
        let err = f.call(None, &args, None).unwrap_err();
        assert!(err.to_string().contains("no receiver"));
    }
}
