//! Non-owning link from a native object to its host proxy.
//!
//! A host-side subclass of a bound trait type is backed by a native
//! "trampoline" object that implements the trait by calling back into the
//! host. The trampoline lives inside the proxy's native storage, so it must
//! not own the proxy: a [`BackReference`] is a weak handle that is checked on
//! every use.

use hostbind_core::runtime;
use hostbind_core::{BindError, BindResult, FromHost, HostObject, IntoHostTuple, WeakHandle};

#[derive(Clone, Copy, Debug)]
pub struct BackReference {
    proxy: WeakHandle,
}

impl BackReference {
    pub fn new(proxy: &HostObject) -> Self {
        Self {
            proxy: proxy.downgrade(),
        }
    }

    /// True once the proxy has been freed.
    pub fn is_expired(&self) -> bool {
        runtime::is_expired(self.proxy)
    }

    pub fn upgrade(&self) -> Option<HostObject> {
        HostObject::upgrade(self.proxy)
    }

    /// Call the host override of `method` and convert its result.
    ///
    /// Fails with [`BindError::DanglingOverrideReference`] if the proxy is
    /// gone and [`BindError::OverrideNotFound`] if no host class in the
    /// proxy's type chain defines `method`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_override<R, A>(&self, method: &str, args: A) -> BindResult<R>
    where
        R: FromHost,
        A: IntoHostTuple,
    {
        let proxy = self
            .upgrade()
            .ok_or_else(|| BindError::DanglingOverrideReference {
                method: method.to_owned(),
            })?;
        let callable = runtime::lookup_override(proxy.as_raw(), method).ok_or_else(|| {
            BindError::OverrideNotFound {
                method: method.to_owned(),
            }
        })?;
        let callable = HostObject::adopted(Some(callable), method)?;
        let args = args.into_host_tuple()?;
        let result = callable.call(&args)?;
        R::from_host(&result, &format!("{method}() override result"))
    }
}
