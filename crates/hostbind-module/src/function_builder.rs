//! Options for a module function beyond its docstring.

use hostbind_core::BindResult;
use hostbind_core::runtime::CallFlags;
use hostbind_ffi::IntoNativeFn;

use crate::module::ExtensionModule;

/// Builder for one module-level function.
///
/// Created by [`ExtensionModule::function`]. Functions accept positional and
/// keyword arguments unless made [`positional_only`](Self::positional_only).
pub struct FunctionBuilder<'m> {
    module: &'m mut ExtensionModule,
    name: String,
    doc: String,
    params: Vec<String>,
    flags: CallFlags,
}

impl<'m> FunctionBuilder<'m> {
    pub(crate) fn new(module: &'m mut ExtensionModule, name: &str) -> Self {
        Self {
            module,
            name: name.to_owned(),
            doc: String::new(),
            params: Vec::new(),
            flags: CallFlags::POSITIONAL | CallFlags::KEYWORDS,
        }
    }

    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_owned();
        self
    }

    /// Parameter names, in order, for keyword binding.
    pub fn params(mut self, names: &[&str]) -> Self {
        self.params = names.iter().map(|name| (*name).to_owned()).collect();
        self
    }

    pub fn positional_only(mut self) -> Self {
        self.flags.remove(CallFlags::KEYWORDS);
        self
    }

    /// Adapt `f` and add it to the module.
    pub fn register<F, Args, Ret>(self, f: F) -> BindResult<()>
    where
        F: IntoNativeFn<Args, Ret>,
    {
        self.module.check_open("add_function")?;
        let mut function = f.into_native_fn(&self.name);
        if !self.params.is_empty() {
            let params: Vec<&str> = self.params.iter().map(String::as_str).collect();
            function = function.with_params(&params)?;
        }
        self.module.push_function(function, self.doc, self.flags)
    }
}
