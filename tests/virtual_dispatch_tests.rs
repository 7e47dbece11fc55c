//! Host classes overriding a native trait, and native code calling those
//! overrides through a back-reference.

use std::cell::RefCell;
use std::rc::Rc;

use hostbind::prelude::*;
use hostbind::runtime;

trait Base {
    fn f(&self, x: i64) -> BindResult<i64>;

    fn describe(&self) -> String {
        "a Base".to_owned()
    }
}

impl NativeType for dyn Base {
    const NAME: &'static str = "Base";
}

struct Doubler;

impl Base for Doubler {
    fn f(&self, x: i64) -> BindResult<i64> {
        Ok(x * 2)
    }

    fn describe(&self) -> String {
        "a Doubler".to_owned()
    }
}

/// Native side of a host subclass: forwards `f` to the host override.
struct HostBase {
    back: BackReference,
}

impl Base for HostBase {
    fn f(&self, x: i64) -> BindResult<i64> {
        self.back.call_override("f", (x,))
    }
}

struct Fixture {
    module: HostObject,
    base: HostObject,
}

impl Fixture {
    fn new() -> Self {
        let global: Rc<RefCell<Option<Rc<dyn Base>>>> = Rc::default();
        let store = Rc::clone(&global);
        let load = Rc::clone(&global);
        let describe = Rc::clone(&global);

        let loaded = load_module("dispatch", "", move |m| {
            m.register_type::<dyn Base>("Base")
                .doc("Subclass me and define f(x)")
                .subclassable()
                .constructor(|proxy: &HostObject| -> Rc<dyn Base> {
                    Rc::new(HostBase {
                        back: BackReference::new(proxy),
                    })
                })?
                .build()?;
            m.add_function("call_f", |b: Rc<dyn Base>, x: i64| b.f(x))?;
            m.add_function("make_doubler", || -> Rc<dyn Base> { Rc::new(Doubler) })?;
            m.add_function("set_global", move |b: Rc<dyn Base>| {
                *store.borrow_mut() = Some(b);
            })?;
            m.add_function("call_global", move |x: i64| -> BindResult<i64> {
                let base = load.borrow().clone();
                match base {
                    Some(base) => base.f(x),
                    None => Err(BindError::native("no global base")),
                }
            })?;
            m.add_function("describe_global", move || {
                describe.borrow().as_ref().map(|b| b.describe())
            })?;
            Ok(())
        });
        let module = HostObject::adopted(loaded, "dispatch").unwrap();
        let base = module.getattr("Base").unwrap();
        Self { module, base }
    }

    fn call(&self, name: &str, args: impl IntoHostTuple) -> BindResult<HostObject> {
        self.module.getattr(name)?.call(&HostTuple::make(args)?)
    }

    /// `class <name>(Base)` with the given overrides.
    fn subclass(&self, name: &str, attrs: &[(&str, &HostObject)]) -> HostObject {
        let raw: Vec<(&str, hostbind::ObjectHandle)> = attrs
            .iter()
            .map(|(name, attr)| (*name, attr.as_raw()))
            .collect();
        HostObject::adopted(
            runtime::define_class(name, Some(self.base.as_raw()), &raw),
            name,
        )
        .unwrap()
    }

    fn plus(&self, name: &str, offset: i64) -> HostObject {
        let f = host_method("f", move |args, _| {
            let x = i64::from_host(&args.get_item(1)?, "x")?;
            (x + offset).to_host()
        })
        .unwrap();
        let class = self.subclass(name, &[("f", &f)]);
        class.call(&HostTuple::make(()).unwrap()).unwrap()
    }
}

fn as_int(object: &HostObject) -> i64 {
    i64::from_host(object, "result").unwrap()
}

// =============================================================================
// Dispatch
// =============================================================================

#[test]
fn test_native_implementation() {
    let fx = Fixture::new();
    let doubler = fx.call("make_doubler", ()).unwrap();
    assert_eq!(doubler.type_name(), "Base");
    assert_eq!(as_int(&fx.call("call_f", (doubler, 21_i64)).unwrap()), 42);
}

#[test]
fn test_host_override_is_called() {
    let fx = Fixture::new();
    let derived = fx.plus("Derived", 100);
    let base = HostType::from_object(fx.base.clone(), "Base").unwrap();
    assert!(base.is_instance(&derived));
    let result = fx.call("call_f", (derived.clone(), 1_i64)).unwrap();
    assert_eq!(as_int(&result), 101);
    assert_eq!(derived.ref_count(), 1);
}

#[test]
fn test_missing_override() {
    let fx = Fixture::new();
    let empty = fx.subclass("Empty", &[]);
    let proxy = empty.call(&HostTuple::make(()).unwrap()).unwrap();
    let err = fx.call("call_f", (proxy, 1_i64)).unwrap_err();
    let exception = err.exception().unwrap();
    assert_eq!(exception.kind, ExceptionKind::NotImplementedError);
    assert_eq!(
        exception.message,
        "f(): pure virtual, but not defined in subclass"
    );
}

#[test]
fn test_base_itself_has_no_override() {
    let fx = Fixture::new();
    let plain = fx.base.call(&HostTuple::make(()).unwrap()).unwrap();
    let err = fx.call("call_f", (plain, 1_i64)).unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::NotImplementedError);
}

#[test]
fn test_instance_attribute_override() {
    let fx = Fixture::new();
    let empty = fx.subclass("Patched", &[]);
    let proxy = empty.call(&HostTuple::make(()).unwrap()).unwrap();
    let f = host_function("f", |args, _| {
        let x = i64::from_host(&args.get_item(0)?, "x")?;
        (-x).to_host()
    })
    .unwrap();
    proxy.setattr("f", &f).unwrap();
    assert_eq!(as_int(&fx.call("call_f", (proxy, 5_i64)).unwrap()), -5);
}

#[test]
fn test_override_can_call_back_into_native_code() {
    let fx = Fixture::new();
    let module = fx.module.clone();
    let f = host_method("f", move |args, _| {
        let doubler = module.getattr("make_doubler")?.call(&HostTuple::make(())?)?;
        let doubled = module
            .getattr("call_f")?
            .call(&HostTuple::make((doubler, args.get_item(1)?))?)?;
        (i64::from_host(&doubled, "doubled")? + 1).to_host()
    })
    .unwrap();
    let class = fx.subclass("Nested", &[("f", &f)]);
    let proxy = class.call(&HostTuple::make(()).unwrap()).unwrap();
    assert_eq!(as_int(&fx.call("call_f", (proxy, 10_i64)).unwrap()), 21);
}

#[test]
fn test_override_errors_propagate() {
    let fx = Fixture::new();
    let f = host_method("f", |_, _| -> BindResult<HostObject> {
        runtime::err_set(ExceptionKind::ValueError, "bad input");
        Err(BindError::host_error(Some("f")))
    })
    .unwrap();
    let class = fx.subclass("Raising", &[("f", &f)]);
    let proxy = class.call(&HostTuple::make(()).unwrap()).unwrap();
    let err = fx.call("call_f", (proxy, 1_i64)).unwrap_err();
    let exception = err.exception().unwrap();
    assert_eq!(exception.kind, ExceptionKind::ValueError);
    assert_eq!(exception.message, "bad input");
}

#[test]
fn test_override_result_type_mismatch() {
    let fx = Fixture::new();
    let f = host_method("f", |_, _| "not an int".to_host()).unwrap();
    let class = fx.subclass("Stringy", &[("f", &f)]);
    let proxy = class.call(&HostTuple::make(()).unwrap()).unwrap();
    let err = fx.call("call_f", (proxy, 1_i64)).unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::TypeError);
    assert!(err.to_string().contains("f() override result"));
}

// =============================================================================
// Native code holding a base across calls
// =============================================================================

#[test]
fn test_global_base_while_proxy_lives() {
    let fx = Fixture::new();
    let derived = fx.plus("Derived", 1);
    fx.call("set_global", (derived.clone(),)).unwrap();
    assert_eq!(as_int(&fx.call("call_global", (41_i64,)).unwrap()), 42);
}

#[test]
fn test_global_base_after_proxy_is_destroyed() {
    let fx = Fixture::new();
    let derived = fx.plus("Derived", 1);
    fx.call("set_global", (derived.clone(),)).unwrap();
    drop(derived);

    let err = fx.call("call_global", (1_i64,)).unwrap_err();
    let exception = err.exception().unwrap();
    assert_eq!(exception.kind, ExceptionKind::ReferenceError);
    assert!(exception.message.contains("expired"));

    // Non-virtual parts still work on the detached native object.
    let described = fx.call("describe_global", ()).unwrap();
    assert_eq!(described.to_string(), "a Base");
}

#[test]
fn test_global_base_without_proxy() {
    let fx = Fixture::new();
    let err = fx.call("call_global", (1_i64,)).unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::RuntimeError);

    let doubler = fx.call("make_doubler", ()).unwrap();
    fx.call("set_global", (doubler,)).unwrap();
    assert_eq!(as_int(&fx.call("call_global", (4_i64,)).unwrap()), 8);
    assert_eq!(fx.call("describe_global", ()).unwrap().to_string(), "a Doubler");
}
