//! Native classes bound as host types: the value and shared-holder
//! conversion idioms, object identity, and type introspection.

use std::cell::Cell;
use std::rc::Rc;

use hostbind::prelude::*;
use hostbind::{ArrayData, runtime};

thread_local! {
    static CLONES: Cell<usize> = const { Cell::new(0) };
}

fn clones() -> usize {
    CLONES.with(Cell::get)
}

/// A value type that counts its copies.
#[derive(Debug, PartialEq)]
struct Sample {
    id: i64,
    label: String,
}

impl Clone for Sample {
    fn clone(&self) -> Self {
        CLONES.with(|c| c.set(c.get() + 1));
        Self {
            id: self.id,
            label: self.label.clone(),
        }
    }
}

impl NativeType for Sample {
    const NAME: &'static str = "Sample";
}

value_semantics!(Sample);

/// Never registered with any module.
struct Orphan;

impl NativeType for Orphan {
    const NAME: &'static str = "Orphan";
}

fn samples_module() -> HostObject {
    let loaded = load_module("samples", "", |m| {
        m.register_type::<Sample>("Sample")
            .doc("A labelled sample")
            .constructor(|_: &HostObject, id: i64, label: String| {
                Rc::new(Sample { id, label })
            })?
            .method("id", |s: &Sample| s.id)?
            .method("relabel", |s: &Sample, label: String| Sample {
                id: s.id,
                label,
            })?
            .build()?;
        m.add_function("echo_value", |s: Sample| s)?;
        m.add_function("echo_shared", |s: Rc<Sample>| s)?;
        m.add_function("same_object", |a: Rc<Sample>, b: Rc<Sample>| Rc::ptr_eq(&a, &b))?;
        m.add_function("get_basicsize", |ty: HostType| ty.basicsize())?;
        m.add_function("array_sum", |a: ArrayData| a.data().iter().sum::<f64>())?;
        m.add_function("identity_matrix", |n: usize| -> BindResult<ArrayData> {
            let mut data = vec![0.0; n * n];
            for i in 0..n {
                data[i * n + i] = 1.0;
            }
            ArrayData::new(vec![n, n], data)
                .ok_or_else(|| BindError::native("shape does not match data"))
        })?;
        Ok(())
    });
    HostObject::adopted(loaded, "samples").unwrap()
}

fn call(module: &HostObject, name: &str, args: impl IntoHostTuple) -> BindResult<HostObject> {
    module.getattr(name)?.call(&HostTuple::make(args)?)
}

// =============================================================================
// Value idiom
// =============================================================================

#[test]
fn test_value_round_trip_is_equal() {
    let _module = samples_module();
    let original = Sample {
        id: 7,
        label: "seven".to_owned(),
    };
    let object = (&original).to_host().unwrap();
    let back = Sample::from_host(&object, "sample").unwrap();
    assert_eq!(back, original);
}

#[test]
fn test_value_conversion_copy_counts() {
    let _module = samples_module();
    let original = Sample {
        id: 1,
        label: "one".to_owned(),
    };

    let before = clones();
    let object = (&original).to_host().unwrap();
    assert_eq!(clones() - before, 1, "to_host(&T) copies once");

    let before = clones();
    let _moved = original.clone().to_host().unwrap();
    assert_eq!(clones() - before, 1, "only the explicit clone");

    let before = clones();
    let _extracted = Sample::from_host(&object, "sample").unwrap();
    assert_eq!(clones() - before, 1, "from_host copies once");

    let before = clones();
    let _shared = Rc::<Sample>::from_host(&object, "sample").unwrap();
    assert_eq!(clones(), before, "shared extraction never copies");
}

#[test]
fn test_value_argument_is_a_copy() {
    let module = samples_module();
    let ty = module.getattr("Sample").unwrap();
    let object = ty.call(&HostTuple::make((3_i64, "three")).unwrap()).unwrap();
    let echoed = call(&module, "echo_value", (object.clone(),)).unwrap();
    assert!(!echoed.is(&object));
    let same = call(&module, "same_object", (object.clone(), echoed)).unwrap();
    assert!(!bool::from_host(&same, "same").unwrap());
}

// =============================================================================
// Shared idiom
// =============================================================================

#[test]
fn test_shared_round_trip_preserves_identity() {
    let _module = samples_module();
    let shared = Rc::new(Sample {
        id: 2,
        label: "two".to_owned(),
    });
    let before = clones();
    let object = Rc::clone(&shared).to_host().unwrap();
    let back = Rc::<Sample>::from_host(&object, "sample").unwrap();
    assert!(Rc::ptr_eq(&shared, &back));
    assert_eq!(clones(), before);
    assert_eq!(Rc::strong_count(&shared), 3);

    drop(object);
    assert_eq!(Rc::strong_count(&shared), 2);
}

#[test]
fn test_shared_argument_is_the_same_native_object() {
    let module = samples_module();
    let ty = module.getattr("Sample").unwrap();
    let object = ty.call(&HostTuple::make((4_i64, "four")).unwrap()).unwrap();
    let echoed = call(&module, "echo_shared", (object.clone(),)).unwrap();
    let same = call(&module, "same_object", (object, echoed)).unwrap();
    assert!(bool::from_host(&same, "same").unwrap());
}

#[test]
fn test_methods_see_native_state() {
    let module = samples_module();
    let ty = module.getattr("Sample").unwrap();
    let object = ty.call(&HostTuple::make((9_i64, "nine")).unwrap()).unwrap();
    let id = object
        .getattr("id")
        .unwrap()
        .call(&HostTuple::make(()).unwrap())
        .unwrap();
    assert_eq!(i64::from_host(&id, "id").unwrap(), 9);

    let relabelled = object
        .getattr("relabel")
        .unwrap()
        .call(&HostTuple::make(("NINE",)).unwrap())
        .unwrap();
    assert_eq!(
        Sample::from_host(&relabelled, "relabel").unwrap(),
        Sample {
            id: 9,
            label: "NINE".to_owned()
        }
    );
}

// =============================================================================
// Failure modes
// =============================================================================

#[test]
fn test_wrong_instance_type_is_type_mismatch() {
    let module = samples_module();
    let err = call(&module, "echo_shared", (5_i64,)).unwrap_err();
    let exception = err.exception().unwrap();
    assert_eq!(exception.kind, ExceptionKind::TypeError);
    assert!(exception.message.contains("expected Sample, got int"));
}

#[test]
fn test_unregistered_type_fails() {
    let err = Rc::new(Orphan).to_host().unwrap_err();
    assert_eq!(
        err,
        BindError::UnregisteredType {
            type_name: "Orphan".to_owned()
        }
    );
}

#[test]
fn test_binding_a_type_twice_fails_and_keeps_the_first() {
    let module = samples_module();
    let ty = module.getattr("Sample").unwrap();
    let object = ty.call(&HostTuple::make((5_i64, "five")).unwrap()).unwrap();

    let loaded = load_module("more_samples", "", |m| {
        m.register_type::<Sample>("Sample2").build()?;
        Ok(())
    });
    assert!(loaded.is_none());
    let pending = runtime::err_fetch().unwrap();
    assert_eq!(pending.kind, ExceptionKind::RuntimeError);
    assert!(pending.message.contains("already bound as 'Sample'"));

    let back = Sample::from_host(&object, "sample").unwrap();
    assert_eq!(back.id, 5);
}

#[test]
fn test_constructor_argument_errors() {
    let module = samples_module();
    let ty = module.getattr("Sample").unwrap();
    let err = ty.call(&HostTuple::make((1_i64,)).unwrap()).unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::TypeError);
    let err = ty.call(&HostTuple::make(("x", "y")).unwrap()).unwrap_err();
    assert!(err.to_string().contains("expected int, got str"));
}

// =============================================================================
// Introspection
// =============================================================================

#[test]
fn test_type_object_description() {
    let module = samples_module();
    let ty = HostType::from_object(module.getattr("Sample").unwrap(), "Sample").unwrap();
    assert_eq!(ty.name(), "Sample");
    assert_eq!(ty.doc(), "A labelled sample");
    assert!(!ty.flags().contains(TypeFlags::BASETYPE));
    assert_eq!(ty.to_string(), "<class 'Sample'>");

    let instance = ty.call(&HostTuple::make((1_i64, "a")).unwrap()).unwrap();
    assert!(ty.is_instance(&instance));
    assert_eq!(instance.type_name(), "Sample");
    assert_eq!(instance.to_string(), "<Sample object>");
}

#[test]
fn test_get_basicsize() {
    let module = samples_module();
    let ty = module.getattr("Sample").unwrap();
    let size = call(&module, "get_basicsize", (ty.clone(),)).unwrap();
    assert_eq!(
        usize::from_host(&size, "size").unwrap(),
        std::mem::size_of::<Rc<Sample>>()
    );

    let instance = ty.call(&HostTuple::make((1_i64, "a")).unwrap()).unwrap();
    let err = call(&module, "get_basicsize", (instance,)).unwrap_err();
    assert_eq!(err.kind(), ExceptionKind::TypeError);
    assert!(call(&module, "get_basicsize", (1_i64,)).is_err());
}

#[test]
fn test_array_conversions() {
    let module = samples_module();
    let matrix = call(&module, "identity_matrix", (3_i64,)).unwrap();
    assert!(matrix.is_array());
    assert_eq!(matrix.to_string(), "array(shape=(3, 3))");
    let data = ArrayData::from_host(&matrix, "matrix").unwrap();
    assert_eq!(data.shape(), &[3, 3]);
    assert_eq!(data.ndim(), 2);

    let sum = call(&module, "array_sum", (matrix,)).unwrap();
    assert_eq!(f64::from_host(&sum, "sum").unwrap(), 3.0);
    assert!(!runtime::err_occurred());
}
