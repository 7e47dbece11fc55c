//! Performance benchmarks for calls across the boundary.
//!
//! - Function calls: positional, keyword, string arguments
//! - Conversions: value copy vs shared holder
//! - Override dispatch from native code into a host subclass
//!
//! ## Profiling with Puffin
//!
//! Run with the `profile-with-puffin` feature to collect per-scope timings:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use std::hint::black_box;
use std::rc::Rc;

use criterion::{Criterion, criterion_group, criterion_main};
use hostbind::prelude::*;
use hostbind::runtime;

#[cfg(feature = "profile-with-puffin")]
use std::collections::HashMap;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

/// Print the accumulated time per top-level scope.
#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    use puffin::Reader;

    let Some(frame_view) = FRAME_VIEW.get() else {
        return;
    };
    let view = frame_view.lock();
    let scope_collection = view.scope_collection();

    let mut scope_timings: HashMap<String, i64> = HashMap::new();
    let mut frame_count = 0i64;
    for frame in view.recent_frames() {
        frame_count += 1;
        let Ok(unpacked) = frame.unpacked() else {
            continue;
        };
        for (_thread_info, stream_info) in unpacked.thread_streams.iter() {
            let reader = Reader::from_start(&stream_info.stream);
            let Ok(scopes) = reader.read_top_scopes() else {
                continue;
            };
            for scope in scopes {
                if let Some(details) = scope_collection.fetch_by_id(&scope.id) {
                    *scope_timings
                        .entry(details.name().to_string())
                        .or_insert(0) += scope.record.duration_ns;
                }
            }
        }
    }

    println!("\n=== Profiling Summary ({frame_count} frames) ===");
    let mut entries: Vec<_> = scope_timings.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    for (name, ns) in entries {
        let avg_ns = if frame_count > 0 { ns / frame_count } else { ns };
        println!(
            "  {name:40} {:>10.2?} avg",
            std::time::Duration::from_nanos(avg_ns as u64)
        );
    }
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

#[derive(Clone)]
struct Payload {
    values: Vec<f64>,
}

impl NativeType for Payload {
    const NAME: &'static str = "Payload";
}

value_semantics!(Payload);

trait Scorer {
    fn score(&self, x: i64) -> BindResult<i64>;
}

impl NativeType for dyn Scorer {
    const NAME: &'static str = "Scorer";
}

struct HostScorer {
    back: BackReference,
}

impl Scorer for HostScorer {
    fn score(&self, x: i64) -> BindResult<i64> {
        self.back.call_override("score", (x,))
    }
}

fn bench_module() -> HostObject {
    let loaded = load_module("bench", "", |m| {
        m.function("add")
            .params(&["x", "y"])
            .register(|x: i64, y: i64| x + y)?;
        m.add_function("concat", |a: String, b: String| a + &b)?;
        m.register_type::<Payload>("Payload").build()?;
        m.add_function("payload_len", |p: Payload| p.values.len())?;
        m.add_function("payload_len_shared", |p: Rc<Payload>| p.values.len())?;
        m.register_type::<dyn Scorer>("Scorer")
            .subclassable()
            .constructor(|proxy: &HostObject| -> Rc<dyn Scorer> {
                Rc::new(HostScorer {
                    back: BackReference::new(proxy),
                })
            })?
            .build()?;
        m.add_function("score", |s: Rc<dyn Scorer>, x: i64| s.score(x))?;
        Ok(())
    });
    HostObject::adopted(loaded, "bench").expect("bench module loads")
}

thread_local! {
    // A native type binds once per runtime.
    static BENCH_MODULE: HostObject = bench_module();
}

fn shared_module() -> HostObject {
    BENCH_MODULE.with(HostObject::clone)
}

fn function_calls(c: &mut Criterion) {
    setup_profiler();
    let module = shared_module();
    let add = module.getattr("add").unwrap();
    let concat = module.getattr("concat").unwrap();

    let mut group = c.benchmark_group("call/functions");

    let args = HostTuple::make((2_i64, 3_i64)).unwrap();
    group.bench_function("add_positional", |b| {
        b.iter(|| {
            let result = add.call(black_box(&args)).unwrap();
            end_profiling_frame();
            black_box(result)
        });
    });

    let one = HostTuple::make((2_i64,)).unwrap();
    let mut kwargs = HostDict::new().unwrap();
    kwargs.set_item("y", &3_i64.to_host().unwrap()).unwrap();
    group.bench_function("add_keyword", |b| {
        b.iter(|| {
            let result = add.call_with_kwargs(black_box(&one), &kwargs).unwrap();
            end_profiling_frame();
            black_box(result)
        });
    });

    let strings = HostTuple::make(("hello, ", "world")).unwrap();
    group.bench_function("concat_strings", |b| {
        b.iter(|| black_box(concat.call(black_box(&strings)).unwrap()));
    });

    group.finish();
    print_profiling_stats();
}

fn conversions(c: &mut Criterion) {
    let module = shared_module();
    let by_value = module.getattr("payload_len").unwrap();
    let shared = module.getattr("payload_len_shared").unwrap();
    let payload = Payload {
        values: vec![1.0; 4096],
    }
    .to_host()
    .unwrap();
    let args = HostTuple::make((payload,)).unwrap();

    let mut group = c.benchmark_group("call/conversions");
    group.bench_function("value_copy", |b| {
        b.iter(|| black_box(by_value.call(black_box(&args)).unwrap()));
    });
    group.bench_function("shared_holder", |b| {
        b.iter(|| black_box(shared.call(black_box(&args)).unwrap()));
    });
    group.finish();
}

fn override_dispatch(c: &mut Criterion) {
    let module = shared_module();
    let scorer = module.getattr("Scorer").unwrap();
    let method = host_method("score", |args, _| {
        let x = i64::from_host(&args.get_item(1)?, "x")?;
        (x * 3).to_host()
    })
    .unwrap();
    let class = HostObject::adopted(
        runtime::define_class("Triple", Some(scorer.as_raw()), &[("score", method.as_raw())]),
        "Triple",
    )
    .unwrap();
    let proxy = class.call(&HostTuple::make(()).unwrap()).unwrap();
    let score = module.getattr("score").unwrap();
    let args = HostTuple::make((proxy, 7_i64)).unwrap();

    let mut group = c.benchmark_group("call/override");
    group.bench_function("host_subclass", |b| {
        b.iter(|| {
            let result = score.call(black_box(&args)).unwrap();
            end_profiling_frame();
            black_box(result)
        });
    });
    group.finish();
    print_profiling_stats();
}

criterion_group!(benches, function_calls, conversions, override_dispatch);
criterion_main!(benches);
