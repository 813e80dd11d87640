use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_class::{
    call_method, get_class, inject_method, is_instance, new_instance, register_native,
    super_call, NativeClass,
};
use strata_engine::{State, Value};

/// Register a chain of `depth` classes, each overriding `speak` through super
fn class_chain(state: &mut State, depth: usize) -> String {
    register_native(
        state,
        NativeClass::new("C0").method("speak", |state| {
            state.push(0)?;
            Ok(1)
        }),
    )
    .unwrap();
    for i in 1..depth {
        let desc = NativeClass::new(&format!("C{}", i))
            .parent(&format!("C{}", i - 1))
            .method("speak", |state| {
                super_call(state, "speak", Some(1))?;
                let n = state.pop()?.as_int().unwrap_or(0);
                state.push(n + 1)?;
                Ok(1)
            });
        register_native(state, desc).unwrap();
    }
    format!("C{}", depth - 1)
}

fn bench_construct(c: &mut Criterion) {
    let mut state = State::new();
    strata_class::open(&mut state);
    register_native(
        &mut state,
        NativeClass::new("Point")
            .alloc(|_| Ok((0.0f64, 0.0f64)))
            .init(|state| {
                let obj = state.arg(1);
                state.new_index(&obj, Value::from("label"), state.arg(2))?;
                Ok(0)
            }),
    )
    .unwrap();

    c.bench_function("construct_point", |b| {
        b.iter(|| new_instance(&mut state, "Point", vec![black_box(Value::from("p"))]).unwrap());
    });
}

fn bench_super_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("super_chain");
    for depth in [1usize, 4, 16] {
        let mut state = State::new();
        strata_class::open(&mut state);
        let leaf = class_chain(&mut state, depth);
        let obj = new_instance(&mut state, &leaf, vec![]).unwrap();

        group.bench_with_input(BenchmarkId::new("speak", depth), &obj, |b, obj| {
            b.iter(|| call_method(&mut state, black_box(obj), "speak", vec![]).unwrap());
        });
    }
    group.finish();
}

fn bench_is_instance(c: &mut Criterion) {
    let mut state = State::new();
    strata_class::open(&mut state);
    let leaf = class_chain(&mut state, 16);
    let obj = new_instance(&mut state, &leaf, vec![]).unwrap();

    c.bench_function("is_instance_root", |b| {
        b.iter(|| is_instance(&state, black_box(&obj), "C0"));
    });
}

fn bench_injected_layers(c: &mut Criterion) {
    let mut state = State::new();
    strata_class::open(&mut state);
    let leaf = class_chain(&mut state, 1);
    let class_obj = get_class(&state, &leaf).unwrap();
    for _ in 0..8 {
        inject_method(&class_obj, "speak", |state, defer| defer.call(state, Some(1))).unwrap();
    }
    let obj = new_instance(&mut state, &leaf, vec![]).unwrap();

    c.bench_function("speak_through_8_injections", |b| {
        b.iter(|| call_method(&mut state, black_box(&obj), "speak", vec![]).unwrap());
    });
}

criterion_group!(
    benches,
    bench_construct,
    bench_super_chain,
    bench_is_instance,
    bench_injected_layers
);
criterion_main!(benches);
