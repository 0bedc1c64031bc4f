//! Benchmarks for the hot paths of the type graph.
//!
//! - Instance cache hits for simple and nested generic instances
//! - First-time instantiation of fresh templates
//! - Namespace resolution with a warm cache
//! - Structural equivalence of deep constructed types

extern crate cilgraph;

use cilgraph::prelude::*;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn setup() -> (ModuleRc, TypeNodeRc, TypeNodeRc) {
    let context = TypeContext::new();
    let corlib = Module::core_library(&context);
    let app = Module::new(&context, "App");
    app.add_reference(&corlib);

    let list = TypeBuilder::new(app.clone())
        .class("App", "List`1", TypeFlags::PUBLIC)
        .and_then(|builder| builder.generic_parameters(&["T"]))
        .and_then(|builder| builder.build())
        .unwrap();
    let int32 = app.resolve("System", "Int32").unwrap();
    (app, list, int32)
}

/// Repeated request of `List<Int32>`.
fn bench_instance_cache_hit(c: &mut Criterion) {
    let (app, list, int32) = setup();
    let arguments = [int32];
    app.instantiate(&list, &arguments);

    c.bench_function("instance_cache_hit", |b| {
        b.iter(|| black_box(app.instantiate(black_box(&list), black_box(&arguments))));
    });
}

/// Repeated request of `Outer<Int32>.Inner<Int32>`.
fn bench_nested_instance_cache_hit(c: &mut Criterion) {
    let (app, _, int32) = setup();
    let outer = TypeBuilder::new(app.clone())
        .class("App", "Outer`1", TypeFlags::PUBLIC)
        .and_then(|builder| builder.generic_parameters(&["A"]))
        .and_then(|builder| builder.build())
        .unwrap();
    let inner = TypeBuilder::new(app.clone())
        .nested(&outer, TypeKind::Class, "Inner`1", TypeFlags::NESTED_PUBLIC)
        .and_then(|builder| builder.generic_parameters(&["B"]))
        .and_then(|builder| builder.build())
        .unwrap();
    let arguments = [int32.clone(), int32];
    app.instantiate(&inner, &arguments);

    c.bench_function("nested_instance_cache_hit", |b| {
        b.iter(|| black_box(app.instantiate(black_box(&inner), black_box(&arguments))));
    });
}

/// `List<T[]>` over a fresh array element every iteration.
fn bench_instance_miss(c: &mut Criterion) {
    let (app, list, int32) = setup();
    let mut element = int32;

    c.bench_function("instance_miss", |b| {
        b.iter(|| {
            element = app.szarray_of(&element);
            black_box(app.instantiate(&list, std::slice::from_ref(&element)))
        });
    });
}

/// Warm resolution of a core library type from a referencing module.
fn bench_resolve(c: &mut Criterion) {
    let (app, _, _) = setup();
    app.resolve("System", "Int32");

    c.bench_function("resolve_cached", |b| {
        b.iter(|| black_box(app.resolve(black_box("System"), black_box("Int32"))));
    });
}

/// Equivalence of two independently built `Int32[][][]*&` chains.
fn bench_equivalence(c: &mut Criterion) {
    let (app, _, int32) = setup();
    let other = Module::new(app.context(), "Other");
    let build = |module: &ModuleRc| {
        let mut ty = int32.clone();
        for _ in 0..3 {
            ty = module.szarray_of(&ty);
        }
        module.reference_to(&module.pointer_to(&ty))
    };
    let first = build(&app);
    let second = build(&other);

    c.bench_function("equivalent_constructed", |b| {
        b.iter(|| black_box(equivalent(black_box(&first), black_box(&second))));
    });
}

criterion_group!(
    benches,
    bench_instance_cache_hit,
    bench_nested_instance_cache_hit,
    bench_instance_miss,
    bench_resolve,
    bench_equivalence
);
criterion_main!(benches);
