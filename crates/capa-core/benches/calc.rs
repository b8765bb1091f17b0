use criterion::{black_box, criterion_group, criterion_main, Criterion};

use capa_core::calc::{evaluate, evaluate_default, Namespace};

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("calc");

    let namespace = Namespace::new()
        .with_variable("R1", 1000.0)
        .with_variable("R2", 2200.0)
        .with_variable("omega", 314.159);

    group.bench_function("literal", |b| b.iter(|| evaluate_default(black_box("-0.33"))));

    group.bench_function("suffixes_and_powers", |b| {
        b.iter(|| evaluate_default(black_box("2^3^2 + 4.7k / 3m - 12%")))
    });

    group.bench_function("parallel_resistors", |b| {
        b.iter(|| evaluate(black_box("R1 || R2 || 10k"), &namespace))
    });

    group.bench_function("functions_and_complex", |b| {
        b.iter(|| evaluate(black_box("sqrt(R1^2 + (omega*j)^2) * sin(omega/100) + ln(e)"), &namespace))
    });

    let long = (0..200).map(|i| format!("{i}*x")).collect::<Vec<_>>().join(" + ");
    let with_x = Namespace::new().with_variable("x", 0.5);
    group.bench_function("long_sum", |b| b.iter(|| evaluate(black_box(&long), &with_x)));

    group.finish();
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
