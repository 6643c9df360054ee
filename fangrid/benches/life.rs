use criterion::{black_box, criterion_group, criterion_main, Criterion};

use fangrid::life;
use fangrid::mapper;
use fangrid::patterns::builtin_pattern;

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("life");
    for name in ["oscillators", "pulsar", "glider"] {
        let grid = builtin_pattern(name).unwrap();
        group.bench_function(format!("step/{name}"), |b| {
            b.iter(|| life::step(black_box(&grid)))
        });
    }
    let pulsar = builtin_pattern("pulsar").unwrap();
    group.bench_function("step_n/pulsar/48", |b| {
        b.iter(|| life::step_n(black_box(&pulsar), 48))
    });
    group.finish();
}

fn bench_mapper(c: &mut Criterion) {
    let grid = builtin_pattern("still-lifes").unwrap();
    let states = mapper::grid_to_cells(&grid);

    c.bench_function("mapper/grid_to_cells", |b| {
        b.iter(|| mapper::grid_to_cells(black_box(&grid)))
    });
    c.bench_function("mapper/cells_to_grid", |b| {
        b.iter(|| mapper::cells_to_grid(black_box(&states)))
    });
}

criterion_group!(benches, bench_step, bench_mapper);
criterion_main!(benches);
