use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use blockwise::{create, create_offsets, Interval};

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_create");
    for size in [256i64, 1024, 4096] {
        let dims = [size, size, size / 4];
        let grid = [128, 128, 32];
        let out = [64, 64, 16];
        let count = dims
            .iter()
            .zip(&grid)
            .map(|(&d, &b)| ((d + b - 1) / b) as u64)
            .product::<u64>();
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("blocks", size), &dims, |b, dims| {
            b.iter(|| create(black_box(dims), &grid, &out).unwrap());
        });
    }
    group.finish();
}

fn bench_offsets(c: &mut Criterion) {
    let interval = Interval::new(vec![-1023, -1023, 0], vec![1534, 1534, 63]).unwrap();
    c.bench_function("grid_offsets_padded", |b| {
        b.iter(|| create_offsets(black_box(&interval), &[64, 64, 32]).unwrap());
    });
}

criterion_group!(grid_bench, bench_create, bench_offsets);
criterion_main!(grid_bench);
