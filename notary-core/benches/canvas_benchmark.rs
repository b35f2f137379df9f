use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use notary_core::{CanvasState, Color, Operation, Point};

fn make_stroke(page: u32, points: usize) -> Operation {
    let path = (0..points).map(|i| {
        let fi = i as f32;
        Point::new(fi * 1.5, (fi * 0.7).sin() * 40.0 + 100.0)
    });
    Operation::draw(page, path, Color::rgb(0x20, 0x40, 0xff), 2.0)
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("canvas_apply");
    group.throughput(Throughput::Elements(1));

    let stroke = make_stroke(1, 64);
    group.bench_function("apply_draw", |b| {
        let mut canvas = CanvasState::new();
        b.iter(|| canvas.apply(black_box(stroke.clone())));
    });

    group.bench_function("apply_clear", |b| {
        let mut canvas = CanvasState::new();
        b.iter(|| {
            canvas.apply(stroke.clone());
            canvas.apply(black_box(Operation::clear(1)));
        });
    });
    group.finish();
}

fn bench_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_json");
    for &points in &[8usize, 64, 512] {
        let op = make_stroke(1, points);
        let encoded = serde_json::to_vec(&op).unwrap();
        group.bench_with_input(BenchmarkId::new("encode", points), &op, |b, op| {
            b.iter(|| black_box(serde_json::to_vec(black_box(op)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", points), &encoded, |b, bytes| {
            b.iter(|| black_box(serde_json::from_slice::<Operation>(black_box(bytes)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_apply, bench_wire);
criterion_main!(benches);
