//! Criterion benchmarks for scan pattern generation and traversal.
//!
//! Pattern generation runs once per scan construction; traversal runs once per
//! scan and dominates nested designs, where the inner scan is rebuilt for every
//! outer coordinate.
//!
//! Run with: cargo bench --bench pattern_generation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_align::hardware::mock::{MockAxisTransport, MockPowerMeter};
use rust_align::scan::{CrossShape, DiamondShape, LineShape, Pattern, RectangleShape, Scan};
use rust_align::stage::{Axis, AxisConfig, AxisId, AxisLimits, AxisRole, Stage};
use std::sync::Arc;

fn rectangle_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rectangle_pattern");

    for side in [7usize, 21, 51, 101] {
        group.throughput(Throughput::Elements((side * side) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(side), &side, |b, &side| {
            let shape = RectangleShape::new(side, side, 1.0, 1.0);
            b.iter(|| Pattern::rectangle(black_box(&shape)).unwrap());
        });
    }

    group.finish();
}

fn other_shapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("other_patterns");

    group.bench_function("line_1001", |b| {
        let shape = LineShape::new(1001, 0.5);
        b.iter(|| Pattern::line(black_box(&shape)).unwrap());
    });
    group.bench_function("cross_101", |b| {
        let shape = CrossShape::new(101, 101, 1.0, 1.0);
        b.iter(|| Pattern::cross(black_box(&shape)).unwrap());
    });
    group.bench_function("diamond_51", |b| {
        let shape = DiamondShape::new(51, 51, 1.0, 1.0);
        b.iter(|| Pattern::diamond(black_box(&shape)).unwrap());
    });

    group.finish();
}

fn mock_stage() -> Stage {
    let limits = AxisLimits::new(0.0, 1e8).unwrap();
    let mut builder = Stage::builder("bench");
    for role in [AxisRole::X, AxisRole::Y] {
        let transport = Arc::new(MockAxisTransport::new(role.as_str(), 5e7));
        let axis = Axis::new(AxisConfig::linear(role.as_str(), limits), transport).unwrap();
        builder = builder.axis(role, axis);
    }
    builder.build().unwrap()
}

fn rectangle_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("rectangle_scan_mock");

    for side in [7usize, 21] {
        group.throughput(Throughput::Elements((side * side) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(side), &side, |b, &side| {
            let mut stage = mock_stage();
            let scan = Scan::rectangle(
                AxisId::local(AxisRole::X),
                AxisId::local(AxisRole::Y),
                Arc::new(MockPowerMeter::constant(1e-6)),
                RectangleShape::new(side, side, 1.0, 1.0),
            )
            .unwrap();
            b.iter(|| scan.scan(&mut stage, false).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, rectangle_generation, other_shapes, rectangle_scan);
criterion_main!(benches);
