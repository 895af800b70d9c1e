use std::f32::consts::PI;

use criterion::*;
use phase_stepping::{Frame, HarmonicAnalyzer, PeriodIndex, PhaseStack};

fn phase_stack(width: usize, n_steps: usize) -> PhaseStack {
    let frames: Vec<_> = (0..n_steps)
        .map(|s| {
            Frame::from_fn(width, width, |x, y| {
                let phi = 1e-3 * (x * y) as f32;
                1e3 * (1. + 0.3 * (2. * PI * s as f32 / n_steps as f32 + phi).cos())
            })
        })
        .collect();
    PhaseStack::from_frames(&frames).unwrap()
}

pub fn harmonic_analysis(c: &mut Criterion) {
    let mut analyzer = HarmonicAnalyzer::new();
    let mut group = c.benchmark_group("harmonic_analysis");
    for width in [256usize, 512, 1024] {
        let n_steps = 8;
        let stack = phase_stack(width, n_steps).transpose();
        let period = PeriodIndex::new(1, n_steps).unwrap();
        group.throughput(Throughput::Elements((width * width) as u64));
        group.bench_with_input(BenchmarkId::new("8 steps", width), &width, |b, _| {
            b.iter(|| analyzer.analyze(&stack, period).unwrap())
        });
    }
    group.finish();
}

pub fn transpose(c: &mut Criterion) {
    let stack = phase_stack(1024, 8);
    c.bench_function("transpose 1024x1024x8", |b| b.iter(|| stack.transpose()));
}

criterion_group!(benches, harmonic_analysis, transpose);
criterion_main!(benches);
