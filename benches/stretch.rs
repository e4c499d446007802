use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dub_sync::{TimeStretcher, WsolaStretcher};

const RATE: u32 = 44100;

fn speech_like(duration_secs: f64) -> Vec<f32> {
    let len = (duration_secs * RATE as f64) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / RATE as f32;
            (2.0 * std::f32::consts::PI * 140.0 * t).sin() * 0.5
                + (2.0 * std::f32::consts::PI * 420.0 * t).sin() * 0.2
        })
        .collect()
}

fn bench_wsola(c: &mut Criterion) {
    let stretcher = WsolaStretcher::default();
    let input = speech_like(3.0);
    let mut group = c.benchmark_group("wsola");

    for ratio in [0.5, 0.8, 1.25, 2.0] {
        let output_len = (input.len() as f64 / ratio).round() as usize;
        group.bench_with_input(BenchmarkId::from_parameter(ratio), &ratio, |b, &ratio| {
            b.iter(|| {
                stretcher
                    .stretch(black_box(&input), RATE, ratio, output_len)
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_wsola);
criterion_main!(benches);
