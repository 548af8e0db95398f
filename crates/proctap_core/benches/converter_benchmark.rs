//! Throughput benchmarks for the format conversion pipeline.
//!
//! Run with: cargo bench -p proctap_core

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use proctap_core::{AudioFormat, Converter, ResamplingQuality, SampleEncoding};

fn benchmark_identity_passthrough(c: &mut Criterion) {
    let mut group = c.benchmark_group("converter_identity");
    let buffer_sizes = [256, 1024, 4096];

    for frames in buffer_sizes {
        let fmt = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
        let bytes = vec![0u8; frames * fmt.bytes_per_frame()];
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_function(format!("identity_{frames}_frames"), |b| {
            let mut conv = Converter::new(fmt, fmt, ResamplingQuality::LowLatency);
            b.iter(|| {
                black_box(conv.convert(black_box(&bytes)).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_resample_low_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("converter_resample_low_latency");
    let src = AudioFormat::new(44_100, 2, SampleEncoding::Int16);
    let dst = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
    let buffer_sizes = [256, 1024, 4096];

    for frames in buffer_sizes {
        let bytes = vec![0u8; frames * src.bytes_per_frame()];
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_function(format!("resample_{frames}_frames"), |b| {
            let mut conv = Converter::new(src, dst, ResamplingQuality::LowLatency);
            b.iter(|| {
                black_box(conv.convert(black_box(&bytes)).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_stereo_to_mono_mixdown(c: &mut Criterion) {
    c.bench_function("converter_stereo_to_mono_1024_frames", |b| {
        let src = AudioFormat::new(48_000, 2, SampleEncoding::Float32);
        let dst = AudioFormat::new(48_000, 1, SampleEncoding::Float32);
        let mut conv = Converter::new(src, dst, ResamplingQuality::LowLatency);
        let samples: Vec<f32> = (0..1024 * 2).map(|i| (i as f32 * 0.001).sin()).collect();
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();

        b.iter(|| {
            black_box(conv.convert(black_box(&bytes)).unwrap());
        });
    });
}

criterion_group!(
    benches,
    benchmark_identity_passthrough,
    benchmark_resample_low_latency,
    benchmark_stereo_to_mono_mixdown
);

criterion_main!(benches);
