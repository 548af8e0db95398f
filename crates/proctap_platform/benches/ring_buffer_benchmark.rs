//! Throughput benchmarks for the SPSC ring buffer's push/pop path.
//!
//! Run with: cargo bench -p proctap_platform

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use proctap_platform::RingBuffer;

fn benchmark_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_push");

    // Typical OS-callback chunk sizes, in frames of stereo float32 (4 bytes/sample).
    let frame_counts = [64, 128, 256, 512, 1024];

    for frames in frame_counts {
        let bytes_per_frame = 8; // stereo f32
        let chunk = vec![0u8; frames * bytes_per_frame];
        group.throughput(Throughput::Bytes(chunk.len() as u64));

        group.bench_function(format!("push_{frames}_frames"), |b| {
            let rb = RingBuffer::new(frames * bytes_per_frame * 8, bytes_per_frame);
            b.iter(|| {
                rb.push(black_box(&chunk));
            });
        });
    }

    group.finish();
}

fn benchmark_push_pop_roundtrip(c: &mut Criterion) {
    c.bench_function("ring_buffer_push_pop_1024_frames", |b| {
        let bytes_per_frame = 8;
        let rb = RingBuffer::new(1024 * bytes_per_frame * 4, bytes_per_frame);
        let chunk = vec![0u8; 1024 * bytes_per_frame];

        b.iter(|| {
            rb.push(black_box(&chunk));
            let out = rb.pop(black_box(chunk.len()));
            black_box(out);
        });
    });
}

fn benchmark_overflow_drop_oldest(c: &mut Criterion) {
    c.bench_function("ring_buffer_overflow_drop_oldest", |b| {
        let bytes_per_frame = 8;
        // Small buffer relative to the chunk, forcing drop-oldest on every push.
        let rb = RingBuffer::new(256 * bytes_per_frame, bytes_per_frame);
        let chunk = vec![0u8; 1024 * bytes_per_frame];

        b.iter(|| {
            rb.push(black_box(&chunk));
        });
    });
}

criterion_group!(
    benches,
    benchmark_push,
    benchmark_push_pop_roundtrip,
    benchmark_overflow_drop_oldest
);

criterion_main!(benches);
