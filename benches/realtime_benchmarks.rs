//! Performance benchmarks for the realtime client hot paths
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::Duration;
use waav_realtime::core::realtime::buffer_pool::{BufferPool, PoolExhaustion};
use waav_realtime::core::realtime::chunk_duration_ms;
use waav_realtime::core::realtime::openai::{ClientEvent, InboundEvent, OutboundEvent};

/// Benchmark inbound event decoding
fn bench_event_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_decoding");
    group.measurement_time(Duration::from_secs(5));

    let transcript = r#"{"type":"conversation.item.input_audio_transcription.completed","event_id":"event_1","item_id":"item_1","content_index":0,"transcript":"Hello, how can I help you today?"}"#;

    let audio_delta = format!(
        r#"{{"type":"response.output_audio.delta","event_id":"event_2","response_id":"resp_1","item_id":"item_2","output_index":0,"content_index":0,"delta":"{}"}}"#,
        "A".repeat(6400)
    );

    let unknown = r#"{"type":"response.something_new","event_id":"event_3","payload":{"a":1,"b":[1,2,3]}}"#;

    for (name, frame) in [
        ("transcript", transcript.to_string()),
        ("audio_delta", audio_delta),
        ("unknown", unknown.to_string()),
    ] {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new(name, frame.len()), &frame, |b, frame| {
            b.iter(|| {
                let _ = InboundEvent::decode(black_box(frame));
            });
        });
    }

    group.finish();
}

/// Benchmark outbound serialization into pooled buffers
fn bench_outbound_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbound_serialization");

    let pool = BufferPool::new(64 * 1024, 8, PoolExhaustion::Allocate);
    // 100 ms of pcm16 at 24kHz
    let audio = vec![0u8; 4800];

    group.throughput(Throughput::Bytes(audio.len() as u64));
    group.bench_function("audio_append_100ms", |b| {
        b.iter(|| {
            let event = OutboundEvent::new(ClientEvent::audio_append(black_box(&audio)));
            let mut buffer = pool.acquire().unwrap();
            serde_json::to_writer(&mut *buffer, &event).unwrap();
            black_box(buffer.len());
        });
    });

    group.bench_function("commit", |b| {
        b.iter(|| {
            let event = OutboundEvent::new(ClientEvent::InputAudioBufferCommit);
            let mut buffer = pool.acquire().unwrap();
            serde_json::to_writer(&mut *buffer, &event).unwrap();
            black_box(buffer.len());
        });
    });

    group.finish();
}

/// Benchmark buffer pool borrow/return
fn bench_buffer_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool");

    let pool = BufferPool::new(64 * 1024, 100, PoolExhaustion::Allocate);
    group.bench_function("acquire_release", |b| {
        b.iter(|| {
            let buffer = pool.acquire().unwrap();
            black_box(buffer.is_pooled());
        });
    });

    let empty = BufferPool::new(64 * 1024, 1, PoolExhaustion::Allocate);
    let _held = empty.acquire().unwrap();
    group.bench_function("acquire_transient", |b| {
        b.iter(|| {
            let buffer = empty.acquire().unwrap();
            black_box(buffer.is_pooled());
        });
    });

    group.bench_function("chunk_duration", |b| {
        b.iter(|| chunk_duration_ms(black_box(4800), black_box(2), black_box(24000)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_event_decoding,
    bench_outbound_serialization,
    bench_buffer_pool
);

criterion_main!(benches);
