//! Hot-path benchmark suite.
//!
//! Benchmarks the work done for every request and every frame:
//! - Gateway URL parsing
//! - Stream request JSON decoding
//! - Frame buffer fills at several payload sizes
//!
//! Run with: cargo bench --bench frame_path
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use device_stream_bridge::{FrameBuffer, StreamOpenRequest, UrlDescriptor};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const URLS: &[&str] = &[
    "wss://gw.example.com:443/streams/abc",
    "ws://10.0.0.7/streams/abc?session=42&region=eu",
    "wss://gw.example.com//nested/stream/path/with/several/segments",
];

const PAYLOAD_SIZES: &[usize] = &[16, 128, 4096, 65536];

const REQUEST_JSON: &str = r#"{
    "name": "diagnostics",
    "url": "wss://gw.example.com:443/streams/abc",
    "authorizationToken": "eyJhbGciOiJIUzI1NiJ9.e30.sig",
    "requestId": "req-42"
}"#;

// ============================================================================
// Benchmark: URL Parsing
// ============================================================================

fn bench_url_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("url_parse");

    for (i, url) in URLS.iter().enumerate() {
        group.bench_with_input(BenchmarkId::new("parse", i), url, |b, url| {
            b.iter(|| UrlDescriptor::parse(black_box(url)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Request Decoding
// ============================================================================

fn bench_request_json(c: &mut Criterion) {
    c.bench_function("request_from_json", |b| {
        b.iter(|| StreamOpenRequest::from_json(black_box(REQUEST_JSON)));
    });
}

// ============================================================================
// Benchmark: Frame Buffer
// ============================================================================

fn bench_frame_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_fill");

    for &size in PAYLOAD_SIZES {
        let payload = vec![0x5au8; size];
        let mut buffer = FrameBuffer::new(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("fit", size), &payload, |b, payload| {
            b.iter(|| buffer.fill(black_box(payload)).map(<[u8]>::len));
        });

        let mut small = FrameBuffer::new(size / 2);
        group.bench_with_input(BenchmarkId::new("overflow", size), &payload, |b, payload| {
            b.iter(|| small.fill(black_box(payload)).is_err());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_url_parse, bench_request_json, bench_frame_fill);
criterion_main!(benches);
