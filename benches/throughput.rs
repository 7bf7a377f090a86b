//! Throughput Benchmark for respframe
//!
//! This benchmark measures decoding and dispatch performance under
//! various delivery patterns.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use respframe::commands::{builtin, Dispatcher, Keyspace};
use respframe::protocol::{Command, CommandDecoder};
use std::sync::Arc;
use std::time::Duration;

fn encode_array(args: &[&[u8]]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

fn pipeline(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..count {
        let key = format!("key:{}", i);
        out.extend(encode_array(&[&b"SET"[..], key.as_bytes(), &b"value"[..]]));
    }
    out
}

/// Benchmark decoding with everything already buffered
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let small = pipeline(100);
    group.throughput(Throughput::Bytes(small.len() as u64));
    group.bench_function("pipeline_100_set", |b| {
        b.iter(|| {
            let mut decoder = CommandDecoder::new();
            let mut buf = BytesMut::from(&small[..]);
            black_box(decoder.feed(&mut buf).unwrap());
        });
    });

    let value = vec![b'x'; 64 * 1024];
    let large = encode_array(&[&b"SET"[..], &b"big"[..], &value[..]]);
    group.throughput(Throughput::Bytes(large.len() as u64));
    group.bench_function("bulk_64k", |b| {
        b.iter(|| {
            let mut decoder = CommandDecoder::new();
            let mut buf = BytesMut::from(&large[..]);
            black_box(decoder.feed(&mut buf).unwrap());
        });
    });

    let inline = b"SET key value\r\n".repeat(100);
    group.throughput(Throughput::Bytes(inline.len() as u64));
    group.bench_function("inline_100", |b| {
        b.iter(|| {
            let mut decoder = CommandDecoder::new();
            let mut buf = BytesMut::from(&inline[..]);
            black_box(decoder.feed(&mut buf).unwrap());
        });
    });

    group.finish();
}

/// Benchmark decoding when data trickles in
fn bench_decode_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_chunked");

    let data = pipeline(100);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk_size in [1usize, 16, 512] {
        group.bench_function(format!("chunk_{}", chunk_size), |b| {
            b.iter(|| {
                let mut decoder = CommandDecoder::new();
                let mut buf = BytesMut::new();
                let mut decoded = 0;
                for chunk in data.chunks(chunk_size) {
                    buf.extend_from_slice(chunk);
                    decoded += decoder.feed(&mut buf).unwrap().len();
                }
                black_box(decoded);
            });
        });
    }

    group.finish();
}

/// Benchmark the dispatcher on its own
fn bench_dispatch(c: &mut Criterion) {
    let registry = builtin::registry(Arc::new(Keyspace::new()));
    let dispatcher = Dispatcher::new(Arc::new(registry));

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("ping", |b| {
        b.iter(|| {
            let command = Command::array(vec![Bytes::from_static(b"PING")]);
            black_box(dispatcher.dispatch(command));
        });
    });

    group.bench_function("set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let command = Command::array(vec![
                Bytes::from_static(b"SET"),
                Bytes::from(format!("key:{}", i % 10_000)),
                Bytes::from_static(b"value"),
            ]);
            black_box(dispatcher.dispatch(command));
            i += 1;
        });
    });

    group.bench_function("incrby_coerced", |b| {
        b.iter(|| {
            let command = Command::array(vec![
                Bytes::from_static(b"incrby"),
                Bytes::from_static(b"counter"),
                Bytes::from_static(b"7"),
            ]);
            black_box(dispatcher.dispatch(command));
        });
    });

    group.bench_function("unknown", |b| {
        b.iter(|| {
            let command = Command::array(vec![Bytes::from_static(b"NOPE")]);
            black_box(dispatcher.dispatch(command));
        });
    });

    group.finish();
}

/// Benchmark one decoder/dispatcher pair per thread
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    let data = Arc::new(pipeline(1_000));

    group.bench_function("4_connections", |b| {
        b.iter(|| {
            let registry = builtin::registry(Arc::new(Keyspace::new()));
            let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let dispatcher = Arc::clone(&dispatcher);
                    let data = Arc::clone(&data);
                    thread::spawn(move || {
                        let mut decoder = CommandDecoder::new();
                        let mut buf = BytesMut::new();
                        let mut replies = 0;
                        for chunk in data.chunks(1460) {
                            buf.extend_from_slice(chunk);
                            for command in decoder.feed(&mut buf).unwrap() {
                                dispatcher.dispatch(command);
                                replies += 1;
                            }
                        }
                        replies
                    })
                })
                .collect();

            for handle in handles {
                black_box(handle.join().unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_decode,
    bench_decode_chunked,
    bench_dispatch,
    bench_concurrent,
);

criterion_main!(benches);
