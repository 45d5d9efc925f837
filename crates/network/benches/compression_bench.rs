//! Message compression benchmarks
//!
//! Run with: cargo bench -p peerwire-network --bench compression_bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use peerwire_network::{
    BufferPool, CompressionAlgorithm, CompressionConfig, MessageCompression, OutgoingMessage, PooledCompression,
    StoragePool,
};
use rand::{rngs::StdRng, RngCore, SeedableRng};

fn compressible_payload(size: usize) -> Vec<u8> {
    let pattern = b"inventory announce block=000000a1 tx=ff03 peer=10.0.0.7:4000 ";
    pattern.iter().cycle().take(size).copied().collect()
}

fn random_payload(size: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut bytes = vec![0u8; size];
    rng.fill_bytes(&mut bytes);
    bytes
}

fn message(payload: &[u8]) -> OutgoingMessage {
    let mut msg = OutgoingMessage::with_capacity(payload.len() + 1);
    msg.write_bytes(payload);
    msg
}

fn codec(algorithm: CompressionAlgorithm) -> PooledCompression<Arc<StoragePool>> {
    let config = CompressionConfig { algorithm, ..Default::default() };
    PooledCompression::new(Arc::new(StoragePool::new(&config.pool)), config)
}

fn algorithms() -> Vec<(&'static str, CompressionAlgorithm)> {
    let mut algorithms = vec![("deflate", CompressionAlgorithm::Deflate)];
    if cfg!(feature = "zstd") {
        algorithms.push(("zstd", CompressionAlgorithm::Zstd));
    }
    algorithms
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");

    for size in [64, 1024, 16 * 1024] {
        let payload = compressible_payload(size);
        group.throughput(Throughput::Bytes(size as u64));

        for (name, algorithm) in algorithms() {
            let codec = codec(algorithm);
            group.bench_with_input(BenchmarkId::new(name, size), &payload, |b, payload| {
                b.iter(|| {
                    let mut msg = message(payload);
                    black_box(codec.try_compress(&mut msg).ok());
                    codec.pool().release(msg.into_buffer());
                });
            });
        }
    }
    group.finish();
}

fn bench_incompressible(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress_incompressible");
    let codec = codec(CompressionAlgorithm::Deflate);

    for size in [64, 1024, 16 * 1024] {
        let payload = random_payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                let mut msg = message(payload);
                black_box(codec.try_compress(&mut msg).ok());
            });
        });
    }
    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");

    for (name, algorithm) in algorithms() {
        let codec = codec(algorithm);
        let payload = compressible_payload(4096);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut msg = message(&payload);
                let _ = codec.try_compress(&mut msg);
                let mut incoming = msg.into_incoming();
                black_box(codec.try_decompress(&mut incoming).ok());
                codec.pool().release(incoming.into_buffer());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compress, bench_incompressible, bench_roundtrip);
criterion_main!(benches);
