//! Performance benchmarks for the upload hot path.
//!
//! These benchmarks measure:
//! - Frame parsing by copy and by buffer reuse
//! - File name sanitizing
//! - Unique name resolution in a crowded directory

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use daemon::files::{sanitize_file_name, UniqueNameResolver};
use protocol::FileTransferFrame;
use tempfile::TempDir;

fn encoded_frame(content_len: usize) -> Vec<u8> {
    FileTransferFrame::new("IMG_20240101_120000.jpg", 1_700_000_000_000.0, vec![0xAB; content_len])
        .encode()
        .unwrap()
}

/// Benchmark `parse` (copies content) against `from_message` (reuses the buffer).
fn bench_frame_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_parsing");

    for (label, size) in [("4KB", 4096), ("1MB", 1024 * 1024), ("16MB", 16 * 1024 * 1024)] {
        let data = encoded_frame(size);
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_function(format!("parse_{}", label), |b| {
            b.iter(|| FileTransferFrame::parse(black_box(&data)).unwrap());
        });

        group.bench_function(format!("from_message_{}", label), |b| {
            b.iter_batched(
                || data.clone(),
                |owned| FileTransferFrame::from_message(black_box(owned)).unwrap(),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize_file_name");

    group.bench_function("plain", |b| {
        b.iter(|| sanitize_file_name(black_box(b"holiday photo.jpg")));
    });

    group.bench_function("hostile", |b| {
        let name = b"../../etc/\x01pa:ss*wd?<>|..   ";
        b.iter(|| sanitize_file_name(black_box(name)));
    });

    let long = vec![b'a'; 1024];
    group.bench_function("long_1KB", |b| {
        b.iter(|| sanitize_file_name(black_box(&long)));
    });

    group.finish();
}

/// Resolution cost grows with the number of existing suffixed siblings.
fn bench_unique_name(c: &mut Criterion) {
    let mut group = c.benchmark_group("unique_name");

    for taken in [0usize, 10, 100] {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("photo.jpg"), b"").unwrap();
        for n in 1..=taken {
            std::fs::write(temp_dir.path().join(format!("photo_{}.jpg", n)), b"").unwrap();
        }
        let resolver = UniqueNameResolver::new(temp_dir.path());

        group.bench_function(format!("resolve_{}_taken", taken), |b| {
            b.iter(|| resolver.resolve(black_box("photo.jpg")).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frame_parsing, bench_sanitize, bench_unique_name);
criterion_main!(benches);
