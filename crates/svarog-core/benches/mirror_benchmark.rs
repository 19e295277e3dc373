//! Seqlock mirror and parity engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use svarog_core::{crc, CrcKind, MirrorSeqlock};

fn bench_mirror_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("mirror");

    for size in [64usize, 256, 1024] {
        let mirror = MirrorSeqlock::new(size, true);
        mirror.write(&vec![0x5A; size]).unwrap();
        let mut buf = vec![0u8; size];

        group.bench_function(format!("read_{size}"), |b| {
            b.iter(|| {
                mirror.read(black_box(&mut buf)).unwrap();
            });
        });

        let payload = vec![0xA5; size];
        group.bench_function(format!("write_{size}"), |b| {
            b.iter(|| {
                mirror.write(black_box(&payload)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_crc(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc");
    let data = vec![0x42u8; 1024];

    for kind in [CrcKind::Crc8, CrcKind::Crc16, CrcKind::Crc32] {
        group.bench_function(format!("{kind:?}_1k"), |b| {
            b.iter(|| crc::checksum(kind, black_box(&data)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mirror_snapshot, bench_crc);
criterion_main!(benches);
