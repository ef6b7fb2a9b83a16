use criterion::{black_box, criterion_group, criterion_main, Criterion};

use garmr::config::LookasideConfig;
use garmr::kdc::{murmur3_32, ReplayCache};
use garmr::testutils::TestClock;

fn filled_cache(entries: u64, payload: usize) -> (ReplayCache, Vec<Vec<u8>>) {
    let mut cache = ReplayCache::with_clock(
        &LookasideConfig::default(),
        Box::new(TestClock::new(1_000)),
    );
    let reply = vec![0xaa; payload];
    let mut reqs = Vec::new();
    for i in 0..entries {
        let mut req = vec![0u8; payload];
        req[..8].copy_from_slice(&i.to_le_bytes());
        cache.insert(&req, Some(&reply)).unwrap();
        reqs.push(req);
    }
    (cache, reqs)
}

fn criterion_benchmark(c: &mut Criterion) {
    let packet_64 = vec![0x6c; 64];
    let packet_1500 = vec![0x6c; 1500];
    c.bench_function("murmur3_64b", |bench| {
        bench.iter(|| murmur3_32(0x9747b28c, black_box(&packet_64)))
    });
    c.bench_function("murmur3_1500b", |bench| {
        bench.iter(|| murmur3_32(0x9747b28c, black_box(&packet_1500)))
    });

    let (mut cache, reqs) = filled_cache(1024, 256);
    let present = reqs[512].clone();
    let absent = vec![0xff; 256];
    c.bench_function("lookaside_hit", |bench| {
        bench.iter(|| cache.lookup(black_box(&present)).unwrap())
    });
    c.bench_function("lookaside_miss", |bench| {
        bench.iter(|| cache.lookup(black_box(&absent)))
    });

    c.bench_function("lookaside_insert", |bench| {
        let reply = vec![0xaa; 256];
        let mut i: u64 = u64::MAX;
        bench.iter(|| {
            let mut req = vec![0u8; 64];
            req[..8].copy_from_slice(&i.to_le_bytes());
            i = i.wrapping_sub(1);
            let _ = cache.insert(black_box(&req), Some(&reply));
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
