//! Performance benchmarks for minehound

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use minehound::{
    fingerprint::{signatures, FingerprintResult},
    scoring::HostObservation,
    AddressRange, ScoringEngine,
};

/// Benchmark candidate enumeration
fn bench_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("enumeration");

    for cidr in ["10.0.0.0/24", "10.0.0.0/20", "10.0.0.0/16"] {
        let range = AddressRange::parse(cidr).unwrap();
        group.bench_with_input(BenchmarkId::new("hosts", cidr), &range, |b, range| {
            b.iter(|| black_box(range.hosts().count()))
        });
    }

    group.bench_function("parse_cidr", |b| {
        b.iter(|| AddressRange::parse(black_box("192.168.100.0/22")).unwrap())
    });

    group.finish();
}

/// Benchmark evidence scoring
fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");
    let engine = ScoringEngine::new();

    let mut miner = HostObservation::new("192.168.1.50".parse().unwrap());
    miner.open_ports = [(3333, true), (4028, true), (80, false)].into_iter().collect();
    miner.fingerprints = vec![
        FingerprintResult::stratum(3333, Some("XMRig".to_string()), None),
        FingerprintResult::negative(4028, None),
    ];
    miner.host_info.hostname = Some("antminer-s19.lan".to_string());

    group.bench_function("assess_miner", |b| {
        b.iter(|| engine.assess(black_box(miner.clone())))
    });

    let quiet = HostObservation::new("192.168.1.51".parse().unwrap());
    group.bench_function("assess_quiet", |b| {
        b.iter(|| engine.assess(black_box(quiet.clone())))
    });

    group.finish();
}

/// Benchmark signature matching on a typical pool reply
fn bench_signatures(c: &mut Criterion) {
    let reply = r#"{"id":1,"result":[["mining.set_difficulty","b4b6693b"],["mining.notify","ae6812eb"]],"error":null,"agent":"xmrig/6.21.0"}"#;

    c.bench_function("stratum_response", |b| {
        b.iter(|| signatures::is_stratum_response(black_box(reply)))
    });
    c.bench_function("mining_software", |b| {
        b.iter(|| signatures::match_mining_software(black_box(reply)))
    });
}

criterion_group!(benches, bench_enumeration, bench_scoring, bench_signatures);
criterion_main!(benches);
