//! Benchmark for frame encoding and attribute decoding

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nan_aware::core::{Config, InstanceId, MacAddr};
use nan_aware::protocol::{
    decode_tlv_sequence, encode_discovery_action, encode_service_message, encode_sync_beacon,
    parse_beacon, LocalNodeState, ServiceType, ACTION_ATTR_START,
};

fn node() -> LocalNodeState {
    LocalNodeState::from_config(&Config {
        mac: Some(MacAddr([0x02, 0xeb, 0x23, 0x0a, 0xc9, 0x31])),
        master_random: Some(3),
        ..Default::default()
    })
}

fn bench_encode(c: &mut Criterion) {
    let node = node();
    let mut group = c.benchmark_group("encode");

    group.bench_function("sync_beacon", |b| {
        b.iter(|| encode_sync_beacon(black_box(&node), 512))
    });
    group.bench_function("publish", |b| {
        b.iter(|| {
            encode_discovery_action(black_box(&node), ServiceType::Publish, InstanceId(0), b"")
        })
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let node = node();
    let mut group = c.benchmark_group("decode");

    let beacon = encode_sync_beacon(&node, 512).unwrap();
    group.bench_function("beacon", |b| b.iter(|| parse_beacon(black_box(beacon.as_bytes()))));

    for len in [0usize, 64, 249] {
        let payload = vec![0x5A; len];
        let frame = encode_service_message(&node, MacAddr::BROADCAST, InstanceId(2), &payload);
        let frame = frame.unwrap();
        group.bench_with_input(BenchmarkId::new("service_message", len), &frame, |b, frame| {
            b.iter(|| decode_tlv_sequence(black_box(frame.as_bytes()), ACTION_ATTR_START).count())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
