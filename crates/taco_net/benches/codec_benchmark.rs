//! # Packet Codec Benchmark
//!
//! Encode/decode cost of the session packets, plus a full loopback
//! round trip through two peer hosts.

#![allow(missing_docs)]

use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use taco_net::protocol::{decode, encode_chat, encode_client_info, encode_relay};
use taco_net::transport::host::PeerHost;
use taco_net::transport::loopback::LoopbackHub;
use taco_net::{Delivery, Host};

const RELAY_PAYLOAD: usize = 512;

// =============================================================================
// CODEC
// =============================================================================

fn bench_encode(c: &mut Criterion) {
    let payload = vec![0xAB; RELAY_PAYLOAD];

    c.bench_function("encode_chat", |b| {
        b.iter(|| encode_chat(black_box("Tacotakedown"), black_box("gg, rematch? !roll")));
    });
    c.bench_function("encode_client_info", |b| {
        b.iter(|| encode_client_info(black_box(1), black_box("Tacotakedown"), Some(b"skin=red")));
    });
    c.bench_function("encode_relay_512", |b| {
        b.iter(|| encode_relay(black_box(3), black_box(&payload)));
    });
}

fn bench_decode(c: &mut Criterion) {
    let chat = encode_chat("Tacotakedown", "gg, rematch? !roll");
    let relay = encode_relay(3, &vec![0xAB; RELAY_PAYLOAD]);

    c.bench_function("decode_chat", |b| {
        b.iter(|| decode(black_box(&chat)));
    });
    c.bench_function("decode_relay_512", |b| {
        b.iter(|| decode(black_box(&relay)));
    });
}

// =============================================================================
// TRANSPORT
// =============================================================================

fn bench_loopback_round_trip(c: &mut Criterion) {
    let hub = LoopbackHub::new();
    let now = Instant::now();
    let server_address = "10.0.0.1:7777".parse().unwrap();
    let mut server = PeerHost::new(hub.bind(server_address).unwrap(), 4, now);
    let mut client = PeerHost::new(hub.bind("10.0.0.2:0".parse().unwrap()).unwrap(), 1, now);

    let remote = client.connect(server_address, now).unwrap();
    client.flush();
    while server.service(now).is_some() {}
    while client.service(now).is_some() {}

    let packet = encode_relay(1, &vec![0xCD; RELAY_PAYLOAD]);
    c.bench_function("loopback_reliable_round_trip_512", |b| {
        b.iter(|| {
            client.send(remote, &packet, Delivery::Reliable);
            client.flush();
            let mut received = 0;
            while let Some(event) = server.service(now) {
                black_box(&event);
                received += 1;
            }
            while client.service(now).is_some() {}
            received
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_loopback_round_trip);
criterion_main!(benches);
