//! Criterion benchmarks for the session-protocol codec.
//!
//! The codec sits on the input hot path: every key stroke and mouse movement
//! relayed to a client passes through `encode_message`, and every client
//! report through `decode_message`.  These benchmarks track the per-message
//! cost for the high-frequency commands and for a large clipboard transfer.
//!
//! Run with:
//!
//! ```bash
//! cargo bench --package screenlink-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use screenlink_core::protocol::codec::{decode_message, encode_message};
use screenlink_core::protocol::messages::{ClipboardId, Message};

fn fixtures() -> Vec<(&'static str, Message)> {
    vec![
        ("MouseMove", Message::MouseMove { x: 960, y: 540 }),
        (
            "KeyDown",
            Message::KeyDown {
                key: 0x61,
                mask: 0x0001,
                button: 38,
            },
        ),
        (
            "Enter",
            Message::Enter {
                x: 1,
                y: 300,
                seq: 42,
                mask: 0,
            },
        ),
        (
            "Info",
            Message::Info {
                x: 0,
                y: 0,
                w: 1920,
                h: 1080,
                zone: 1,
                mx: 960,
                my: 540,
            },
        ),
        ("KeepAlive", Message::KeepAlive),
        (
            "ClipboardData_64K",
            Message::ClipboardData {
                id: ClipboardId::Clipboard,
                seq: 1,
                data: vec![0x42; 64 * 1024],
            },
        ),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_message");
    for (name, msg) in fixtures() {
        group.bench_with_input(BenchmarkId::new("msg", name), &msg, |b, msg| {
            b.iter(|| encode_message(black_box(msg)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_message");
    for (name, msg) in fixtures() {
        let payload = encode_message(&msg);
        group.bench_with_input(BenchmarkId::new("msg", name), &payload, |b, payload| {
            b.iter(|| decode_message(black_box(payload)).expect("decode must succeed"))
        });
    }
    group.finish();
}

fn bench_roundtrip_hot_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_decode_roundtrip");

    let mouse = Message::MouseMove { x: 960, y: 540 };
    group.bench_function("MouseMove", |b| {
        b.iter(|| {
            let payload = encode_message(black_box(&mouse));
            decode_message(black_box(&payload)).unwrap()
        })
    });

    let key = Message::KeyDown {
        key: 0x61,
        mask: 0,
        button: 38,
    };
    group.bench_function("KeyDown", |b| {
        b.iter(|| {
            let payload = encode_message(black_box(&key));
            decode_message(black_box(&payload)).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_roundtrip_hot_path);
criterion_main!(benches);
