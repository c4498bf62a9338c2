//! # Bus Benchmarks
//!
//! - Local dispatch with a growing number of subscribers
//! - Inbound receive (parse + sender stamp + dispatch)
//! - Envelope construction for payloads of different sizes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ext_pubsub::{Envelope, MessageBus, Payload, SenderMetadata, TabId, TabInfo, Topic};
use serde_json::{json, Value};

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    for subscribers in [1usize, 8, 64] {
        let bus = MessageBus::new();
        for _ in 0..subscribers {
            bus.subscribe("ext.wordSearched", |envelope: &Envelope| {
                black_box(envelope.topic());
            });
        }
        let envelope =
            Envelope::from_value(json!({ "_key_": "ext.wordSearched", "word": "ferris" }))
                .expect("object");

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &envelope,
            |b, envelope| b.iter(|| bus.dispatch(black_box(envelope))),
        );
    }
    group.finish();
}

fn bench_receive(c: &mut Criterion) {
    let bus = MessageBus::new();
    bus.subscribe("cscript.wordSelected", |envelope: &Envelope| {
        black_box(envelope.tab_id());
    });
    let sender = SenderMetadata::content_script(TabInfo::new(TabId(3)));
    let message = json!({ "_key_": "cscript.wordSelected", "word": "borrow" });

    c.bench_function("receive_from_content_script", |b| {
        b.iter(|| bus.receive(black_box(message.clone()), &sender))
    });
}

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_new");
    let topic = Topic::new("ext.wordSearched").expect("topic");
    for fields in [1usize, 16, 128] {
        let data: Payload = (0..fields)
            .map(|i| (format!("field{i}"), Value::from(i)))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(fields), &data, |b, data| {
            b.iter(|| Envelope::new(&topic, black_box(data.clone())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_receive, bench_envelope);
criterion_main!(benches);
