use criterion::{black_box, criterion_group, criterion_main, Criterion};
use notary_collab::channel::SyncChannel;
use notary_collab::protocol::{decode_operation, encode_operation, PeerInfo, RelayFrame};
use notary_collab::room::Room;
use notary_core::{Color, Operation, Point, Role};
use tokio::sync::mpsc;

fn stroke(points: usize) -> Operation {
    let path = (0..points).map(|i| Point::new(i as f32, (i as f32 * 0.3).cos() * 20.0 + 50.0));
    Operation::draw(1, path, Color::RED, 3.0)
}

fn bench_operation_encode(c: &mut Criterion) {
    let op = stroke(64);
    c.bench_function("op_encode_64pt", |b| {
        b.iter(|| black_box(encode_operation(black_box(&op)).unwrap()))
    });
}

fn bench_operation_decode(c: &mut Criterion) {
    let encoded = encode_operation(&stroke(64)).unwrap();
    c.bench_function("op_decode_64pt", |b| {
        b.iter(|| black_box(decode_operation(black_box(&encoded)).unwrap()))
    });
}

fn bench_relay_frame_roundtrip(c: &mut Criterion) {
    let payload = encode_operation(&stroke(64)).unwrap();
    c.bench_function("relay_frame_roundtrip", |b| {
        b.iter(|| {
            let frame = RelayFrame::Data {
                from: "notary".into(),
                payload: payload.clone(),
            };
            let encoded = frame.encode().unwrap();
            black_box(RelayFrame::decode(&encoded).unwrap());
        })
    });
}

fn bench_channel_send(c: &mut Criterion) {
    let op = stroke(16);
    c.bench_function("channel_send_16pt", |b| {
        let (tx, mut rx) = mpsc::channel(1024);
        let mut channel = SyncChannel::new(tx);
        b.iter(|| {
            channel.send(black_box(&op)).unwrap();
            black_box(rx.try_recv().unwrap());
        })
    });
}

fn bench_room_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let payload = encode_operation(&stroke(16)).unwrap();

    c.bench_function("room_publish_1000_frames", |b| {
        b.iter(|| {
            rt.block_on(async {
                let room = Room::new("bench", 2048, 2);
                let (_notary_rx, _) = room
                    .admit(PeerInfo::new("notary", Role::Notary))
                    .await
                    .unwrap();
                let (_client_rx, _) = room
                    .admit(PeerInfo::new("client", Role::Client))
                    .await
                    .unwrap();

                for _ in 0..1000 {
                    room.publish(RelayFrame::Data {
                        from: "notary".into(),
                        payload: payload.clone(),
                    });
                }
            });
        })
    });
}

criterion_group!(
    benches,
    bench_operation_encode,
    bench_operation_decode,
    bench_relay_frame_roundtrip,
    bench_channel_send,
    bench_room_publish,
);
criterion_main!(benches);
