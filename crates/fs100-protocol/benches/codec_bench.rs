//! 编解码性能基准测试
//!
//! 流式发送时每个轨迹点都要编码一次、每个应答解码一次。

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use fs100_protocol::{
    Body, ByteOrder, Codec, Frame, JointTrajPtFull, MotionReply, MotionReplyResult, ReplyType,
    TrajectoryPoint,
};

fn trajectory_frame() -> Frame {
    let point = TrajectoryPoint::new([0.1, 0.2, 0.3, 0.4, 0.5, 0.6], [0.01; 6], 0.05);
    Frame::request(Body::JointTrajPtFull(JointTrajPtFull::from_point(42, &point, 1.25)))
}

fn reply_frame() -> Frame {
    Frame::reply(
        Body::MotionReply(MotionReply::new(42, 14, MotionReplyResult::Success, 0)),
        ReplyType::Success,
    )
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_trajectory_point");
    let frame = trajectory_frame();
    for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
        let codec = Codec::new(order);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", order)), &frame, |b, f| {
            b.iter(|| black_box(codec.encode(black_box(f))))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let codec = Codec::default();
    let bytes = codec.encode(&reply_frame());
    c.bench_function("decode_motion_reply", |b| {
        b.iter(|| black_box(codec.decode(black_box(&bytes))))
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
