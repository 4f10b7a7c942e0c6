//! `socket_contract` 集成测试：以内存双工流充当对端，验证端点的排队、计数与失败传播契约。
//!
//! # 测试目标（Why）
//! - 同一方向的操作必须按入队顺序上线，在途字节在全部完成后回到基线；
//! - 流失败只影响当前及其后排队的操作，且按入队顺序失败；
//! - 协议不匹配只影响当前操作，后续帧仍然可读；
//! - 关闭与停止之后的入队同步失败。
//!
//! # 结构安排（How）
//! - `tokio::io::duplex` 的一端交给 [`ChannelSocket`]，另一端由测试手工读写长度头与负载；
//! - 通过缩小双工缓冲并丢弃对端，在传输途中注入 `BrokenPipe`；
//! - 默认 `#[tokio::test]` 为单线程运行时，入队到首次让出之间执行上下文不会运行，
//!   因此在途字节的历史最大值是确定的。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spark_channel::buffer::{BoxedChannelBuffer, MoveChannelBuffer, SharedChannelBuffer};
use spark_channel::{
    ChannelConfig, ChannelError, ChannelSocket, Direction, ErrorKind, IoService, IoServiceConfig,
    Outcome, SendPressure, encode_header,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing_test::traced_test;

fn endpoint(max_buf: usize, config: ChannelConfig) -> (ChannelSocket, DuplexStream) {
    let (local, peer) = tokio::io::duplex(max_buf);
    let socket = ChannelSocket::new(&IoService::current(), local, config).expect("配置合法");
    (socket, peer)
}

async fn read_frame(peer: &mut DuplexStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    peer.read_exact(&mut header).await.expect("长度头完整");
    let mut payload = vec![0u8; u32::from_ne_bytes(header) as usize];
    peer.read_exact(&mut payload).await.expect("负载完整");
    payload
}

async fn write_frame(peer: &mut DuplexStream, payload: &[u8]) {
    let len = u32::try_from(payload.len()).expect("测试负载较小");
    peer.write_all(&encode_header(len)).await.expect("写入长度头");
    peer.write_all(payload).await.expect("写入负载");
}

#[tokio::test]
async fn sends_leave_in_enqueue_order_and_release_in_flight() {
    let (socket, mut peer) = endpoint(1024, ChannelConfig::default());
    let baseline = socket.stats().in_flight_bytes;

    let completions: Vec<_> = (1u8..=5)
        .map(|n| socket.send(MoveChannelBuffer::new(vec![n; usize::from(n)])).expect("队列开放"))
        .collect();
    assert_eq!(socket.stats().in_flight_bytes, baseline + 15);

    for n in 1u8..=5 {
        assert_eq!(read_frame(&mut peer).await, vec![n; usize::from(n)]);
    }
    for (expected, completion) in (1u64..=5).zip(completions) {
        assert_eq!(completion.await.expect("发送成功"), expected);
    }

    let stats = socket.stats();
    assert_eq!(stats.in_flight_bytes, baseline);
    assert_eq!(stats.max_in_flight_bytes, 15);
    assert_eq!(stats.total_sent, 15);
}

#[tokio::test]
async fn stream_failure_cascades_to_queued_sends_in_order() {
    let (socket, mut peer) = endpoint(4, ChannelConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut completions = Vec::new();
    for index in 0u8..4 {
        let log = Arc::clone(&log);
        let completion = socket
            .send_with_callback(MoveChannelBuffer::new([index; 8]), move |outcome| {
                log.lock().expect("锁未中毒").push((index, outcome));
            })
            .expect("队列开放");
        completions.push(completion);
    }

    assert_eq!(read_frame(&mut peer).await, vec![0u8; 8]);
    let mut completions = completions.into_iter();
    let first = completions.next().expect("第一个完成信号");
    assert_eq!(first.await.expect("第一帧已送达"), 8);

    drop(peer);
    for completion in completions {
        let err = completion.await.expect_err("流已断开");
        assert_eq!(err.kind(), ErrorKind::StreamFailure);
    }

    let log = log.lock().expect("锁未中毒");
    let order: Vec<u8> = log.iter().map(|(index, _)| *index).collect();
    assert_eq!(order, vec![0, 1, 2, 3], "回调按入队顺序触发");
    assert_eq!(log[0].1, Outcome::Completed { bytes: 8 });
    assert!(log[1..].iter().all(|(_, outcome)| *outcome == Outcome::Failed(ErrorKind::StreamFailure)));

    let stats = socket.stats();
    assert_eq!(stats.in_flight_bytes, 0);
    assert_eq!(stats.total_sent, 8);

    let err = socket.send(MoveChannelBuffer::new([0u8; 1])).expect_err("方向已关闭");
    assert!(matches!(err, ChannelError::QueueClosed { direction: Direction::Send }));
    assert!(!socket.is_closed(Direction::Recv), "另一方向不受影响");
    socket.stop().await.expect("接收方向仍可停止");
}

#[tokio::test]
async fn stream_failure_cascades_to_queued_receives_and_spares_send() {
    let (socket, mut peer) = endpoint(64, ChannelConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut completions = Vec::new();
    for index in 0u8..3 {
        let log = Arc::clone(&log);
        let completion = socket
            .recv_with_callback(MoveChannelBuffer::new([0u8; 4]), move |outcome| {
                log.lock().expect("锁未中毒").push((index, outcome));
            })
            .expect("队列开放");
        completions.push(completion);
    }

    write_frame(&mut peer, &[1u8; 4]).await;
    peer.shutdown().await.expect("关闭对端写半部");

    let mut completions = completions.into_iter();
    let first = completions.next().expect("第一个完成信号");
    assert_eq!(first.await.expect("第一帧已到达").into_inner(), [1u8; 4]);
    for completion in completions {
        let err = completion.await.expect_err("对端已结束写入");
        assert_eq!(err.kind(), ErrorKind::StreamFailure);
    }

    {
        let log = log.lock().expect("锁未中毒");
        let order: Vec<u8> = log.iter().map(|(index, _)| *index).collect();
        assert_eq!(order, vec![0, 1, 2], "回调按入队顺序触发");
        assert_eq!(log[0].1, Outcome::Completed { bytes: 4 });
        assert!(log[1..].iter().all(|(_, outcome)| *outcome == Outcome::Failed(ErrorKind::StreamFailure)));
    }
    assert_eq!(socket.stats().total_received, 4);

    assert!(socket.is_closed(Direction::Recv));
    let err = socket.recv(MoveChannelBuffer::new([0u8; 4])).expect_err("方向已关闭");
    assert!(matches!(err, ChannelError::QueueClosed { direction: Direction::Recv }));

    assert!(!socket.is_closed(Direction::Send), "发送方向不受影响");
    let sent = socket.send(MoveChannelBuffer::new(vec![8u8; 3])).expect("发送队列开放");
    assert_eq!(read_frame(&mut peer).await, vec![8u8; 3]);
    assert_eq!(sent.await.expect("发送成功"), 3);
    socket.stop().await.expect("发送方向仍可停止");
}

#[tokio::test]
async fn broken_send_releases_in_flight_exactly_once() {
    let (socket, mut peer) = endpoint(16, ChannelConfig::default());
    let completion = socket.send(MoveChannelBuffer::new(vec![9u8; 100])).expect("队列开放");
    assert_eq!(socket.stats().in_flight_bytes, 100);

    let mut partial = [0u8; 10];
    peer.read_exact(&mut partial).await.expect("读到部分帧");
    drop(peer);

    let err = completion.await.expect_err("传输途中断流");
    assert!(err.is_stream_failure());
    let stats = socket.stats();
    assert_eq!(stats.in_flight_bytes, 0);
    assert_eq!(stats.max_in_flight_bytes, 100);
    assert_eq!(stats.total_sent, 0);
}

#[tokio::test]
async fn close_send_behind_queued_sends_then_rejects() {
    let (socket, mut peer) = endpoint(256, ChannelConfig::default());
    let sends: Vec<_> = (0u8..3)
        .map(|n| socket.send(MoveChannelBuffer::new(vec![n; 4])).expect("队列开放"))
        .collect();
    let closed = socket.close(Direction::Send).expect("关闭可入队");

    assert!(socket.is_closed(Direction::Send));
    let err = socket.send(MoveChannelBuffer::new(vec![7u8; 4])).expect_err("关闭之后");
    assert_eq!(err.kind(), ErrorKind::QueueClosed);

    for send in sends {
        assert_eq!(send.await.expect("排在关闭之前的发送照常执行"), 4);
    }
    closed.await.expect("写半部已关闭");

    for n in 0u8..3 {
        assert_eq!(read_frame(&mut peer).await, vec![n; 4]);
    }
    let mut rest = Vec::new();
    peer.read_to_end(&mut rest).await.expect("对端读到 EOF");
    assert!(rest.is_empty(), "关闭操作不产生线上字节");
    assert_eq!(socket.stats().in_flight_bytes, 0);
    socket.stop().await.expect("接收方向仍可停止");
}

#[tokio::test]
async fn borrowed_receive_resizes_to_announced_length() {
    let (socket, mut peer) = endpoint(64, ChannelConfig::default());
    write_frame(&mut peer, &[7u8; 12]).await;
    write_frame(&mut peer, &[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]).await;

    let mut bytes: Vec<u8> = Vec::new();
    assert_eq!(socket.recv_into(&mut bytes).await.expect("可变长容器"), 12);
    assert_eq!(bytes, vec![7u8; 12]);
    assert_eq!(socket.stats().total_received, 12);

    let mut words: Vec<u32> = vec![0; 1];
    assert_eq!(socket.recv_into(&mut words).await.expect("整数倍宽度"), 12);
    assert_eq!(words, vec![u32::from_ne_bytes([1, 0, 0, 0]), u32::from_ne_bytes([2, 0, 0, 0]), u32::from_ne_bytes([3, 0, 0, 0])]);
    assert_eq!(socket.stats().total_received, 24);
}

#[tokio::test]
async fn partial_element_length_is_rejected_and_stream_stays_framed() {
    let (socket, mut peer) = endpoint(64, ChannelConfig::default());
    write_frame(&mut peer, &[0xAB; 12]).await;
    write_frame(&mut peer, &[5u8; 16]).await;

    let mut wide: Vec<u64> = Vec::new();
    let err = socket.recv_into(&mut wide).await.expect_err("12 不是 8 的整数倍");
    assert!(matches!(err, ChannelError::ResizeRejected { announced: 12, .. }));
    assert!(wide.is_empty());

    assert_eq!(socket.recv_into(&mut wide).await.expect("下一帧"), 16);
    assert_eq!(wide.len(), 2);
    assert_eq!(socket.stats().total_received, 16);
}

#[tokio::test]
async fn fixed_destination_rejects_other_lengths_untouched() {
    let (socket, mut peer) = endpoint(64, ChannelConfig::default());
    write_frame(&mut peer, &[1u8; 16]).await;
    write_frame(&mut peer, &[2u8; 8]).await;

    let mut fixed = [0u8; 8];
    let err = socket.recv_exact(&mut fixed).await.expect_err("宣告 16 字节");
    assert_eq!(err.kind(), ErrorKind::ProtocolMismatch);
    assert!(matches!(err, ChannelError::LengthMismatch { expected: 8, announced: 16 }));
    assert_eq!(fixed, [0u8; 8], "目标不被触碰");
    assert_eq!(socket.stats().total_received, 0);

    assert_eq!(socket.recv_exact(&mut fixed).await.expect("长度一致"), 8);
    assert_eq!(fixed, [2u8; 8]);
    assert_eq!(socket.stats().total_received, 8);
}

#[tokio::test]
async fn owned_receive_returns_the_same_buffer() {
    let (socket, mut peer) = endpoint(64, ChannelConfig::default());
    write_frame(&mut peer, &[3u8; 4]).await;
    write_frame(&mut peer, &[4u8; 6]).await;
    write_frame(&mut peer, &[5u8; 2]).await;
    write_frame(&mut peer, &[6u8; 2]).await;

    let moved = socket.recv(MoveChannelBuffer::new([0u8; 4])).expect("队列开放");
    let rejected = socket.recv(BoxedChannelBuffer::new(Box::new(vec![0u8; 2]))).expect("队列开放");
    let boxed = socket.recv(BoxedChannelBuffer::new(Box::new(vec![0u8; 2]))).expect("队列开放");
    let shared = socket.recv(SharedChannelBuffer::new(Arc::new(vec![0u8; 2]))).expect("队列开放");

    assert_eq!(moved.await.expect("尺寸一致").into_inner(), [3u8; 4]);
    let err = rejected.await.expect_err("持有型变体不可扩容");
    assert!(matches!(err, ChannelError::ResizeRejected { announced: 6, .. }));
    assert_eq!(*boxed.await.expect("尺寸一致").into_inner(), vec![5u8; 2]);
    let shared = shared.await.expect("唯一持有时可写").into_inner();
    assert_eq!(*shared, vec![6u8; 2]);
    assert_eq!(socket.stats().total_received, 8);
}

#[tokio::test]
async fn oversized_frame_is_drained_and_rejected() {
    let config = ChannelConfig {
        max_frame_len: 4,
        ..ChannelConfig::default()
    };
    let (socket, mut peer) = endpoint(64, config);
    write_frame(&mut peer, &[0u8; 10]).await;
    write_frame(&mut peer, &[8u8; 3]).await;

    let mut first: Vec<u8> = Vec::new();
    let err = socket.recv_into(&mut first).await.expect_err("超过上限");
    assert!(matches!(err, ChannelError::FrameTooLarge { len: 10, limit: 4 }));
    assert!(first.is_empty());

    let mut second: Vec<u8> = Vec::new();
    assert_eq!(socket.recv_into(&mut second).await.expect("下一帧"), 3);
    assert_eq!(second, vec![8u8; 3]);
}

#[tokio::test]
async fn names_round_trip_and_invalid_utf8_is_rejected() {
    let (local, remote) = tokio::io::duplex(64);
    let service = IoService::current();
    let a = ChannelSocket::new(&service, local, ChannelConfig::default()).expect("配置合法");
    let b = ChannelSocket::new(&service, remote, ChannelConfig::default()).expect("配置合法");

    let sent = a.send_name("通道-alpha").expect("队列开放");
    assert_eq!(b.recv_name().await.expect("合法名称"), "通道-alpha");
    assert_eq!(sent.await.expect("发送成功"), "通道-alpha".len() as u64);

    let sent = a.send(MoveChannelBuffer::new(vec![0xFFu8, 0xFE])).expect("队列开放");
    let err = b.recv_name().await.expect_err("非 UTF-8");
    assert!(matches!(err, ChannelError::InvalidName(_)));
    assert_eq!(err.kind(), ErrorKind::ProtocolMismatch);
    sent.await.expect("发送成功");
    assert_eq!(b.stats().total_received, "通道-alpha".len() as u64);

    a.stop().await.expect("停止");
    b.stop().await.expect("停止");
}

#[tokio::test]
async fn borrowed_send_writes_caller_container() {
    let (socket, mut peer) = endpoint(64, ChannelConfig::default());
    let words: [u16; 3] = [1, 2, 3];
    let queued = socket.send(MoveChannelBuffer::new([9u8; 2])).expect("队列开放");

    assert_eq!(socket.send_ref(&words).await.expect("借用发送"), 6);
    assert_eq!(queued.await.expect("先入队者先完成"), 2);

    assert_eq!(read_frame(&mut peer).await, vec![9u8; 2]);
    let expected: Vec<u8> = words.iter().flat_map(|word| word.to_ne_bytes()).collect();
    assert_eq!(read_frame(&mut peer).await, expected);
    assert_eq!(socket.stats().total_sent, 8);
}

#[tokio::test]
async fn abandoned_lease_fails_the_direction() {
    let (socket, mut peer) = endpoint(64, ChannelConfig::default());
    peer.write_all(&encode_header(8)).await.expect("写入长度头");
    peer.write_all(&[1, 2]).await.expect("只写入部分负载");

    let mut destination: Vec<u8> = Vec::new();
    let attempt = tokio::time::timeout(Duration::from_millis(50), socket.recv_into(&mut destination)).await;
    assert!(attempt.is_err(), "负载不完整，借用收包不会完成");

    for _ in 0..200 {
        if socket.is_closed(Direction::Recv) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(socket.is_closed(Direction::Recv), "丢失读半部即视为流失败");
    let err = socket.recv(MoveChannelBuffer::new([0u8; 1])).expect_err("方向已关闭");
    assert_eq!(err.kind(), ErrorKind::QueueClosed);
    socket.stop().await.expect("发送方向仍可停止");
}

#[tokio::test]
async fn send_pressure_follows_watermarks() {
    let config = ChannelConfig {
        send_low_watermark: 4,
        send_high_watermark: 8,
        ..ChannelConfig::default()
    };
    let (socket, mut peer) = endpoint(64, config);
    assert_eq!(socket.send_pressure(), SendPressure::Ready);

    let first = socket.send(MoveChannelBuffer::new([0u8; 4])).expect("队列开放");
    assert_eq!(socket.send_pressure(), SendPressure::Busy { in_flight: 4 });
    let second = socket.send(MoveChannelBuffer::new([0u8; 4])).expect("队列开放");
    assert_eq!(socket.send_pressure(), SendPressure::Saturated { in_flight: 8 });

    read_frame(&mut peer).await;
    read_frame(&mut peer).await;
    first.await.expect("发送成功");
    second.await.expect("发送成功");
    assert_eq!(socket.send_pressure(), SendPressure::Ready);

    socket.reset_stats();
    let stats = socket.stats();
    assert_eq!(stats.total_sent, 0);
    assert_eq!(stats.max_in_flight_bytes, 0);
}

#[tokio::test]
async fn stop_rejects_both_directions() {
    let (socket, _peer) = endpoint(64, ChannelConfig::default());
    socket.stop().await.expect("空闲端点可停止");
    assert!(socket.is_stopped());

    let send = socket.send(MoveChannelBuffer::new([0u8; 1])).expect_err("已停止");
    assert!(matches!(send, ChannelError::QueueClosed { direction: Direction::Send }));
    let recv = socket.recv(MoveChannelBuffer::new([0u8; 1])).expect_err("已停止");
    assert!(matches!(recv, ChannelError::QueueClosed { direction: Direction::Recv }));
    socket.stop().await.expect("重复停止无副作用");
}

#[cfg(debug_assertions)]
#[tokio::test]
#[should_panic(expected = "dropped with queued operations")]
async fn dropping_socket_with_queued_operations_is_a_defect() {
    let (socket, _peer) = endpoint(64, ChannelConfig::default());
    let _first = socket.recv(MoveChannelBuffer::new([0u8; 1])).expect("队列开放");
    let _second = socket.recv(MoveChannelBuffer::new([0u8; 1])).expect("队列开放");
    drop(socket);
}

#[tokio::test]
#[traced_test]
async fn stream_failure_is_logged() {
    let (socket, peer) = endpoint(8, ChannelConfig::default());
    drop(peer);
    let completion = socket.send(MoveChannelBuffer::new([1u8; 32])).expect("队列开放");
    completion.await.expect_err("对端已关闭");
    assert!(logs_contain("stream failure, aborting queued operations"));
    socket.stop().await.expect("接收方向仍可停止");
}

#[tokio::test]
async fn tcp_endpoints_exchange_names() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("绑定回环地址");
    let addr = listener.local_addr().expect("本地地址");
    let service = IoService::current();

    let (client, accepted) = tokio::join!(
        ChannelSocket::connect(&service, addr, ChannelConfig::default()),
        listener.accept()
    );
    let client = client.expect("建立连接");
    let (stream, _) = accepted.expect("接受连接");
    let server = ChannelSocket::from_tcp(&service, stream, ChannelConfig::default()).expect("包装连接");

    let sent = client.send_name("party-1").expect("队列开放");
    assert_eq!(server.recv_name().await.expect("收到名称"), "party-1");
    sent.await.expect("发送成功");

    client.stop().await.expect("停止");
    server.stop().await.expect("停止");
}

#[test]
fn owned_io_service_drives_endpoint_from_blocking_code() {
    let config = IoServiceConfig {
        worker_threads: Some(1),
        ..IoServiceConfig::default()
    };
    let service = IoService::new(&config).expect("构建运行时");
    let received = service.block_on(async {
        let (local, mut peer) = tokio::io::duplex(64);
        let socket = ChannelSocket::new(&service, local, ChannelConfig::default()).expect("配置合法");
        write_frame(&mut peer, b"ping").await;
        let mut buffer: Vec<u8> = Vec::new();
        socket.recv_into(&mut buffer).await.expect("收包成功");
        socket.stop().await.expect("停止");
        buffer
    });
    assert_eq!(received, b"ping");
}
