use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spark_channel_buffer::{
    Container, MoveChannelBuffer, OwnedBuffer, RefChannelBuffer, ResizableContainer,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::Instrument;

use crate::backpressure::{self, SendPressure};
use crate::completion::Completion;
use crate::config::{ChannelConfig, ConfigError};
use crate::error::{ChannelError, Defect};
use crate::frame::{self, RecvTarget};
use crate::io_service::IoService;
use crate::lease::{BoxedReader, BoxedWriter, RecvLease, Returned, SendLease};
use crate::operation::{Direction, IoOperation, OperationKind, Outcome};
use crate::queue::DirectionQueue;
use crate::stats::{ChannelCounters, ChannelStats};
use crate::worker;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// 端点与两个方向执行上下文共享的状态。
pub(crate) struct SocketShared {
    pub(crate) id: u64,
    pub(crate) send: DirectionQueue,
    pub(crate) recv: DirectionQueue,
    pub(crate) stopped: AtomicBool,
    pub(crate) counters: ChannelCounters,
    pub(crate) config: ChannelConfig,
}

impl SocketShared {
    fn queue(&self, direction: Direction) -> &DirectionQueue {
        match direction {
            Direction::Send => &self.send,
            Direction::Recv => &self.recv,
        }
    }
}

/// 基于字节流的通道端点。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 上层协议只想表达“按顺序发出这些缓冲、按顺序收回这些缓冲”，
///   不关心底层流何时真正完成读写；端点把每个方向的请求排成 FIFO，
///   并以一次性完成信号异步交付结果。
///
/// ## 逻辑 (How)
/// - 构造时把流拆为读/写半部，分别交给两个方向执行上下文（见 `worker` 模块），
///   两个方向互不阻塞；
/// - 所有入队方法最终都走 [`ChannelSocket::submit`]：按描述符方向选择队列，
///   在锁内完成关闭检查与在途字节累加；
/// - 借用调用方容器的操作（`send_ref` / `recv_into` / `recv_exact` / `recv_name`）
///   通过流半部租借在调用方自己的 future 中完成读写，顺序仍由队列保证。
///
/// ## 契约 (What)
/// - 同一方向的操作严格按入队顺序开始，第 N+1 个只在第 N 个终态后开始；
/// - 关闭操作入队后该方向立即拒绝新操作（[`ChannelError::QueueClosed`]），
///   排在它之前的操作照常执行；
/// - 流失败使当前操作与其后排队的操作按序失败，方向随之关闭，另一方向不受影响；
/// - 端点析构时队列非空属于缺陷：记录 `error` 日志并在调试构建中断言。
///
/// ## 注意事项 (Trade-offs)
/// - 端点不可克隆，析构即“销毁端点”；需要跨任务共享时请放入 `Arc`。
pub struct ChannelSocket {
    shared: Arc<SocketShared>,
}

impl ChannelSocket {
    /// 在 `service` 上为任意双向字节流创建端点。
    pub fn new<S>(service: &IoService, stream: S, config: ChannelConfig) -> Result<Self, ConfigError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        config.validate()?;
        let id = NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = tokio::io::split(stream);
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);

        let shared = Arc::new(SocketShared {
            id,
            send: DirectionQueue::new(Direction::Send),
            recv: DirectionQueue::new(Direction::Recv),
            stopped: AtomicBool::new(false),
            counters: ChannelCounters::default(),
            config,
        });

        let send_span = tracing::debug_span!("spark_channel.worker", socket = id, direction = "send");
        let recv_span = tracing::debug_span!("spark_channel.worker", socket = id, direction = "recv");
        service.spawn(worker::run_send(Arc::clone(&shared), writer).instrument(send_span));
        service.spawn(worker::run_recv(Arc::clone(&shared), reader).instrument(recv_span));
        tracing::debug!(socket = id, "channel socket opened");

        Ok(Self { shared })
    }

    /// 包装已建立的 TCP 连接，按配置设置 `TCP_NODELAY`。
    pub fn from_tcp(service: &IoService, stream: TcpStream, config: ChannelConfig) -> io::Result<Self> {
        stream.set_nodelay(config.tcp_nodelay)?;
        Self::new(service, stream, config).map_err(invalid_config)
    }

    /// 建立 TCP 连接并创建端点。
    pub async fn connect<A: ToSocketAddrs>(service: &IoService, addr: A, config: ChannelConfig) -> io::Result<Self> {
        config.validate().map_err(invalid_config)?;
        let stream = TcpStream::connect(addr).await?;
        Self::from_tcp(service, stream, config)
    }

    /// 进程内唯一的端点编号，用于日志关联。
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// 通用入队。
    ///
    /// 方向已关闭或端点已停止时同步返回 [`ChannelError::QueueClosed`]；
    /// 被拒绝的描述符同时以同一错误解析完成信号并调用回调，不会留下悬空的等待者。
    pub fn submit(&self, op: IoOperation) -> Result<(), ChannelError> {
        let direction = op.direction();
        let kind = op.kind();
        let bytes = op.size();
        let queue = self.shared.queue(direction);
        match queue.push(op, &self.shared.stopped, &self.shared.counters) {
            Ok(depth) => {
                tracing::debug!(socket = self.shared.id, %direction, ?kind, bytes, depth, "operation queued");
                Ok(())
            }
            Err(mut rejected) => {
                tracing::debug!(socket = self.shared.id, %direction, ?kind, "enqueue rejected, queue closed");
                let _ = rejected.complete(Err(ChannelError::QueueClosed { direction }));
                Err(ChannelError::QueueClosed { direction })
            }
        }
    }

    /// 发送持有型缓冲，完成时解析为负载字节数。
    pub fn send<B: OwnedBuffer>(&self, buffer: B) -> Result<Completion<u64>, ChannelError> {
        let (op, completion) = IoOperation::send(buffer)?;
        self.submit(op)?;
        Ok(completion)
    }

    pub fn send_with_callback<B, F>(&self, buffer: B, callback: F) -> Result<Completion<u64>, ChannelError>
    where
        B: OwnedBuffer,
        F: FnOnce(Outcome) + Send + 'static,
    {
        let (op, completion) = IoOperation::send(buffer)?;
        self.submit(op.with_callback(callback))?;
        Ok(completion)
    }

    /// 发送借用的容器；轮到该操作时在当前 future 中直接写出。
    pub async fn send_ref<C: Container + ?Sized>(&self, source: &C) -> Result<u64, ChannelError> {
        let payload = source.as_bytes();
        let (op, lease, completion) = IoOperation::lend_send(payload.len() as u64)?;
        self.submit(op)?;
        if let Ok(SendLease { mut writer, give_back }) = lease.await {
            let result = frame::write_frame(&mut writer, payload).await;
            let _ = give_back.send(Returned { half: writer, result });
        }
        completion.await
    }

    /// 发送通道名称（UTF-8 字节）。
    pub fn send_name(&self, name: &str) -> Result<Completion<u64>, ChannelError> {
        self.send(MoveChannelBuffer::new(name.as_bytes().to_vec()))
    }

    /// 以持有型缓冲收包，完成时交还同一缓冲。
    ///
    /// 缓冲尺寸与宣告长度不同时会尝试 `resize`；持有型变体一律拒绝，结果为协议不匹配，
    /// 此时缓冲随描述符一起释放。
    pub fn recv<B: OwnedBuffer>(&self, buffer: B) -> Result<Completion<B>, ChannelError> {
        let (op, completion) = IoOperation::recv(buffer);
        self.submit(op)?;
        Ok(completion)
    }

    pub fn recv_with_callback<B, F>(&self, buffer: B, callback: F) -> Result<Completion<B>, ChannelError>
    where
        B: OwnedBuffer,
        F: FnOnce(Outcome) + Send + 'static,
    {
        let (op, completion) = IoOperation::recv(buffer);
        self.submit(op.with_callback(callback))?;
        Ok(completion)
    }

    /// 收包到可变长容器，容器被调整为宣告长度。
    pub async fn recv_into<C: ResizableContainer + ?Sized>(&self, destination: &mut C) -> Result<u64, ChannelError> {
        let (lease, completion) = self.lease_reader(OperationKind::RecvData).await?;
        if let Some(RecvLease { mut reader, announced, give_back }) = lease {
            let mut adapter = RefChannelBuffer::new(destination);
            let result = frame::read_payload(&mut reader, RecvTarget::Adapter(&mut adapter), announced).await;
            let _ = give_back.send(Returned { half: reader, result });
        }
        completion.await
    }

    /// 收包到定长容器；宣告长度必须等于容器字节长度，否则协议不匹配且容器不被触碰。
    pub async fn recv_exact<C: Container + ?Sized>(&self, destination: &mut C) -> Result<u64, ChannelError> {
        let (lease, completion) = self.lease_reader(OperationKind::RecvData).await?;
        if let Some(RecvLease { mut reader, announced, give_back }) = lease {
            let target = RecvTarget::Fixed(destination.as_bytes_mut());
            let result = frame::read_payload(&mut reader, target, announced).await;
            let _ = give_back.send(Returned { half: reader, result });
        }
        completion.await
    }

    /// 接收对端发来的通道名称并校验 UTF-8。
    pub async fn recv_name(&self) -> Result<String, ChannelError> {
        let (lease, completion) = self.lease_reader(OperationKind::RecvName).await?;
        let mut name = None;
        if let Some(RecvLease { mut reader, announced, give_back }) = lease {
            let mut raw = Vec::new();
            let read = {
                let mut adapter = RefChannelBuffer::new(&mut raw);
                frame::read_payload(&mut reader, RecvTarget::Adapter(&mut adapter), announced).await
            };
            let result = read.and_then(|bytes| match String::from_utf8(raw) {
                Ok(text) => {
                    name = Some(text);
                    Ok(bytes)
                }
                Err(err) => Err(ChannelError::InvalidName(err)),
            });
            let _ = give_back.send(Returned { half: reader, result });
        }
        completion.await?;
        name.ok_or_else(|| Defect::IllegalTransition.into())
    }

    async fn lease_reader(
        &self,
        kind: OperationKind,
    ) -> Result<(Option<RecvLease>, Completion<u64>), ChannelError> {
        let (op, lease, completion) = IoOperation::lend_recv(kind);
        self.submit(op)?;
        Ok((lease.await.ok(), completion))
    }

    /// 半关闭一个方向：发送方向关闭写半部，接收方向释放读半部。
    pub fn close(&self, direction: Direction) -> Result<Completion<()>, ChannelError> {
        let (op, completion) = IoOperation::close(direction);
        self.submit(op)?;
        Ok(completion)
    }

    /// 向两个方向各下发 `CloseThread`，等待两者执行完毕。
    ///
    /// 已经关闭的方向会被跳过；排在前面的操作仍按顺序先执行。
    pub async fn stop(&self) -> Result<(), ChannelError> {
        let mut pending = Vec::with_capacity(2);
        for direction in [Direction::Send, Direction::Recv] {
            let (op, completion) = IoOperation::close_thread(direction);
            match self.submit(op) {
                Ok(()) => pending.push(completion),
                Err(ChannelError::QueueClosed { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        for completion in pending {
            completion.await?;
        }
        self.shared.stopped.store(true, Ordering::Release);
        tracing::debug!(socket = self.shared.id, "channel socket stopped");
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// 方向是否已拒绝新操作。
    pub fn is_closed(&self, direction: Direction) -> bool {
        self.shared.queue(direction).is_closed()
    }

    /// 方向上尚未开始执行的操作数。
    pub fn queued(&self, direction: Direction) -> usize {
        self.shared.queue(direction).len()
    }

    pub fn stats(&self) -> ChannelStats {
        self.shared.counters.snapshot()
    }

    pub fn reset_stats(&self) {
        self.shared.counters.reset();
    }

    /// 以配置的水位线对在途字节分级。
    pub fn send_pressure(&self) -> SendPressure {
        let config = &self.shared.config;
        backpressure::classify(
            self.shared.counters.in_flight(),
            config.send_low_watermark,
            config.send_high_watermark,
        )
    }
}

impl fmt::Debug for ChannelSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSocket")
            .field("id", &self.shared.id)
            .field("stopped", &self.is_stopped())
            .field("queued_send", &self.queued(Direction::Send))
            .field("queued_recv", &self.queued(Direction::Recv))
            .finish()
    }
}

impl Drop for ChannelSocket {
    fn drop(&mut self) {
        let pending = self.shared.send.close() + self.shared.recv.close();
        if pending == 0 || std::thread::panicking() {
            return;
        }
        tracing::error!(
            socket = self.shared.id,
            pending,
            "channel socket dropped with queued operations"
        );
        debug_assert_eq!(pending, 0, "channel socket {} dropped with queued operations", self.shared.id);
    }
}

fn invalid_config(err: ConfigError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err)
}
