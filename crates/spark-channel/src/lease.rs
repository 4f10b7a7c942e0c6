//! 流半部租借：让借用型缓冲在不满足 `'static` 的前提下仍按队列顺序执行。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 方向执行上下文是一个独立的 Tokio 任务，只能持有 `'static` 数据；
//!   而 [`RefChannelBuffer`](spark_channel_buffer::RefChannelBuffer) 借用的是调用方栈上的容器。
//! - 与其擦除生命周期，不如反过来把“流半部”在轮到该操作时借给调用方的 future，
//!   由调用方在自己的借用范围内完成读写，再把半部连同结果交还。
//!
//! ## 逻辑（How）
//! 1. 描述符携带 [`LeaseSlot`] 入队；
//! 2. 执行上下文轮到该操作时（收包方向先读完长度头）通过槽位送出 [`RecvLease`] / [`SendLease`]；
//! 3. 调用方完成 IO 后经 `give_back` 交还 [`Returned`]，执行上下文据此更新计数并解析完成信号。
//!
//! ## 注意事项（Trade-offs）
//! - 调用方 future 若在持有半部期间被丢弃，半部随之丢失且流位置未知，
//!   执行上下文将其视为流失败并级联失败该方向剩余操作。

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::error::ChannelError;

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 交还给执行上下文的流半部与本次传输结果。
pub(crate) struct Returned<H> {
    pub(crate) half: H,
    pub(crate) result: Result<u64, ChannelError>,
}

/// 收包租约：长度头已由执行上下文读出。
pub(crate) struct RecvLease {
    pub(crate) reader: BoxedReader,
    pub(crate) announced: u32,
    pub(crate) give_back: oneshot::Sender<Returned<BoxedReader>>,
}

/// 发包租约：调用方负责写出长度头与负载。
pub(crate) struct SendLease {
    pub(crate) writer: BoxedWriter,
    pub(crate) give_back: oneshot::Sender<Returned<BoxedWriter>>,
}

pub(crate) enum LeaseSlot {
    Recv(oneshot::Sender<RecvLease>),
    Send(oneshot::Sender<SendLease>),
}
