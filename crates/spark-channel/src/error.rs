use spark_channel_buffer::BufferKind;
use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

use crate::operation::Direction;

/// 错误四分类，决定错误的传播方式。
///
/// - `ProtocolMismatch`：仅使当前操作失败，流保持成帧；
/// - `StreamFailure`：当前操作及其后同方向排队的操作按序级联失败；
/// - `QueueClosed`：入队时同步返回；
/// - `Defect`：生命周期不变量被破坏，属于编程错误。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProtocolMismatch,
    StreamFailure,
    QueueClosed,
    Defect,
}

/// 生命周期缺陷，出现即说明调用方或实现违反了描述符/端点契约。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Defect {
    #[error("completion resolved more than once")]
    DoubleCompletion,
    #[error("completion signal dropped before resolution")]
    SignalDropped,
    #[error("descriptor reused while its completion signal is pending")]
    PendingSignal,
    #[error("completed buffer does not match the requested variant")]
    BufferTypeMismatch,
    #[error("illegal operation state transition")]
    IllegalTransition,
}

/// 通道层统一错误类型。
///
/// # 教案式说明
/// - **意图（Why）**：调用方只通过完成信号观察失败，因此错误必须自带分类与稳定错误码，
///   以便上层重试策略按 [`ErrorKind`] 决策，而不是匹配文案。
/// - **契约（What）**：[`ChannelError::kind`] 返回四分类之一；[`ChannelError::code`] 返回
///   `spark.channel.*` 形式的稳定错误码。
#[derive(Debug, Error)]
pub enum ChannelError {
    /// 定长目标与对端宣告的长度不一致。
    #[error("announced length {announced} does not match fixed destination of {expected} bytes")]
    LengthMismatch { expected: u64, announced: u32 },
    /// 适配器拒绝调整到宣告长度。
    #[error("{buffer} buffer rejected resize to {announced} bytes")]
    ResizeRejected { announced: u32, buffer: BufferKind },
    /// 适配器无法交出可写视图。
    #[error("{buffer} buffer is not writable")]
    BufferNotWritable { buffer: BufferKind },
    /// 对端宣告的长度超过配置上限。
    #[error("announced frame of {len} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { len: u32, limit: u32 },
    /// 待发送负载无法用 4 字节长度头表示。
    #[error("payload of {len} bytes does not fit the 4-byte length header")]
    PayloadTooLarge { len: u64 },
    /// 通道名称不是合法 UTF-8。
    #[error("channel name is not valid utf-8: {0}")]
    InvalidName(#[source] FromUtf8Error),
    /// 底层流读写失败。
    #[error("{op} failed: {source}")]
    Stream {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    /// 前序操作遭遇流失败，本操作未执行即被级联失败。
    #[error("aborted after an earlier stream failure ({kind})")]
    StreamAborted { kind: io::ErrorKind },
    /// 借出流半部的调用方在归还前被丢弃。
    #[error("stream lease abandoned before it was returned")]
    LeaseAbandoned,
    /// 方向已关闭或端点已停止。
    #[error("{direction} queue is closed")]
    QueueClosed { direction: Direction },
    #[error("lifecycle defect: {0}")]
    Defect(#[from] Defect),
}

impl ChannelError {
    pub(crate) fn stream(op: &'static str, source: io::Error) -> Self {
        ChannelError::Stream { op, source }
    }

    /// 错误所属分类。
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::LengthMismatch { .. }
            | ChannelError::ResizeRejected { .. }
            | ChannelError::BufferNotWritable { .. }
            | ChannelError::FrameTooLarge { .. }
            | ChannelError::PayloadTooLarge { .. }
            | ChannelError::InvalidName(_) => ErrorKind::ProtocolMismatch,
            ChannelError::Stream { .. }
            | ChannelError::StreamAborted { .. }
            | ChannelError::LeaseAbandoned => ErrorKind::StreamFailure,
            ChannelError::QueueClosed { .. } => ErrorKind::QueueClosed,
            ChannelError::Defect(_) => ErrorKind::Defect,
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::LengthMismatch { .. } => "spark.channel.length_mismatch",
            ChannelError::ResizeRejected { .. } => "spark.channel.resize_rejected",
            ChannelError::BufferNotWritable { .. } => "spark.channel.buffer_not_writable",
            ChannelError::FrameTooLarge { .. } => "spark.channel.frame_too_large",
            ChannelError::PayloadTooLarge { .. } => "spark.channel.payload_too_large",
            ChannelError::InvalidName(_) => "spark.channel.invalid_name",
            ChannelError::Stream { .. } => "spark.channel.stream_failed",
            ChannelError::StreamAborted { .. } => "spark.channel.stream_aborted",
            ChannelError::LeaseAbandoned => "spark.channel.lease_abandoned",
            ChannelError::QueueClosed { .. } => "spark.channel.queue_closed",
            ChannelError::Defect(_) => "spark.channel.defect",
        }
    }

    /// 级联失败时沿用的 IO 错误类别。
    pub(crate) fn io_kind(&self) -> io::ErrorKind {
        match self {
            ChannelError::Stream { source, .. } => source.kind(),
            ChannelError::StreamAborted { kind } => *kind,
            _ => io::ErrorKind::Other,
        }
    }

    pub fn is_stream_failure(&self) -> bool {
        self.kind() == ErrorKind::StreamFailure
    }
}
