use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use spark_channel_buffer::OwnedBuffer;
use tokio::sync::oneshot;

use crate::error::{ChannelError, Defect};

/// 一次操作完成时交回的原始结果：实际传输字节数与（收包时）归还的缓冲。
pub struct Transfer {
    pub(crate) bytes: u64,
    pub(crate) buffer: Option<Box<dyn OwnedBuffer>>,
}

impl Transfer {
    pub(crate) fn bytes(bytes: u64) -> Self {
        Self {
            bytes,
            buffer: None,
        }
    }

    pub(crate) fn with_buffer(bytes: u64, buffer: Box<dyn OwnedBuffer>) -> Self {
        Self {
            bytes,
            buffer: Some(buffer),
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("bytes", &self.bytes)
            .field("buffer", &self.buffer)
            .finish()
    }
}

pub(crate) type Signal = oneshot::Sender<Result<Transfer, ChannelError>>;

/// 单次解析的完成信号，调用方持有的一端。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 入队从不阻塞调用方，结果只能异步交付；`Completion` 是调用方唯一的显式等待点。
///
/// ## 逻辑（How）
/// - 内部为 `tokio::sync::oneshot`，发送端随描述符入队，由执行上下文在终态时解析；
/// - `extract` 把无类型的 [`Transfer`] 还原为调用方期望的类型（字节数、具体缓冲或名称）。
///
/// ## 契约（What）
/// - 每个 `Completion` 恰好对应一次解析；发送端未解析即被丢弃时返回
///   [`Defect::SignalDropped`]；
/// - `try_resolve` 提供非阻塞查询，尚未解析时返回 `None`。
#[must_use = "completion signals report success or failure of the queued operation"]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<Transfer, ChannelError>>,
    extract: fn(Transfer) -> Result<T, ChannelError>,
}

impl<T> Completion<T> {
    pub(crate) fn channel(extract: fn(Transfer) -> Result<T, ChannelError>) -> (Signal, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx, extract })
    }

    /// 非阻塞地查询结果。
    pub fn try_resolve(&mut self) -> Option<Result<T, ChannelError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result.and_then(self.extract)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Defect::SignalDropped.into())),
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, ChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result.and_then(this.extract)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Defect::SignalDropped.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

pub(crate) fn transferred_bytes(transfer: Transfer) -> Result<u64, ChannelError> {
    Ok(transfer.bytes)
}

pub(crate) fn unit(_: Transfer) -> Result<(), ChannelError> {
    Ok(())
}

pub(crate) fn returned_buffer<B: OwnedBuffer>(transfer: Transfer) -> Result<B, ChannelError> {
    let buffer = transfer.buffer.ok_or(Defect::BufferTypeMismatch)?;
    buffer
        .into_any()
        .downcast::<B>()
        .map(|buffer| *buffer)
        .map_err(|_| Defect::BufferTypeMismatch.into())
}
