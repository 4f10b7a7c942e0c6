//! 三种持有型变体：按值、独占间接、共享间接。
//!
//! 三者在类型擦除后都失去了安全的重新分配路径，因此 `resize` 一律返回 `false`；
//! 共享变体额外受制于“其他持有者可能观察到扩容”，只在独占时交出可写视图。

use std::sync::Arc;

use crate::adapter::{BufferKind, ChannelBuffer};
use crate::container::{Container, byte_len, bytes_of, bytes_of_mut};

/// 按值持有容器的适配器。
///
/// # 契约（What）
/// - 构造即转移容器所有权，容量与身份在此后固定；
/// - `into_inner` 在收包完成后把容器交还调用方。
#[derive(Debug)]
pub struct MoveChannelBuffer<C> {
    inner: C,
}

impl<C: Container> MoveChannelBuffer<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn get(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Container> From<C> for MoveChannelBuffer<C> {
    fn from(inner: C) -> Self {
        Self::new(inner)
    }
}

impl<C: Container> ChannelBuffer for MoveChannelBuffer<C> {
    fn kind(&self) -> BufferKind {
        BufferKind::Owned
    }

    fn data(&self) -> &[u8] {
        bytes_of(self.inner.elements())
    }

    fn data_mut(&mut self) -> Option<&mut [u8]> {
        Some(bytes_of_mut(self.inner.elements_mut()))
    }

    fn size(&self) -> u64 {
        byte_len(&self.inner)
    }

    fn resize(&mut self, _bytes: u64) -> bool {
        false
    }
}

/// 持有 `Box<C>` 的独占间接适配器，间接层不带来扩容能力。
#[derive(Debug)]
pub struct BoxedChannelBuffer<C> {
    inner: Box<C>,
}

impl<C: Container> BoxedChannelBuffer<C> {
    pub fn new(inner: Box<C>) -> Self {
        Self { inner }
    }

    pub fn get(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> Box<C> {
        self.inner
    }
}

impl<C: Container> From<Box<C>> for BoxedChannelBuffer<C> {
    fn from(inner: Box<C>) -> Self {
        Self::new(inner)
    }
}

impl<C: Container> ChannelBuffer for BoxedChannelBuffer<C> {
    fn kind(&self) -> BufferKind {
        BufferKind::Boxed
    }

    fn data(&self) -> &[u8] {
        bytes_of(self.inner.elements())
    }

    fn data_mut(&mut self) -> Option<&mut [u8]> {
        Some(bytes_of_mut(self.inner.elements_mut()))
    }

    fn size(&self) -> u64 {
        byte_len(&*self.inner)
    }

    fn resize(&mut self, _bytes: u64) -> bool {
        false
    }
}

/// 持有 `Arc<C>` 的共享间接适配器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 同一份负载常被广播到多个通道（例如多方协议中的公共消息），共享持有避免逐通道复制。
///
/// ## 契约（What）
/// - `resize` 恒为 `false`：其他持有者会把扩容观察为数据损坏；
/// - `data_mut` 仅在 `Arc` 强/弱引用计数均为 1 时返回 `Some`，否则为 `None`，
///   因此共享缓冲通常只用于发送。
///
/// ## 注意事项（Trade-offs）
/// - 需要 `C: Sync` 才能让 `Arc<C>` 跨线程移动，`Vec`、`Box<[T]>` 与 `BytesMut` 均满足。
#[derive(Debug)]
pub struct SharedChannelBuffer<C> {
    inner: Arc<C>,
}

impl<C: Container + Sync> SharedChannelBuffer<C> {
    pub fn new(inner: Arc<C>) -> Self {
        Self { inner }
    }

    pub fn get(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> Arc<C> {
        self.inner
    }
}

impl<C: Container + Sync> From<Arc<C>> for SharedChannelBuffer<C> {
    fn from(inner: Arc<C>) -> Self {
        Self::new(inner)
    }
}

impl<C: Container + Sync> ChannelBuffer for SharedChannelBuffer<C> {
    fn kind(&self) -> BufferKind {
        BufferKind::Shared
    }

    fn data(&self) -> &[u8] {
        bytes_of(self.inner.elements())
    }

    fn data_mut(&mut self) -> Option<&mut [u8]> {
        Arc::get_mut(&mut self.inner).map(|inner| bytes_of_mut(inner.elements_mut()))
    }

    fn size(&self) -> u64 {
        byte_len(&*self.inner)
    }

    fn resize(&mut self, _bytes: u64) -> bool {
        false
    }
}
