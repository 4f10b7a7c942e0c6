use crate::adapter::{BufferKind, ChannelBuffer};
use crate::container::{ResizableContainer, byte_len, bytes_of, bytes_of_mut, resize_bytes};

/// 借用调用方容器的适配器，四种变体中唯一允许扩容的一种。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 收包时调用方通常不知道对端会发多少字节；借用其可变长容器，通道即可在读到长度头后
///   把容器调整到恰好的大小，再直接写入，省去中间缓冲。
///
/// ## 契约（What）
/// - 仅接受 [`ResizableContainer`]，定长容器在编译期即被拒绝；
/// - `resize(n)` 当且仅当 `n` 是元素宽度的整数倍时返回 `true`，随后 `size() == n`；
///   否则返回 `false` 且容器保持原样；
/// - 调用方在适配器存活期间无法以其他方式访问容器，由 `&'a mut` 借用保证。
#[derive(Debug)]
pub struct RefChannelBuffer<'a, C: ?Sized> {
    inner: &'a mut C,
}

impl<'a, C: ResizableContainer + ?Sized> RefChannelBuffer<'a, C> {
    pub fn new(inner: &'a mut C) -> Self {
        Self { inner }
    }

    pub fn get(&self) -> &C {
        self.inner
    }
}

impl<'a, C: ResizableContainer + ?Sized> From<&'a mut C> for RefChannelBuffer<'a, C> {
    fn from(inner: &'a mut C) -> Self {
        Self::new(inner)
    }
}

impl<C: ResizableContainer + ?Sized> ChannelBuffer for RefChannelBuffer<'_, C> {
    fn kind(&self) -> BufferKind {
        BufferKind::Borrowed
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

    fn resize(&mut self, bytes: u64) -> bool {
        resize_bytes(&mut *self.inner, bytes)
    }
}
