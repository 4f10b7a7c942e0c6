use core::any::Any;
use core::fmt;

/// `BufferKind` 枚举四种所有权策略，扩容策略由变体静态决定。
///
/// # 设计动机（Why）
/// - 类型擦除之后，通道层只能通过 trait 对象与缓冲交互；若扩容能力挂在实例上，
///   同一类型的两个实例可能给出不同答案，收包路径将无法预先判断能否按对端长度调整。
/// - 将策略收敛到封闭枚举并以 `const fn` 暴露，保证“同一变体永远同一策略”。
///
/// # 契约说明（What）
/// - `Owned`：按值持有容器；
/// - `Boxed`：持有独占的 `Box<C>`；
/// - `Shared`：持有共享的 `Arc<C>`，其他持有者可能同时观察数据；
/// - `Borrowed`：持有调用方容器的 `&mut C`，仅此变体允许扩容。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Owned,
    Boxed,
    Shared,
    Borrowed,
}

impl BufferKind {
    /// 变体是否允许 `resize`。
    pub const fn is_resizable(self) -> bool {
        matches!(self, BufferKind::Borrowed)
    }

    /// 稳定的小写名称，用于日志字段与错误文案。
    pub const fn as_str(self) -> &'static str {
        match self {
            BufferKind::Owned => "owned",
            BufferKind::Boxed => "boxed",
            BufferKind::Shared => "shared",
            BufferKind::Borrowed => "borrowed",
        }
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通道收发使用的类型擦除缓冲契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 让操作描述符只持有 `Box<dyn ChannelBuffer>`，即可对任意元素类型的容器执行
///   “读取长度 → 调整大小 → 读写字节”的流程。
///
/// ## 契约（What）
/// - `data`：返回容器当前元素区间的字节视图；借用变体的视图仅在调用方未以其他方式修改容器时有效，
///   这一点由 `&mut` 借用在编译期保证；
/// - `data_mut`：返回可写字节视图；若变体无法获得独占访问（共享持有且存在其他持有者）则为 `None`；
/// - `size`：字节长度，恒等于 `元素个数 * 元素字节宽度`，每次调用都从容器重新计算；
/// - `resize`：按字节调整容器大小。策略不允许或 `bytes` 不是元素宽度整数倍时返回 `false`，
///   且不产生任何副作用；成功时返回 `true` 并保证随后 `size() == bytes`。
///
/// ## 注意事项（Trade-offs）
/// - trait 保持对象安全，不暴露元素类型；需要取回具体容器的场景使用 [`OwnedBuffer::into_any`]。
pub trait ChannelBuffer: Send {
    /// 变体种类。
    fn kind(&self) -> BufferKind;

    /// 只读字节视图。
    fn data(&self) -> &[u8];

    /// 可写字节视图。
    fn data_mut(&mut self) -> Option<&mut [u8]>;

    /// 当前字节长度。
    fn size(&self) -> u64;

    /// 按字节调整大小。
    fn resize(&mut self, bytes: u64) -> bool;

    /// 变体的静态扩容策略。
    fn is_resizable(&self) -> bool {
        self.kind().is_resizable()
    }
}

/// 可脱离调用栈、随操作描述符入队的缓冲。
///
/// 所有 `'static` 的 [`ChannelBuffer`] 自动实现本 trait；`into_any` 让完成路径把擦除后的缓冲
/// 交还调用方，再由调用方向下转型为具体变体。
pub trait OwnedBuffer: ChannelBuffer + 'static {
    /// 转换为 `Any`，供完成路径向下转型。
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> OwnedBuffer for T
where
    T: ChannelBuffer + 'static,
{
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl fmt::Debug for dyn OwnedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedBuffer")
            .field("kind", &self.kind())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_borrowed_kind_is_resizable() {
        assert!(!BufferKind::Owned.is_resizable());
        assert!(!BufferKind::Boxed.is_resizable());
        assert!(!BufferKind::Shared.is_resizable());
        assert!(BufferKind::Borrowed.is_resizable());
    }

    #[test]
    fn kind_display_matches_as_str() {
        assert_eq!(BufferKind::Shared.to_string(), "shared");
        assert_eq!(BufferKind::Borrowed.as_str(), "borrowed");
    }
}
