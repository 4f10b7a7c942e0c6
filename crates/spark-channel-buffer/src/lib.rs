//! `spark-channel-buffer` 提供通道收发所需的类型擦除缓冲适配器。
//!
//! # 模块定位（Why）
//! - 通道层只关心“一段可读/可写的字节区间”，而调用方手里的往往是 `Vec<u64>`、`Box<[u32]>`、
//!   `Arc<BytesMut>` 等各式容器；若在传输层为每种容器写一遍收发逻辑，代价不可接受。
//! - 本 crate 把“容器 + 所有权策略”统一折叠为 [`ChannelBuffer`] trait 对象，
//!   使 `spark-channel` 的操作队列可以在不知道具体类型的前提下完成零拷贝收发。
//!
//! # 设计概要（How）
//! - `container` 模块定义元素与容器能力：[`PlainData`] 限定可按字节重解释的元素，
//!   [`Container`] / [`ResizableContainer`] 在编译期区分“可变长”与“定长”容器；
//! - `adapter` 模块定义 [`ChannelBuffer`] 契约与 [`BufferKind`]，扩容策略是变体的静态属性；
//! - `owned` 与 `borrowed` 模块分别实现三种持有型变体与一种借用型变体，四者构成封闭集合。
//!
//! # 命名约定（Consistency）
//! - 变体统一以 `*ChannelBuffer` 结尾：`MoveChannelBuffer`、`BoxedChannelBuffer`、
//!   `SharedChannelBuffer`、`RefChannelBuffer`，与 `BufferKind` 的四个分支一一对应。

mod adapter;
mod borrowed;
mod container;
mod owned;

pub use adapter::{BufferKind, ChannelBuffer, OwnedBuffer};
pub use borrowed::RefChannelBuffer;
pub use container::{Container, PlainData, ResizableContainer, element_width};
pub use owned::{BoxedChannelBuffer, MoveChannelBuffer, SharedChannelBuffer};
