#![doc = r#"
# spark-channel

## 设计动机（Why）
- **定位**：该 crate 是安全计算网络层之下的异步通道收发核心：把调用方各式容器的收发请求
  按方向排队，在单个字节流上严格按序执行，并以一次性完成信号异步交付结果。
- **架构角色**：向下只依赖一个可拆分读/写半部的字节流（TCP 或任意 `AsyncRead + AsyncWrite`），
  向上提供 [`ChannelSocket`] 端点；缓冲的所有权差异由 `spark-channel-buffer` 折叠为
  [`ChannelBuffer`](spark_channel_buffer::ChannelBuffer) trait 对象。
- **设计理念**：顺序由结构保证而非由锁维持：每个方向恰好一个执行上下文，
  第 N+1 个操作只在第 N 个进入终态后开始。

## 核心契约（What）
- **线上格式**：每段负载前置 4 字节主机字节序长度头；控制操作不产生任何线上字节；
- **完成语义**：先解析完成信号，再至多调用一次回调；发送完成时在途字节恰好扣减一次；
- **错误分类**：协议不匹配只影响当前操作，流失败按序级联到同方向的剩余操作，
  关闭后的入队同步失败，生命周期缺陷记录为 `error` 日志（见 [`ErrorKind`]）。

## 实现策略（How）
- **执行框架**：[`IoService`] 包装 Tokio 运行时句柄，两个方向各派生一个任务；
- **队列**：`parking_lot::Mutex<VecDeque>` 加 `tokio::sync::Notify`，入队与关闭检查同锁完成；
- **借用缓冲**：借用型操作在轮到自己时租借流半部，于调用方 future 内完成读写再归还；
- **观测**：`tracing` 结构化事件，字段统一为 `socket`、`direction`、`kind`、`bytes`。

## 风险与考量（Trade-offs）
- **无拥塞控制**：入队永不阻塞，[`ChannelSocket::send_pressure`] 只提供背压观测；
- **租借放弃**：借用型操作的 future 在读写途中被丢弃会使该方向进入流失败，
  这是以“不擦除生命周期”为前提所能给出的最强保证。
"#]

mod backpressure;
mod completion;
mod config;
mod error;
mod frame;
mod io_service;
mod lease;
mod operation;
mod queue;
mod socket;
mod stats;
mod worker;

pub use backpressure::SendPressure;
pub use completion::Completion;
pub use config::{ChannelConfig, ConfigError, IoServiceConfig, SparkChannelConfig};
pub use error::{ChannelError, Defect, ErrorKind};
pub use frame::{HEADER_LEN, decode_header, encode_header};
pub use io_service::IoService;
pub use operation::{Callback, Direction, IoOperation, OperationKind, OperationState, Outcome};
pub use socket::ChannelSocket;
pub use stats::ChannelStats;

pub use spark_channel_buffer as buffer;
