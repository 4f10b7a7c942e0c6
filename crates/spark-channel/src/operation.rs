use core::fmt;

use spark_channel_buffer::OwnedBuffer;
use tokio::sync::oneshot;

use crate::completion::{self, Completion, Signal, Transfer};
use crate::error::{ChannelError, Defect, ErrorKind};
use crate::frame::{self, HEADER_LEN};
use crate::lease::{LeaseSlot, RecvLease, SendLease};

/// 通道的两个独立方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Recv,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Recv => "recv",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 描述符的种类标签，`RecvName` 为零值。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationKind {
    #[default]
    RecvName = 0,
    RecvData,
    CloseRecv,
    SendData,
    CloseSend,
    CloseThread,
}

impl OperationKind {
    /// 种类固有的方向；`CloseThread` 针对两个方向分别下发，因此没有固有方向。
    pub const fn direction(self) -> Option<Direction> {
        match self {
            OperationKind::RecvName | OperationKind::RecvData | OperationKind::CloseRecv => {
                Some(Direction::Recv)
            }
            OperationKind::SendData | OperationKind::CloseSend => Some(Direction::Send),
            OperationKind::CloseThread => None,
        }
    }

    pub const fn is_close(self) -> bool {
        matches!(
            self,
            OperationKind::CloseRecv | OperationKind::CloseSend | OperationKind::CloseThread
        )
    }
}

/// 单个描述符的生命周期状态。
///
/// `Pending → Executing → Completed | Failed`，级联失败允许 `Pending → Failed`；
/// 终态不再迁移。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OperationState {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
}

impl OperationState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, OperationState::Completed | OperationState::Failed)
    }
}

/// 交给完成回调的结果摘要。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed { bytes: u64 },
    Failed(ErrorKind),
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }
}

/// 完成回调，在完成信号解析之后调用且至多调用一次。
pub type Callback = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// 描述符的第二段：空（控制消息）、持有的缓冲或借出的流半部。
pub(crate) enum Payload {
    Empty,
    Buffer(Box<dyn OwnedBuffer>),
    Lent(LeaseSlot),
}

/// 排队的最小工作单元。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 一次收发请求连同其完成契约被打包为一个值，入队后由方向执行上下文恰好消费一次。
///
/// ## 结构（How）
/// - `size`：4 字节长度字段，始终作为线上第一段；[`IoOperation::header`] 每次都从该字段
///   重新生成字节，因此移动或清空描述符后长度头都不会指向失效存储；
/// - `payload`：第二段，至多持有一个缓冲；
/// - `signal` / `callback`：可选的一次性完成信号与回调；
/// - `state`：[`OperationState`] 状态机。
///
/// ## 契约（What）
/// - 默认/清空状态：种类 `RecvName`、长度 0、第二段为空、无缓冲、无信号、无回调、`Pending`；
/// - 完成时先解析信号再调用回调，重复完成返回 [`Defect::DoubleCompletion`]；
/// - 信号仍未解析时不得清空复用，[`IoOperation::clear`] 返回 [`Defect::PendingSignal`]。
pub struct IoOperation {
    kind: OperationKind,
    direction: Direction,
    size: u32,
    payload: Payload,
    signal: Option<Signal>,
    callback: Option<Callback>,
    state: OperationState,
}

impl Default for IoOperation {
    fn default() -> Self {
        Self {
            kind: OperationKind::RecvName,
            direction: Direction::Recv,
            size: 0,
            payload: Payload::Empty,
            signal: None,
            callback: None,
            state: OperationState::Pending,
        }
    }
}

impl IoOperation {
    fn with_signal(kind: OperationKind, direction: Direction, size: u32, payload: Payload, signal: Signal) -> Self {
        Self {
            kind,
            direction,
            size,
            payload,
            signal: Some(signal),
            callback: None,
            state: OperationState::Pending,
        }
    }

    /// 构造发送描述符，缓冲在完成后释放。
    pub fn send<B: OwnedBuffer>(buffer: B) -> Result<(Self, Completion<u64>), ChannelError> {
        let size = frame::checked_len(buffer.size())?;
        let (signal, completion) = Completion::channel(completion::transferred_bytes);
        let op = Self::with_signal(
            OperationKind::SendData,
            Direction::Send,
            size,
            Payload::Buffer(Box::new(buffer)),
            signal,
        );
        Ok((op, completion))
    }

    /// 构造持有缓冲的收包描述符，完成后缓冲原样交还。
    pub fn recv<B: OwnedBuffer>(buffer: B) -> (Self, Completion<B>) {
        let (signal, completion) = Completion::channel(completion::returned_buffer::<B>);
        let op = Self::with_signal(
            OperationKind::RecvData,
            Direction::Recv,
            0,
            Payload::Buffer(Box::new(buffer)),
            signal,
        );
        (op, completion)
    }

    /// 构造半关闭描述符（`CloseSend` / `CloseRecv`）。
    pub fn close(direction: Direction) -> (Self, Completion<()>) {
        let kind = match direction {
            Direction::Send => OperationKind::CloseSend,
            Direction::Recv => OperationKind::CloseRecv,
        };
        let (signal, completion) = Completion::channel(completion::unit);
        (Self::with_signal(kind, direction, 0, Payload::Empty, signal), completion)
    }

    /// 构造停止执行上下文的描述符。
    pub fn close_thread(direction: Direction) -> (Self, Completion<()>) {
        let (signal, completion) = Completion::channel(completion::unit);
        let op = Self::with_signal(OperationKind::CloseThread, direction, 0, Payload::Empty, signal);
        (op, completion)
    }

    pub(crate) fn lend_recv(
        kind: OperationKind,
    ) -> (Self, oneshot::Receiver<RecvLease>, Completion<u64>) {
        let (slot, lease) = oneshot::channel();
        let (signal, completion) = Completion::channel(completion::transferred_bytes);
        let op = Self::with_signal(kind, Direction::Recv, 0, Payload::Lent(LeaseSlot::Recv(slot)), signal);
        (op, lease, completion)
    }

    pub(crate) fn lend_send(
        len: u64,
    ) -> Result<(Self, oneshot::Receiver<SendLease>, Completion<u64>), ChannelError> {
        let size = frame::checked_len(len)?;
        let (slot, lease) = oneshot::channel();
        let (signal, completion) = Completion::channel(completion::transferred_bytes);
        let op = Self::with_signal(
            OperationKind::SendData,
            Direction::Send,
            size,
            Payload::Lent(LeaseSlot::Send(slot)),
            signal,
        );
        Ok((op, lease, completion))
    }

    /// 附加完成回调。
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 长度字段；收包描述符在读出长度头之前为 0。
    pub fn size(&self) -> u32 {
        self.size
    }

    /// 线上第一段：本描述符自身长度字段的主机字节序表示。
    pub fn header(&self) -> [u8; HEADER_LEN] {
        frame::encode_header(self.size)
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn has_buffer(&self) -> bool {
        matches!(self.payload, Payload::Buffer(_))
    }

    pub fn has_signal(&self) -> bool {
        self.signal.is_some()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    pub(crate) fn take_payload(&mut self) -> Payload {
        std::mem::replace(&mut self.payload, Payload::Empty)
    }

    /// `Pending → Executing`。
    pub(crate) fn begin(&mut self) -> Result<(), Defect> {
        if self.state != OperationState::Pending {
            return Err(Defect::IllegalTransition);
        }
        self.state = OperationState::Executing;
        Ok(())
    }

    /// 进入终态：先解析信号，再调用回调。
    ///
    /// 调用方已丢弃 [`Completion`] 时信号发送失败，这不影响回调与状态迁移。
    pub(crate) fn complete(&mut self, result: Result<Transfer, ChannelError>) -> Result<Outcome, Defect> {
        if self.state.is_terminal() {
            return Err(Defect::DoubleCompletion);
        }
        let outcome = match &result {
            Ok(transfer) => Outcome::Completed {
                bytes: transfer.bytes,
            },
            Err(err) => Outcome::Failed(err.kind()),
        };
        self.state = if outcome.is_success() {
            OperationState::Completed
        } else {
            OperationState::Failed
        };
        if let Some(signal) = self.signal.take() {
            let _ = signal.send(result);
        }
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
        Ok(outcome)
    }

    /// 恢复为默认状态以便复用。
    pub fn clear(&mut self) -> Result<(), Defect> {
        if self.signal.is_some() && !self.state.is_terminal() {
            return Err(Defect::PendingSignal);
        }
        *self = Self::default();
        Ok(())
    }
}

impl fmt::Debug for IoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoOperation")
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .field("size", &self.size)
            .field("state", &self.state)
            .field("has_buffer", &self.has_buffer())
            .field("has_signal", &self.has_signal())
            .field("has_callback", &self.has_callback())
            .finish()
    }
}
