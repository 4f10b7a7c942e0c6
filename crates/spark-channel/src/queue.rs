use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::operation::{Direction, IoOperation, OperationKind};
use crate::stats::ChannelCounters;

#[derive(Default)]
struct QueueState {
    ops: VecDeque<IoOperation>,
    closed: bool,
}

/// 单个方向的 FIFO 操作队列。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 每个方向只有一个消费者（方向执行上下文），生产者是任意持有端点引用的调用方；
///   队列本身不做 IO，只负责顺序与关闭语义。
///
/// ## 逻辑 (How)
/// - `parking_lot::Mutex` 保护 `VecDeque` 与关闭标志，临界区内不跨越 `.await`；
/// - `Notify::notify_one` 在无等待者时保留许可，因此消费者先检查再等待不会丢失唤醒。
///
/// ## 契约 (What)
/// - 入队检查与关闭标记在同一把锁下完成：关闭操作一旦入队，其后不会再有操作进入；
/// - 发送操作的在途字节在锁内累加，与入队顺序一致。
pub(crate) struct DirectionQueue {
    direction: Direction,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl DirectionQueue {
    pub(crate) fn new(direction: Direction) -> Self {
        Self {
            direction,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    /// 入队；方向已关闭（或端点已停止）时原样退回描述符。
    ///
    /// `CloseThread` 不受停止标志约束：`stop` 对两个方向分别下发，
    /// 先完成的一侧不能阻止另一侧入队。
    pub(crate) fn push(
        &self,
        op: IoOperation,
        stopped: &AtomicBool,
        counters: &ChannelCounters,
    ) -> Result<usize, IoOperation> {
        let mut state = self.state.lock();
        let halted = stopped.load(Ordering::Acquire) && op.kind() != OperationKind::CloseThread;
        if state.closed || halted {
            return Err(op);
        }
        if op.kind() == OperationKind::SendData {
            counters.on_send_enqueued(u64::from(op.size()));
        }
        if op.kind().is_close() {
            state.closed = true;
        }
        state.ops.push_back(op);
        let depth = state.ops.len();
        drop(state);
        self.notify.notify_one();
        Ok(depth)
    }

    /// 取出下一个操作；队列已关闭且为空时返回 `None`。
    pub(crate) async fn next(&self) -> Option<IoOperation> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(op) = state.ops.pop_front() {
                    return Some(op);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// 关闭方向并按入队顺序取走所有剩余操作。
    pub(crate) fn shut_down(&self) -> VecDeque<IoOperation> {
        let remaining = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.ops)
        };
        self.notify.notify_one();
        remaining
    }

    /// 仅标记关闭，返回仍在排队的操作数。
    pub(crate) fn close(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            state.closed = true;
            state.ops.len()
        };
        self.notify.notify_one();
        pending
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().ops.len()
    }
}
