//! 方向执行上下文：每个方向一个 Tokio 任务，按 FIFO 逐个执行描述符。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 底层流的完成顺序并不保证与入队顺序一致；把一个方向的全部 IO 收敛到单个任务里，
//!   “第 N+1 个操作只在第 N 个进入终态后开始”便成为结构性事实，而非需要加锁维护的约定。
//!
//! ## 逻辑（How）
//! 1. `DirectionQueue::next` 取出队首描述符并迁移到 `Executing`；
//! 2. 数据操作按种类执行：持有型缓冲在任务内直接读写，借出型描述符把流半部租给调用方；
//! 3. 进入终态时先更新计数器再解析完成信号，保证调用方观察到结果时计数已生效；
//! 4. 流失败时当前操作失败，关闭方向并按入队顺序级联失败剩余操作，然后任务退出；
//! 5. 关闭操作执行完后任务退出。
//!
//! ## 注意事项（Trade-offs）
//! - 借出的半部若未归还即视为流失败：流位置未知，继续成帧没有意义。

use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

use crate::completion::Transfer;
use crate::error::{ChannelError, Defect};
use crate::frame::{self, RecvTarget};
use crate::lease::{BoxedReader, BoxedWriter, LeaseSlot, RecvLease, Returned, SendLease};
use crate::operation::{IoOperation, OperationKind, Payload};
use crate::queue::DirectionQueue;
use crate::socket::SocketShared;

/// 单个操作执行后的去向。
enum Flow {
    Continue,
    Exit,
}

pub(crate) async fn run_send(shared: Arc<SocketShared>, writer: BoxedWriter) {
    let mut writer = Some(writer);
    while let Some(mut op) = shared.send.next().await {
        if !start(&shared, &mut op) {
            continue;
        }
        let flow = match op.kind() {
            OperationKind::SendData => send_data(&shared, &mut op, &mut writer).await,
            OperationKind::CloseSend => {
                let result = match writer.take() {
                    Some(mut half) => half
                        .shutdown()
                        .await
                        .map(|()| Transfer::bytes(0))
                        .map_err(|err| ChannelError::stream(frame::SHUTDOWN, err)),
                    None => Ok(Transfer::bytes(0)),
                };
                finish(&shared, &mut op, result);
                Flow::Exit
            }
            OperationKind::CloseThread => close_thread(&shared, &mut op),
            other => misrouted(&shared, &mut op, other),
        };
        if let Flow::Exit = flow {
            break;
        }
    }
    tracing::debug!(socket = shared.id, direction = "send", "send worker exited");
}

pub(crate) async fn run_recv(shared: Arc<SocketShared>, reader: BoxedReader) {
    let mut reader = Some(reader);
    while let Some(mut op) = shared.recv.next().await {
        if !start(&shared, &mut op) {
            continue;
        }
        let flow = match op.kind() {
            OperationKind::RecvData | OperationKind::RecvName => {
                recv_data(&shared, &mut op, &mut reader).await
            }
            OperationKind::CloseRecv => {
                // 读半部没有协议层的关闭动作，释放即可。
                drop(reader.take());
                finish(&shared, &mut op, Ok(Transfer::bytes(0)));
                Flow::Exit
            }
            OperationKind::CloseThread => close_thread(&shared, &mut op),
            other => misrouted(&shared, &mut op, other),
        };
        if let Flow::Exit = flow {
            break;
        }
    }
    tracing::debug!(socket = shared.id, direction = "recv", "recv worker exited");
}

fn start(shared: &SocketShared, op: &mut IoOperation) -> bool {
    match op.begin() {
        Ok(()) => true,
        Err(defect) => {
            tracing::error!(socket = shared.id, kind = ?op.kind(), %defect, "operation dequeued in non-pending state");
            false
        }
    }
}

async fn send_data(shared: &SocketShared, op: &mut IoOperation, writer: &mut Option<BoxedWriter>) -> Flow {
    let len = u64::from(op.size());
    let Some(mut half) = writer.take() else {
        // 半部只会在流失败后丢失，而流失败会关闭方向，此处仅防御实现缺陷。
        return fail_stream(shared, &shared.send, op, lost_half());
    };
    let result = match op.take_payload() {
        Payload::Buffer(buffer) => {
            let payload: &[u8] = buffer.data();
            let written = frame::write_frame(&mut half, payload).await;
            *writer = Some(half);
            written
        }
        Payload::Lent(LeaseSlot::Send(slot)) => {
            let (returned, result) = lend_writer(slot, half).await;
            *writer = returned;
            result
        }
        Payload::Lent(LeaseSlot::Recv(_)) | Payload::Empty => {
            *writer = Some(half);
            Err(Defect::IllegalTransition.into())
        }
    };

    shared.counters.on_send_finished(len, result.is_ok());
    match result {
        Ok(bytes) => {
            finish(shared, op, Ok(Transfer::bytes(bytes)));
            Flow::Continue
        }
        Err(err) if writer.is_none() || matches!(err, ChannelError::Stream { .. }) => {
            fail_stream(shared, &shared.send, op, err)
        }
        Err(err) => {
            finish(shared, op, Err(err));
            Flow::Continue
        }
    }
}

async fn recv_data(shared: &SocketShared, op: &mut IoOperation, reader: &mut Option<BoxedReader>) -> Flow {
    let Some(mut half) = reader.take() else {
        return fail_stream(shared, &shared.recv, op, lost_half());
    };

    let announced = match frame::read_header(&mut half).await {
        Ok(announced) => announced,
        Err(err) => return fail_stream(shared, &shared.recv, op, err),
    };
    op.set_size(announced);

    let limit = shared.config.max_frame_len;
    let checked = frame::reject_oversized(&mut half, announced, limit).await;
    let result = match checked {
        Err(err) => {
            *reader = Some(half);
            Err(err)
        }
        Ok(()) => match op.take_payload() {
            Payload::Buffer(mut buffer) => {
                let read = frame::read_payload(&mut half, RecvTarget::Adapter(&mut *buffer), announced).await;
                *reader = Some(half);
                read.map(|bytes| Transfer::with_buffer(bytes, buffer))
            }
            Payload::Lent(LeaseSlot::Recv(slot)) => {
                let (returned, read) = lend_reader(slot, half, announced).await;
                *reader = returned;
                read.map(Transfer::bytes)
            }
            Payload::Lent(LeaseSlot::Send(_)) | Payload::Empty => {
                *reader = Some(half);
                Err(Defect::IllegalTransition.into())
            }
        },
    };

    match result {
        Ok(transfer) => {
            shared.counters.on_received(transfer.bytes);
            finish(shared, op, Ok(transfer));
            Flow::Continue
        }
        Err(err) if reader.is_none() || matches!(err, ChannelError::Stream { .. }) => {
            fail_stream(shared, &shared.recv, op, err)
        }
        Err(err) => {
            tracing::debug!(socket = shared.id, announced, code = err.code(), "receive rejected, payload drained");
            finish(shared, op, Err(err));
            Flow::Continue
        }
    }
}

/// 把写半部借给调用方；调用方未领取时原样收回。
async fn lend_writer(
    slot: oneshot::Sender<SendLease>,
    writer: BoxedWriter,
) -> (Option<BoxedWriter>, Result<u64, ChannelError>) {
    let (give_back, returned) = oneshot::channel();
    if let Err(unclaimed) = slot.send(SendLease { writer, give_back }) {
        return (Some(unclaimed.writer), Err(ChannelError::LeaseAbandoned));
    }
    match returned.await {
        Ok(Returned { half, result }) => (Some(half), result),
        Err(_) => (None, Err(ChannelError::LeaseAbandoned)),
    }
}

/// 把已读出长度头的读半部借给调用方；调用方未领取时排空负载后收回。
async fn lend_reader(
    slot: oneshot::Sender<RecvLease>,
    reader: BoxedReader,
    announced: u32,
) -> (Option<BoxedReader>, Result<u64, ChannelError>) {
    let (give_back, returned) = oneshot::channel();
    let lease = RecvLease {
        reader,
        announced,
        give_back,
    };
    if let Err(unclaimed) = slot.send(lease) {
        let mut reader = unclaimed.reader;
        return match frame::drain(&mut reader, announced).await {
            Ok(()) => (Some(reader), Err(ChannelError::LeaseAbandoned)),
            Err(err) => (Some(reader), Err(err)),
        };
    }
    match returned.await {
        Ok(Returned { half, result }) => (Some(half), result),
        Err(_) => (None, Err(ChannelError::LeaseAbandoned)),
    }
}

fn close_thread(shared: &SocketShared, op: &mut IoOperation) -> Flow {
    shared.stopped.store(true, Ordering::Release);
    finish(shared, op, Ok(Transfer::bytes(0)));
    Flow::Exit
}

fn misrouted(shared: &SocketShared, op: &mut IoOperation, kind: OperationKind) -> Flow {
    tracing::error!(socket = shared.id, ?kind, direction = %op.direction(), "operation queued on the wrong direction");
    finish(shared, op, Err(Defect::IllegalTransition.into()));
    Flow::Continue
}

fn lost_half() -> ChannelError {
    ChannelError::StreamAborted {
        kind: io::ErrorKind::NotConnected,
    }
}

/// 流失败：当前操作失败，方向关闭，剩余操作按入队顺序级联失败。
fn fail_stream(shared: &SocketShared, queue: &DirectionQueue, op: &mut IoOperation, err: ChannelError) -> Flow {
    let kind = err.io_kind();
    tracing::warn!(
        socket = shared.id,
        direction = %queue.direction(),
        code = err.code(),
        error = %err,
        "stream failure, aborting queued operations"
    );
    finish(shared, op, Err(err));

    let remaining = queue.shut_down();
    if !remaining.is_empty() {
        tracing::warn!(
            socket = shared.id,
            direction = %queue.direction(),
            aborted = remaining.len(),
            "queued operations failed after stream failure"
        );
    }
    for mut pending in remaining {
        if pending.kind() == OperationKind::SendData {
            shared.counters.on_send_finished(u64::from(pending.size()), false);
        }
        finish(shared, &mut pending, Err(ChannelError::StreamAborted { kind }));
    }
    Flow::Exit
}

fn finish(shared: &SocketShared, op: &mut IoOperation, result: Result<Transfer, ChannelError>) {
    let kind = op.kind();
    match op.complete(result) {
        Ok(outcome) => {
            tracing::debug!(socket = shared.id, direction = %op.direction(), ?kind, ?outcome, "operation completed");
        }
        Err(defect) => {
            tracing::error!(socket = shared.id, ?kind, %defect, "operation completed twice");
        }
    }
}
