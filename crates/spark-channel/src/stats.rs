use std::sync::atomic::{AtomicU64, Ordering};

/// 字节计数器的只读快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// 已入队、尚未确认发送完成的字节。
    pub in_flight_bytes: u64,
    /// `in_flight_bytes` 的历史最大值。
    pub max_in_flight_bytes: u64,
    /// 累计成功发送的负载字节。
    pub total_sent: u64,
    /// 累计成功接收的负载字节。
    pub total_received: u64,
}

/// 端点的原子计数器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 计数器是监控与背压信号而非权威队列状态，因此允许在队列活动进行中并发读取，
///   每次操作只做一次原子更新。
///
/// ## 契约 (What)
/// - 入队发送：`in_flight += len` 并刷新历史最大值；
/// - 发送终态：`in_flight -= len` 恰好一次，成功时 `total_sent += len`；
/// - 收包成功：`total_received += len`；
/// - 除 `in_flight` 外所有计数单调不减（`reset` 显式归零除外）。
#[derive(Debug, Default)]
pub(crate) struct ChannelCounters {
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
    total_sent: AtomicU64,
    total_received: AtomicU64,
}

impl ChannelCounters {
    pub(crate) fn on_send_enqueued(&self, len: u64) -> u64 {
        let now = self.in_flight.fetch_add(len, Ordering::AcqRel) + len;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);
        now
    }

    pub(crate) fn on_send_finished(&self, len: u64, delivered: bool) {
        self.in_flight.fetch_sub(len, Ordering::AcqRel);
        if delivered {
            self.total_sent.fetch_add(len, Ordering::AcqRel);
        }
    }

    pub(crate) fn on_received(&self, len: u64) {
        self.total_received.fetch_add(len, Ordering::AcqRel);
    }

    pub(crate) fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            in_flight_bytes: self.in_flight.load(Ordering::Acquire),
            max_in_flight_bytes: self.max_in_flight.load(Ordering::Acquire),
            total_sent: self.total_sent.load(Ordering::Acquire),
            total_received: self.total_received.load(Ordering::Acquire),
        }
    }

    /// 归零累计值，历史最大值回落到当前在途字节。
    pub(crate) fn reset(&self) {
        self.total_sent.store(0, Ordering::Release);
        self.total_received.store(0, Ordering::Release);
        self.max_in_flight
            .store(self.in_flight.load(Ordering::Acquire), Ordering::Release);
    }
}
