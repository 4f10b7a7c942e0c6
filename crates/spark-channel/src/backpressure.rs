/// 发送方向的背压信号。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendPressure {
    /// 在途字节低于低水位。
    Ready,
    /// 介于低水位与高水位之间，调用方宜放缓入队。
    Busy { in_flight: u64 },
    /// 达到或超过高水位。
    Saturated { in_flight: u64 },
}

/// 把在途字节映射为 [`SendPressure`]。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 核心不做拥塞控制，入队永不阻塞；在途字节是调用方唯一可用的背压依据，
///   这里把它归一为三档信号，供上层调度判断是否需要退避。
///
/// ## 逻辑 (How)
/// - `in_flight < low` 为 `Ready`；`low <= in_flight < high` 为 `Busy`；其余为 `Saturated`；
/// - 水位由 [`ChannelConfig`](crate::ChannelConfig) 提供并已校验 `low <= high`。
///
/// ## 注意事项 (Trade-offs)
/// - 计数器与队列并发变化，返回值只是瞬时观测，不能作为队列状态的权威依据。
pub(crate) fn classify(in_flight: u64, low: u64, high: u64) -> SendPressure {
    if in_flight >= high {
        SendPressure::Saturated { in_flight }
    } else if in_flight >= low {
        SendPressure::Busy { in_flight }
    } else {
        SendPressure::Ready
    }
}
