//! 通道与 IO 服务的配置。
//!
//! # 教案级注释
//!
//! - **Why**：连接参数与运行时规模属于部署决策，不应硬编码；以数据结构承载配置，
//!   既可在代码中构造，也可从 TOML 片段加载。
//! - **How**：所有结构均实现 `serde::Deserialize` 并带默认值，缺省字段自动回落；
//!   [`SparkChannelConfig::from_toml_str`] 解析后立即调用 `validate`。
//! - **What**：`validate` 拒绝零长度帧上限、颠倒的水位与零线程数。

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_HIGH_WATERMARK: u64 = 64 * 1024 * 1024;
const DEFAULT_LOW_WATERMARK: u64 = 16 * 1024 * 1024;

/// 配置解析或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法解析通道配置: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("通道配置非法: {0}")]
    Invalid(&'static str),
}

/// 单个通道端点的参数。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// 收包时允许的最大宣告长度。
    pub max_frame_len: u32,
    /// 在途字节达到该值时报告 `Saturated`。
    pub send_high_watermark: u64,
    /// 在途字节达到该值时报告 `Busy`。
    pub send_low_watermark: u64,
    /// TCP 连接是否关闭 Nagle 算法。
    pub tcp_nodelay: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_len: u32::MAX,
            send_high_watermark: DEFAULT_HIGH_WATERMARK,
            send_low_watermark: DEFAULT_LOW_WATERMARK,
            tcp_nodelay: true,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_len == 0 {
            return Err(ConfigError::Invalid("max_frame_len must be positive"));
        }
        if self.send_low_watermark > self.send_high_watermark {
            return Err(ConfigError::Invalid(
                "send_low_watermark must not exceed send_high_watermark",
            ));
        }
        Ok(())
    }
}

/// IO 服务（Tokio 运行时）的规模参数。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IoServiceConfig {
    /// 工作线程数；`None` 表示使用 Tokio 默认值（CPU 核数）。
    pub worker_threads: Option<usize>,
    pub thread_name: String,
}

impl Default for IoServiceConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name: "spark-channel-io".to_owned(),
        }
    }
}

impl IoServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == Some(0) {
            return Err(ConfigError::Invalid("worker_threads must be positive"));
        }
        Ok(())
    }
}

/// 配置根节点，对应 TOML 中的 `[io_service]` 与 `[channel]` 两节。
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SparkChannelConfig {
    pub io_service: IoServiceConfig,
    pub channel: ChannelConfig,
}

impl SparkChannelConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.io_service.validate()?;
        config.channel.validate()?;
        Ok(config)
    }
}
