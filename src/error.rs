//! 错误类型定义

use thiserror::Error;

/// 配置错误，在任何检测开始之前返回给调用方
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("segment_size 必须大于 0")]
    InvalidSegmentSize,

    #[error("concurrency 必须大于 0")]
    InvalidConcurrency,

    #[error("timeout 必须大于 0")]
    InvalidTimeout,

    #[error("max_excluded_times 必须大于等于 1")]
    InvalidMaxExcludedTimes,

    #[error("test_url 不能为空")]
    EmptyTestUrl,

    #[error("无效的地址 {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// 健康检查引擎的终止性错误
#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("健康检查配置无效: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// 所有分段的配置推送均失败，结果不可信
    #[error("全部 {segments} 个分段均检测失败，代理核心可能不可达")]
    AllSegmentsFailed { segments: usize },
}
