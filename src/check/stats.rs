use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 单次运行的计数器，探测任务并发更新
#[derive(Debug, Default)]
pub struct Stats {
    pub total_proxies: AtomicU64,
    pub segments_total: AtomicU64,
    pub segments_failed: AtomicU64,
    pub probes_issued: AtomicU64,
    pub in_flight: AtomicU64,
    pub max_in_flight: AtomicU64,
    pub skipped: AtomicU64,
    pub qualified: AtomicU64,
    pub failed: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe_started(&self) {
        self.probes_issued.fetch_add(1, Ordering::Relaxed);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
    }

    pub fn probe_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn increment_segment(&self) {
        self.segments_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed_segment(&self) {
        self.segments_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_qualified(&self) {
        self.qualified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CheckStats {
        CheckStats {
            total_proxies: self.total_proxies.load(Ordering::Relaxed),
            segments_total: self.segments_total.load(Ordering::Relaxed),
            segments_failed: self.segments_failed.load(Ordering::Relaxed),
            probes_issued: self.probes_issued.load(Ordering::Relaxed),
            max_in_flight: self.max_in_flight.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::Relaxed),
            qualified: self.qualified.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            excluded: 0,
            fastest_delay: None,
            average_delay: None,
        }
    }
}

/// 运行结束后的统计信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckStats {
    pub total_proxies: u64,
    pub segments_total: u64,
    pub segments_failed: u64,
    pub probes_issued: u64,
    /// 单个分段内同时进行的探测数峰值
    pub max_in_flight: u64,
    /// 因已被隔离而跳过的节点
    pub skipped: u64,
    pub qualified: u64,
    /// 本轮探测失败的节点
    pub failed: u64,
    /// 输出的隔离记录数
    pub excluded: u64,
    pub fastest_delay: Option<i64>,
    pub average_delay: Option<f64>,
}

impl CheckStats {
    pub fn success_rate(&self) -> f64 {
        if self.probes_issued > 0 {
            (self.qualified as f64 / self.probes_issued as f64) * 100.0
        } else {
            0.0
        }
    }
}
