use serde::{Deserialize, Serialize};

use super::stats::CheckStats;
use crate::proxy::{ProxyKey, ProxyRecord};
use crate::quarantine::QuarantineEntry;

/// 单次探测结果，正数延迟表示成功
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub key: ProxyKey,
    pub delay: i64,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        self.delay > 0
    }
}

/// 合格节点的输出顺序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualifiedOrder {
    /// 保持输入顺序
    Input,
    /// 按本轮延迟升序，延迟相同保持输入顺序
    #[default]
    Delay,
}

/// 一轮检测的最终结果，两个列表互不相交
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub qualified_proxies: Vec<ProxyRecord>,
    pub excluded_proxies: Vec<QuarantineEntry>,
    pub stats: CheckStats,
}

/// 整理两个输出列表并补全延迟统计
pub fn assemble(
    mut qualified: Vec<(ProxyRecord, i64)>,
    mut excluded: Vec<QuarantineEntry>,
    order: QualifiedOrder,
    mut stats: CheckStats,
) -> HealthCheckResult {
    if order == QualifiedOrder::Delay {
        // sort_by_key 是稳定排序
        qualified.sort_by_key(|(_, delay)| *delay);
    }

    excluded.sort_by_cached_key(QuarantineEntry::key);

    stats.excluded = excluded.len() as u64;
    stats.fastest_delay = qualified.iter().map(|(_, delay)| *delay).min();
    stats.average_delay = if qualified.is_empty() {
        None
    } else {
        let sum: i64 = qualified.iter().map(|(_, delay)| *delay).sum();
        Some(sum as f64 / qualified.len() as f64)
    };

    HealthCheckResult {
        qualified_proxies: qualified.into_iter().map(|(proxy, _)| proxy).collect(),
        excluded_proxies: excluded,
        stats,
    }
}
