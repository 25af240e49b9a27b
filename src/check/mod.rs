//! 分段健康检查引擎
//! 按分段推送配置、限流并发探测，并把结果对账到隔离状态中

mod result;
mod stats;

pub use result::{HealthCheckResult, ProbeOutcome, QualifiedOrder, assemble};
pub use stats::{CheckStats, Stats};

use crate::clash_proxy::{FAILED_DELAY, HealthProbe, PROBE_GRACE_MS};
use crate::error::{ConfigError, HealthCheckError};
use crate::proxy::{self, ProxyRecord};
use crate::quarantine::ExclusionTracker;
use crate::ui::progress::ProgressTracker;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinHandle};

/// 引擎运行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    pub segment_size: usize,
    pub concurrency: usize,
    pub test_url: String,
    /// 单次探测超时（毫秒）
    pub timeout_ms: u64,
    pub qualified_order: QualifiedOrder,
}

impl HealthCheckConfig {
    pub fn new(segment_size: usize, concurrency: usize, test_url: String, timeout_ms: u64) -> Self {
        Self {
            segment_size,
            concurrency,
            test_url,
            timeout_ms,
            qualified_order: QualifiedOrder::default(),
        }
    }

    pub fn with_qualified_order(mut self, order: QualifiedOrder) -> Self {
        self.qualified_order = order;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_size == 0 {
            return Err(ConfigError::InvalidSegmentSize);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.test_url.trim().is_empty() {
            return Err(ConfigError::EmptyTestUrl);
        }
        Ok(())
    }
}

/// 分段在整个输入中的位置，`end` 不含
#[derive(Debug, Clone, Copy)]
struct SegmentPosition {
    start: usize,
    end: usize,
    total: usize,
}

pub struct ProxyChecker {
    probe: Arc<dyn HealthProbe>,
    tracker: ExclusionTracker,
    progress: ProgressTracker,
}

impl ProxyChecker {
    pub fn new(probe: Arc<dyn HealthProbe>, tracker: ExclusionTracker) -> Self {
        Self {
            probe,
            tracker,
            progress: ProgressTracker::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn tracker(&self) -> &ExclusionTracker {
        &self.tracker
    }

    /// 检测全部代理
    ///
    /// 分段严格串行；单个分段推送失败时跳过该分段且不改动其隔离状态。
    /// 输入非空而所有分段都失败时返回 `AllSegmentsFailed`。
    /// 同一身份只检测第一次出现的记录，两个结果列表因此不会重叠。
    pub async fn check_proxies(
        &mut self,
        proxies: &[ProxyRecord],
        config: &HealthCheckConfig,
    ) -> Result<HealthCheckResult, HealthCheckError> {
        config.validate()?;

        let total = proxies.len();
        let proxies = proxy::dedup_by_key(proxies.to_vec());
        if proxies.len() < total {
            debug!("🔄 合并 {} 个重复身份的节点", total - proxies.len());
        }
        let proxies = proxies.as_slice();

        let stats = Arc::new(Stats::new());
        stats
            .total_proxies
            .store(proxies.len() as u64, Ordering::Relaxed);

        let segment_count = proxies.len().div_ceil(config.segment_size);
        self.progress
            .set_totals(proxies.len() as u64, segment_count as u64);

        let mut qualified: Vec<(ProxyRecord, i64)> = Vec::new();

        for (index, segment) in proxies.chunks(config.segment_size).enumerate() {
            let start = index * config.segment_size;
            let position = SegmentPosition {
                start,
                end: start + segment.len(),
                total: proxies.len(),
            };
            stats.increment_segment();

            match self
                .process_segment(segment, position, config, &stats, &mut qualified)
                .await
            {
                Ok(()) => {
                    info!(
                        "✅ 分段 [{}-{}/{}] 检测完成，累计合格 {} 个",
                        position.start + 1,
                        position.end,
                        position.total,
                        qualified.len()
                    );
                    self.progress.finish_segment(false, 0);
                }
                Err(e) => {
                    error!(
                        "❌ 分段 [{}-{}/{}] 检测失败: {:#}",
                        position.start + 1,
                        position.end,
                        position.total,
                        e
                    );
                    stats.increment_failed_segment();
                    self.progress.finish_segment(true, segment.len() as u64);
                }
            }
        }

        self.progress.finalize();

        let failed_segments = stats.segments_failed.load(Ordering::Relaxed) as usize;
        if segment_count > 0 && failed_segments == segment_count {
            return Err(HealthCheckError::AllSegmentsFailed {
                segments: segment_count,
            });
        }

        info!("✅ 健康检查完成");

        Ok(assemble(
            qualified,
            self.tracker.snapshot(),
            config.qualified_order,
            stats.snapshot(),
        ))
    }

    async fn process_segment(
        &mut self,
        segment: &[ProxyRecord],
        position: SegmentPosition,
        config: &HealthCheckConfig,
        stats: &Arc<Stats>,
        qualified: &mut Vec<(ProxyRecord, i64)>,
    ) -> anyhow::Result<()> {
        info!(
            "🔄 推送分段 [{}-{}/{}] 配置...",
            position.start + 1,
            position.end,
            position.total
        );

        let payload = proxy::to_config_yaml(segment)?;
        self.probe.update_config(&payload).await?;

        // 已隔离的节点不占用探测名额
        let eligible: Vec<bool> = segment
            .iter()
            .map(|proxy| !self.tracker.should_exclude(proxy))
            .collect();

        let outcomes = self.probe_segment(segment, &eligible, config, stats).await;

        // 按原始位置对账，结果与完成顺序无关
        for (proxy, outcome) in segment.iter().zip(outcomes) {
            match outcome {
                Some(outcome) if outcome.is_success() => {
                    self.tracker.mark_succeeded(proxy);
                    qualified.push((proxy.clone(), outcome.delay));
                    stats.increment_qualified();
                    self.progress.increment_proxy(Some(true));
                }
                Some(_) => {
                    self.tracker.mark_failed(proxy);
                    stats.increment_failed();
                    self.progress.increment_proxy(Some(false));
                }
                None => {
                    self.tracker.carry_over(proxy);
                    stats.increment_skipped();
                    self.progress.increment_proxy(None);
                }
            }
        }

        Ok(())
    }

    /// 并发探测，同时进行的探测数不超过 `concurrency`。
    /// 返回值与 `segment` 一一对应，跳过的节点为 `None`
    async fn probe_segment(
        &self,
        segment: &[ProxyRecord],
        eligible: &[bool],
        config: &HealthCheckConfig,
        stats: &Arc<Stats>,
    ) -> Vec<Option<ProbeOutcome>> {
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        let mut tasks: Vec<Option<JoinHandle<i64>>> = Vec::with_capacity(segment.len());

        for (proxy, &eligible) in segment.iter().zip(eligible) {
            if !eligible {
                debug!("⏭ 跳过已隔离节点 {}", proxy.key());
                tasks.push(None);
                continue;
            }

            let probe = Arc::clone(&self.probe);
            let semaphore = Arc::clone(&semaphore);
            let stats = Arc::clone(stats);
            let name = proxy.name.clone();
            let test_url = config.test_url.clone();
            let timeout_ms = config.timeout_ms;

            let task = task::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return FAILED_DELAY;
                };

                stats.probe_started();
                let limit = Duration::from_millis(timeout_ms.saturating_add(PROBE_GRACE_MS));
                let delay =
                    match tokio::time::timeout(limit, probe.check(&name, &test_url, timeout_ms))
                        .await
                    {
                        Ok(Ok(delay)) if delay > 0 => delay,
                        Ok(Ok(_)) => FAILED_DELAY,
                        Ok(Err(e)) => {
                            debug!("检测 {} 出错: {}", name, e);
                            FAILED_DELAY
                        }
                        Err(_) => {
                            debug!("检测 {} 超时", name);
                            FAILED_DELAY
                        }
                    };
                stats.probe_finished();

                delay
            });

            tasks.push(Some(task));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (proxy, task) in segment.iter().zip(tasks) {
            let outcome = match task {
                Some(task) => {
                    let delay = task.await.unwrap_or_else(|e| {
                        warn!("⚠️ 检测任务 {} 异常退出: {}", proxy.name, e);
                        FAILED_DELAY
                    });
                    Some(ProbeOutcome {
                        key: proxy.key(),
                        delay,
                    })
                }
                None => None,
            };
            outcomes.push(outcome);
        }

        outcomes
    }
}
