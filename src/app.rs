//! 主流程：获取节点 → 加载隔离数据 → 分段检测 → 输出结果

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::check::{HealthCheckResult, ProxyChecker};
use crate::clash_proxy::MihomoController;
use crate::config::Config;
use crate::output;
use crate::proxy::{self, ProxyRecord};
use crate::quarantine::{self, ExclusionTracker, QuarantineEntry};
use crate::subscription::{SubStoreClient, SubscriptionService};
use crate::ui::progress::ProgressTracker;

/// 等待代理核心就绪的最长时间
const CONTROLLER_READY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    config: Config,
    output_base: PathBuf,
}

impl Application {
    /// 配置在此处校验，错误在任何网络请求之前返回
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let output_base = std::env::var_os("GITHUB_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_default();

        Ok(Self {
            config,
            output_base,
        })
    }

    pub async fn run(&self) -> Result<HealthCheckResult> {
        let subscriptions = SubscriptionService::new(SubStoreClient::new(&self.config.sub_store_url)?);

        let proxies = self.load_proxies(&subscriptions).await?;
        let prior = self.load_quarantine(&subscriptions).await;

        let tracker = ExclusionTracker::new(self.config.max_excluded_times, prior)?;

        let controller = MihomoController::new(
            &self.config.controller_url,
            self.config.controller_secret.clone(),
        )?;
        controller
            .wait_until_ready(CONTROLLER_READY_TIMEOUT)
            .await
            .context("代理核心不可用")?;

        let mut checker = ProxyChecker::new(Arc::new(controller), tracker)
            .with_progress(ProgressTracker::new(self.config.print_progress));

        info!("🔍 开始检测 {} 个节点...", proxies.len());
        let result = checker
            .check_proxies(&proxies, &self.config.health_check_config())
            .await?;

        self.write_outputs(&result)?;

        Ok(result)
    }

    async fn load_proxies(
        &self,
        subscriptions: &SubscriptionService<SubStoreClient>,
    ) -> Result<Vec<ProxyRecord>> {
        let mut proxies = subscriptions
            .download_proxies(&self.config.proxies_config_urls)
            .await
            .context("下载订阅失败")?;

        for path in &self.config.proxies_files {
            let loaded = proxy::load_proxies_from_file(path)?;
            info!("📁 从 {} 读取 {} 个节点", path, loaded.len());
            proxies.extend(loaded);
        }

        let total = proxies.len();
        let proxies = proxy::dedup_by_key(proxies);
        if proxies.len() < total {
            info!("🔄 去除 {} 个重复节点", total - proxies.len());
        }

        Ok(proxies)
    }

    /// 上一轮的隔离数据为尽力而为，读取失败只记录警告
    async fn load_quarantine(
        &self,
        subscriptions: &SubscriptionService<SubStoreClient>,
    ) -> Vec<QuarantineEntry> {
        info!("🔍 解析隔离节点...");
        let mut entries = subscriptions
            .download_quarantine(&self.config.excluded_proxies_config_urls)
            .await;

        for path in &self.config.excluded_files {
            match quarantine::load_entries_from_file(path) {
                Ok(loaded) => entries.extend(loaded),
                Err(e) => warn!("⚠️ 读取隔离文件失败: {:#}", e),
            }
        }

        info!("✅ 解析到 {} 个隔离节点", entries.len());
        entries
    }

    fn write_outputs(&self, result: &HealthCheckResult) -> Result<()> {
        let path = |p: &str| output::resolve_output_path(&self.output_base, p);

        output::write_qualified_proxies(&result.qualified_proxies, path(&self.config.qualified))?;
        output::write_excluded_proxies(&result.excluded_proxies, path(&self.config.excluded))?;
        output::write_statistics(&result.stats, path(&self.config.statistics))?;

        Ok(())
    }
}
