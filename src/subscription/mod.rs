//! 订阅下载
//! 通过 Sub-Store 合并多个订阅链接，获取待检测节点和上一轮的隔离数据

mod sub_store;

pub use sub_store::SubStoreClient;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{info, warn};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::proxy::{self, ProxyRecord};
use crate::quarantine::QuarantineEntry;

/// 下载目标格式
pub const TARGET_CLASH_META: &str = "ClashMeta";
pub const TARGET_JSON: &str = "JSON";

/// 订阅聚合服务接口
#[async_trait]
pub trait SubscriptionClient: Send + Sync {
    async fn add_subscription(&self, name: &str, url: &str) -> Result<()>;
    async fn add_collection(&self, name: &str, subscriptions: &[String]) -> Result<()>;
    async fn download_collection(&self, name: &str, target: &str) -> Result<String>;
}

/// 生成随机的订阅名称
fn random_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(21)
        .map(char::from)
        .collect()
}

pub struct SubscriptionService<C> {
    client: C,
}

impl<C: SubscriptionClient> SubscriptionService<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// 下载并解析待检测节点
    pub async fn download_proxies(&self, urls: &[String]) -> Result<Vec<ProxyRecord>> {
        let urls = non_empty(urls);
        if urls.is_empty() {
            return Ok(vec![]);
        }

        let yaml = self.download_collection(&urls, TARGET_CLASH_META).await?;

        info!("🔍 解析节点...");
        let proxies = proxy::parse_proxies_yaml(&yaml)?;
        info!("✅ 解析到 {} 个节点", proxies.len());

        Ok(proxies)
    }

    /// 下载上一轮的隔离数据，失败时按空列表处理
    pub async fn download_quarantine(&self, urls: &[String]) -> Vec<QuarantineEntry> {
        let urls = non_empty(urls);
        if urls.is_empty() {
            return vec![];
        }

        let result: Result<Vec<serde_json::Value>> = async {
            let data = self.download_collection(&urls, TARGET_JSON).await?;
            match serde_json::from_str::<serde_json::Value>(&data)? {
                serde_json::Value::Array(values) => Ok(values),
                _ => Err(anyhow!("隔离数据不是列表")),
            }
        }
        .await;

        match result {
            Ok(values) => values
                .into_iter()
                .filter_map(|value| match serde_json::from_value::<QuarantineEntry>(value) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!("⚠️ 跳过无法解析的隔离记录: {}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!("⚠️ 获取隔离数据失败，按空列表处理: {:#}", e);
                vec![]
            }
        }
    }

    async fn download_collection(&self, urls: &[String], target: &str) -> Result<String> {
        let names: Vec<String> = urls.iter().map(|_| random_name()).collect();

        for (name, url) in names.iter().zip(urls) {
            self.client.add_subscription(name, url).await?;
        }
        info!("✅ 已注册 {} 个订阅", names.len());

        info!("📦 注册订阅集合...");
        let collection = random_name();
        self.client.add_collection(&collection, &names).await?;
        info!("✅ 订阅集合已注册");

        info!("📥 下载订阅集合...");
        let content = self.client.download_collection(&collection, target).await?;
        info!("✅ 订阅集合已下载");

        Ok(content)
    }
}

fn non_empty(urls: &[String]) -> Vec<String> {
    urls.iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}
