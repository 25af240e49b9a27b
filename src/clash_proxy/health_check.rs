//! 基于 mihomo 外部控制接口的代理健康检查
//! 提供配置推送和延迟检测功能

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use std::time::{Duration, Instant};

use super::types::{ConfigPatch, DelayResponse, FAILED_DELAY, HelloResponse};

/// 配置推送的请求超时
const UPDATE_CONFIG_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// 推送配置后等待代理核心生效的时间
const SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// 延迟检测请求在检测超时之外额外预留的时间（毫秒）
pub const PROBE_GRACE_MS: u64 = 1000;

/// 代理健康检测客户端
///
/// `check` 对普通的不可达只返回失败值（-1），
/// 只有客户端自身的故障才返回 `Err`，由调用方折算为失败值。
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// 推送一批代理配置，完成后这些代理才可被检测
    async fn update_config(&self, payload: &str) -> Result<()>;

    /// 检测单个代理，返回正数延迟（毫秒）或失败值
    async fn check(&self, proxy_name: &str, test_url: &str, timeout_ms: u64) -> Result<i64>;
}

/// mihomo 外部控制接口客户端
#[derive(Debug, Clone)]
pub struct MihomoController {
    /// 控制接口地址，不带结尾的 `/`
    base_url: String,
    secret: Option<String>,
    client: Client,
}

impl MihomoController {
    /// 创建新的控制接口客户端
    pub fn new(base_url: &str, secret: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.secret {
            Some(secret) if !secret.is_empty() => request.bearer_auth(secret),
            _ => request,
        }
    }

    /// 构建延迟检测地址
    fn delay_url(&self, proxy_name: &str, test_url: &str, timeout_ms: u64) -> String {
        format!(
            "{}/proxies/{}/delay?url={}&timeout={}",
            self.base_url,
            urlencoding::encode(proxy_name),
            urlencoding::encode(test_url),
            timeout_ms
        )
    }

    /// 轮询控制接口直到代理核心就绪
    pub async fn wait_until_ready(&self, max_wait: Duration) -> Result<()> {
        let start = Instant::now();
        let mut attempts = 0u32;

        info!("🚀 等待代理核心就绪: {}", self.base_url);

        loop {
            attempts += 1;

            let request = self
                .authorize(self.client.get(format!("{}/", self.base_url)))
                .timeout(Duration::from_secs(5));

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let hello = resp.json::<HelloResponse>().await.unwrap_or_default();
                    if hello.hello.is_some() {
                        info!("✅ 代理核心已就绪 ({} 次尝试)", attempts);
                        return Ok(());
                    }
                    debug!("⏳ 代理核心已响应但尚未就绪");
                }
                Ok(resp) => debug!("⏳ 代理核心返回状态 {}，继续等待", resp.status()),
                Err(e) => debug!("⏳ 代理核心尚未启动: {}", e),
            }

            if start.elapsed() >= max_wait {
                return Err(anyhow!(
                    "代理核心在 {} 秒内未就绪",
                    max_wait.as_secs()
                ));
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[async_trait]
impl HealthProbe for MihomoController {
    async fn update_config(&self, payload: &str) -> Result<()> {
        let body = ConfigPatch { path: "", payload };

        let response = self
            .authorize(self.client.put(format!("{}/configs", self.base_url)))
            .json(&body)
            .timeout(UPDATE_CONFIG_TIMEOUT)
            .send()
            .await
            .map_err(|e| anyhow!("推送配置失败: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("推送配置失败，状态码 {}: {}", status, text));
        }

        tokio::time::sleep(SETTLE_DELAY).await;
        Ok(())
    }

    async fn check(&self, proxy_name: &str, test_url: &str, timeout_ms: u64) -> Result<i64> {
        let url = self.delay_url(proxy_name, test_url, timeout_ms);

        let response = self
            .authorize(self.client.get(&url))
            .timeout(Duration::from_millis(timeout_ms.saturating_add(PROBE_GRACE_MS)))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let body = resp.json::<DelayResponse>().await.unwrap_or_default();
                if let Some(message) = &body.message {
                    debug!("检测 {} 未通过: {}", proxy_name, message);
                }
                Ok(body.into_delay())
            }
            Ok(resp) => {
                debug!("检测 {} 返回状态 {}", proxy_name, resp.status());
                Ok(FAILED_DELAY)
            }
            Err(e) => {
                debug!("检测 {} 失败: {}", proxy_name, e);
                Ok(FAILED_DELAY)
            }
        }
    }
}
