//! Sub-Store 后端接口客户端

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{Value, json};
use std::time::Duration;

use super::SubscriptionClient;

/// Sub-Store 支持的节点协议
const SUPPORTED_TYPES: &[&str] = &[
    "ss", "ssr", "vless", "vmess", "trojan", "http", "snell", "socks5", "tuic", "hysteria2",
    "hysteria", "mieru", "wireguard", "direct", "ssh", "anytls",
];

/// 按 type-server-port 去重的脚本过滤器
const DEDUP_SCRIPT: &str = "function filter(proxies, targetPlatform) {\n  const identifiers = [];\n  return proxies.map((proxy) => {\n    const identifier = `${proxy.type}-${proxy.server}-${proxy.port}`;\n    if (identifiers.includes(identifier)) return false;\n    identifiers.push(identifier);\n    return true;\n  });\n}\n";

#[derive(Debug, Clone)]
pub struct SubStoreClient {
    base_url: String,
    client: Client,
}

fn quick_setting(useless: &str) -> Value {
    json!({
        "type": "Quick Setting Operator",
        "args": {
            "useless": useless,
            "udp": "DEFAULT",
            "scert": "DEFAULT",
            "tfo": "DEFAULT",
            "vmess aead": "DEFAULT"
        }
    })
}

async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(anyhow!("{}失败，状态码 {}: {}", action, status, text))
}

impl SubStoreClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl SubscriptionClient for SubStoreClient {
    async fn add_subscription(&self, name: &str, url: &str) -> Result<()> {
        let body = json!({
            "name": name,
            "displayName": "",
            "form": "",
            "remark": "",
            "mergeSources": "",
            "ignoreFailedRemoteSub": false,
            "passThroughUA": false,
            "icon": "",
            "isIconColor": true,
            "process": [quick_setting("DISABLED")],
            "tag": [],
            "subscriptionTags": [],
            "source": "remote",
            "url": format!("{}#noFlow", url.trim()),
            "content": "",
            "ua": "clash.meta",
            "subscriptions": [],
            "display-name": ""
        });

        let response = self
            .client
            .post(format!("{}/api/subs", self.base_url))
            .json(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        ensure_success(response, "注册订阅").await?;
        Ok(())
    }

    async fn add_collection(&self, name: &str, subscriptions: &[String]) -> Result<()> {
        let body = json!({
            "name": name,
            "displayName": "",
            "form": "",
            "remark": "",
            "mergeSources": "",
            "ignoreFailedRemoteSub": "enabled",
            "passThroughUA": false,
            "icon": "",
            "isIconColor": true,
            "process": [
                quick_setting("ENABLED"),
                {
                    "type": "Type Filter",
                    "args": { "keep": true, "value": SUPPORTED_TYPES },
                    "customName": "协议过滤",
                    "disabled": false
                },
                {
                    "type": "Script Filter",
                    "args": { "content": DEDUP_SCRIPT, "mode": "script", "arguments": {} },
                    "customName": "节点去重",
                    "disabled": false
                },
                {
                    "type": "Handle Duplicate Operator",
                    "args": {
                        "action": "rename",
                        "position": "back",
                        "template": "0 1 2 3 4 5 6 7 8 9",
                        "link": "-"
                    },
                    "customName": "节点后缀",
                    "disabled": false
                }
            ],
            "subscriptions": subscriptions,
            "tag": [],
            "subscriptionTags": [],
            "display-name": ""
        });

        let response = self
            .client
            .post(format!("{}/api/collections", self.base_url))
            .json(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        ensure_success(response, "注册订阅集合").await?;
        Ok(())
    }

    async fn download_collection(&self, name: &str, target: &str) -> Result<String> {
        let response = self
            .client
            .get(format!(
                "{}/download/collection/{}",
                self.base_url,
                urlencoding::encode(name)
            ))
            .query(&[("target", target)])
            .timeout(Duration::from_secs(20 * 60))
            .send()
            .await?;
        let response = ensure_success(response, "下载订阅集合").await?;
        Ok(response.text().await?)
    }
}
