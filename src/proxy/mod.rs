//! 代理节点记录与身份标识
//! 身份只由 (type, server, port) 决定，名称和其他协议字段不参与

use anyhow::anyhow;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// 代理身份标识
///
/// 结构化比较，天然满足单射；派生的 `Ord` 按 type、server、port 依次做字典序比较。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyKey {
    pub proxy_type: String,
    pub server: String,
    pub port: u16,
}

impl ProxyKey {
    pub fn new(proxy_type: impl Into<String>, server: impl Into<String>, port: u16) -> Self {
        Self {
            proxy_type: proxy_type.into(),
            server: server.into(),
            port,
        }
    }
}

impl fmt::Display for ProxyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.proxy_type, self.server, self.port)
    }
}

/// 一个待检测的代理节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    /// 节点名称，仅用于展示和代理核心内的寻址
    pub name: String,
    /// 协议类型（ss, vmess, trojan ...）
    #[serde(rename = "type")]
    pub proxy_type: String,
    pub server: String,
    pub port: u16,
    /// 上游数据自带的连续失败次数（只读）
    #[serde(
        rename = "_excluded_times",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub excluded_times: Option<u32>,
    /// 协议相关的其余字段，原样透传
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl ProxyRecord {
    pub fn new(name: String, proxy_type: String, server: String, port: u16) -> Self {
        Self {
            name,
            proxy_type,
            server,
            port,
            excluded_times: None,
            extra: serde_yaml::Mapping::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(Value::String(key.to_string()), value.into());
        self
    }

    pub fn with_excluded_times(mut self, times: u32) -> Self {
        self.excluded_times = Some(times);
        self
    }

    pub fn key(&self) -> ProxyKey {
        ProxyKey::new(self.proxy_type.clone(), self.server.clone(), self.port)
    }
}

/// `{ proxies: [...] }` 形式的代理文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyDocument {
    #[serde(default)]
    pub proxies: Vec<ProxyRecord>,
}

#[derive(Serialize)]
struct ProxyBatch<'a> {
    proxies: &'a [ProxyRecord],
}

/// 把一批代理序列化为推送给代理核心的 YAML 配置
pub fn to_config_yaml(proxies: &[ProxyRecord]) -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(&ProxyBatch { proxies })?)
}

/// 解析 `{ proxies: [...] }` 形式的 YAML，缺少 proxies 字段时返回空列表
pub fn parse_proxies_yaml(content: &str) -> anyhow::Result<Vec<ProxyRecord>> {
    let yaml: Value = serde_yaml::from_str(content)?;

    let proxies_value = match yaml.get("proxies") {
        Some(Value::Null) | None => return Ok(vec![]),
        Some(v) => v.clone(),
    };

    let raw: Vec<Value> = serde_yaml::from_value(proxies_value)
        .map_err(|e| anyhow!("解析 'proxies' 失败: {}", e))?;

    // 单个节点格式错误不影响其他节点
    let mut proxies = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_yaml::from_value::<ProxyRecord>(value) {
            Ok(proxy) => match validate_proxy_record(&proxy) {
                Ok(()) => proxies.push(proxy),
                Err(e) => warn!("⚠️ 跳过无效节点 {}: {}", proxy.name, e),
            },
            Err(e) => warn!("⚠️ 跳过无法解析的节点: {}", e),
        }
    }

    Ok(proxies)
}

pub fn load_proxies_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<ProxyRecord>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow!("读取代理文件 {} 失败: {}", path.display(), e))?;
    parse_proxies_yaml(&content)
}

pub fn validate_proxy_record(proxy: &ProxyRecord) -> anyhow::Result<()> {
    if proxy.server.is_empty() {
        return Err(anyhow!("服务器地址不能为空"));
    }

    if proxy.port == 0 {
        return Err(anyhow!("端口号不能为0"));
    }

    if proxy.proxy_type.is_empty() {
        return Err(anyhow!("协议不能为空"));
    }

    Ok(())
}

/// 按身份去重，保留第一次出现的记录
pub fn dedup_by_key(proxies: Vec<ProxyRecord>) -> Vec<ProxyRecord> {
    let mut seen = HashSet::new();
    proxies
        .into_iter()
        .filter(|proxy| seen.insert(proxy.key()))
        .collect()
}

/// 为重名节点追加 `-1`、`-2` ... 后缀
pub fn suffix_duplicate_names(proxies: &[ProxyRecord]) -> Vec<ProxyRecord> {
    let mut name_counts: HashMap<String, usize> = HashMap::new();

    proxies
        .iter()
        .map(|proxy| {
            let count = name_counts.entry(proxy.name.clone()).or_insert(0);
            let mut renamed = proxy.clone();
            if *count >= 1 {
                renamed.name = format!("{}-{}", proxy.name, count);
            }
            *count += 1;
            renamed
        })
        .collect()
}
