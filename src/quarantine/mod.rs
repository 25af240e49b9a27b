//! 隔离状态跟踪
//! 按代理身份记录连续失败次数，超过阈值的节点在后续轮次中跳过检测

use crate::error::ConfigError;
use crate::proxy::{ProxyKey, ProxyRecord};
use anyhow::anyhow;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

fn default_failures() -> u32 {
    1
}

/// 单个身份的失败历史
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    #[serde(rename = "type")]
    pub proxy_type: String,
    pub server: String,
    pub port: u16,
    /// 连续失败次数，下载的数据缺省时按 1 计
    #[serde(rename = "_excluded_times", default = "default_failures")]
    pub consecutive_failures: u32,
}

impl QuarantineEntry {
    pub fn new(key: ProxyKey, consecutive_failures: u32) -> Self {
        Self {
            proxy_type: key.proxy_type,
            server: key.server,
            port: key.port,
            consecutive_failures,
        }
    }

    pub fn key(&self) -> ProxyKey {
        ProxyKey::new(self.proxy_type.clone(), self.server.clone(), self.port)
    }
}

/// 隔离状态跟踪器
///
/// 每个身份至多一条记录。两次成功之间失败计数只增不减，
/// 任意一次成功都会移除整条记录。
#[derive(Debug, Clone)]
pub struct ExclusionTracker {
    max_excluded_times: u32,
    entries: HashMap<ProxyKey, QuarantineEntry>,
}

impl ExclusionTracker {
    /// 用上一轮保存下来的隔离数据初始化，重复身份以后出现的为准
    pub fn new(max_excluded_times: u32, prior: Vec<QuarantineEntry>) -> Result<Self, ConfigError> {
        if max_excluded_times == 0 {
            return Err(ConfigError::InvalidMaxExcludedTimes);
        }

        let entries = prior
            .into_iter()
            .map(|entry| (entry.key(), entry))
            .collect();

        Ok(Self {
            max_excluded_times,
            entries,
        })
    }

    /// 节点自带的计数或已记录的计数达到阈值即跳过
    pub fn should_exclude(&self, proxy: &ProxyRecord) -> bool {
        if proxy.excluded_times.unwrap_or(0) >= self.max_excluded_times {
            return true;
        }

        self.entries
            .get(&proxy.key())
            .is_some_and(|entry| entry.consecutive_failures >= self.max_excluded_times)
    }

    /// 记录一次失败。每次调用代表一次真实的失败检测，重复调用会重复计数
    pub fn mark_failed(&mut self, proxy: &ProxyRecord) {
        let key = proxy.key();
        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            QuarantineEntry::new(key, proxy.excluded_times.unwrap_or(0))
        });
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        debug!(
            "标记失败 {}-{}-{}: {} 次",
            entry.proxy_type, entry.server, entry.port, entry.consecutive_failures
        );
    }

    pub fn mark_succeeded(&mut self, proxy: &ProxyRecord) {
        if self.entries.remove(&proxy.key()).is_some() {
            debug!("解除隔离 {}", proxy.key());
        }
    }

    /// 跳过检测的节点只靠自带计数被隔离时，补一条同计数的记录，使其保留在输出中
    pub fn carry_over(&mut self, proxy: &ProxyRecord) {
        let key = proxy.key();
        if let Some(times) = proxy.excluded_times {
            if times > 0 {
                self.entries
                    .entry(key.clone())
                    .or_insert_with(|| QuarantineEntry::new(key, times));
            }
        }
    }

    pub fn get(&self, key: &ProxyKey) -> Option<&QuarantineEntry> {
        self.entries.get(key)
    }

    /// 当前全部记录，顺序不保证
    pub fn snapshot(&self) -> Vec<QuarantineEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 解析隔离数据，支持 `{ proxies: [...] }` 或直接的列表
pub fn parse_entries_yaml(content: &str) -> anyhow::Result<Vec<QuarantineEntry>> {
    let yaml: Value = serde_yaml::from_str(content)?;

    let list = match yaml {
        Value::Sequence(_) => yaml,
        Value::Mapping(_) => match yaml.get("proxies") {
            Some(Value::Null) | None => return Ok(vec![]),
            Some(v) => v.clone(),
        },
        Value::Null => return Ok(vec![]),
        _ => return Err(anyhow!("隔离数据格式无效")),
    };

    let raw: Vec<Value> = serde_yaml::from_value(list)?;

    // 单条记录格式错误只丢弃该条
    let mut entries = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_yaml::from_value::<QuarantineEntry>(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("⚠️ 跳过无法解析的隔离记录: {}", e),
        }
    }

    Ok(entries)
}

pub fn load_entries_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<QuarantineEntry>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow!("读取隔离文件 {} 失败: {}", path.display(), e))?;
    parse_entries_yaml(&content)
}
