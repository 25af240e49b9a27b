use crate::check::{HealthCheckConfig, QualifiedOrder};
use crate::error::ConfigError;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

/// 覆盖控制接口端口的环境变量
pub const ENV_CONTROLLER_PORT: &str = "EXTERNAL_CONTROLLER_PORT";
/// 覆盖 Sub-Store 端口的环境变量
pub const ENV_SUB_STORE_PORT: &str = "SUB_STORE_BACKEND_API_PORT";

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // 代理来源
    pub proxies_config_urls: Vec<String>,
    pub proxies_files: Vec<String>,

    // 上一轮的隔离数据
    pub excluded_proxies_config_urls: Vec<String>,
    pub excluded_files: Vec<String>,

    // 检测参数
    pub segment_size: usize,
    pub concurrency: usize,
    pub test_url: String,
    pub timeout: u64,
    pub max_excluded_times: u32,
    pub sort_by_delay: bool,

    // 输出配置
    pub qualified: String,
    pub excluded: String,
    pub statistics: String,

    // 外部服务
    pub controller_url: String,
    pub controller_secret: Option<String>,
    pub sub_store_url: String,

    // 进度与日志
    pub print_progress: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxies_config_urls: vec![],
            proxies_files: vec![],
            excluded_proxies_config_urls: vec![],
            excluded_files: vec![],
            segment_size: 100,
            concurrency: default_concurrency(),
            test_url: "https://www.google.com/generate_204".to_string(),
            timeout: 1500,
            max_excluded_times: 3,
            sort_by_delay: true,
            qualified: "qualified.yaml".to_string(),
            excluded: "excluded.yaml".to_string(),
            statistics: "statistics.md".to_string(),
            controller_url: "http://127.0.0.1:9090".to_string(),
            controller_secret: None,
            sub_store_url: "http://127.0.0.1:3000".to_string(),
            print_progress: false,
            log_level: "info".to_string(),
        }
    }
}

/// 替换地址中的端口
fn with_port(raw: &str, port: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| invalid(format!("端口无效: {}", port)))?;
    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    url.set_port(Some(port))
        .map_err(|_| invalid("无法设置端口".to_string()))?;

    Ok(url.as_str().trim_end_matches('/').to_string())
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 应用进程环境变量中的端口覆盖
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_CONTROLLER_PORT) {
            self.controller_url = with_port(&self.controller_url, &port)?;
            info!("控制接口地址由环境变量覆盖: {}", self.controller_url);
        }

        if let Some(port) = lookup(ENV_SUB_STORE_PORT) {
            self.sub_store_url = with_port(&self.sub_store_url, &port)?;
            info!("Sub-Store 地址由环境变量覆盖: {}", self.sub_store_url);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.health_check_config().validate()?;

        if self.max_excluded_times == 0 {
            return Err(ConfigError::InvalidMaxExcludedTimes);
        }

        for url in [&self.controller_url, &self.sub_store_url] {
            Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    pub fn health_check_config(&self) -> HealthCheckConfig {
        let order = if self.sort_by_delay {
            QualifiedOrder::Delay
        } else {
            QualifiedOrder::Input
        };

        HealthCheckConfig::new(
            self.segment_size,
            self.concurrency,
            self.test_url.clone(),
            self.timeout,
        )
        .with_qualified_order(order)
    }
}
