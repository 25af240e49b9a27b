//! 代理核心控制接口的数据结构

use serde::{Deserialize, Serialize};

/// 检测失败时使用的延迟值
pub const FAILED_DELAY: i64 = -1;

/// `PUT /configs` 请求体
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPatch<'a> {
    pub path: &'a str,
    pub payload: &'a str,
}

/// `GET /proxies/{name}/delay` 响应体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelayResponse {
    #[serde(default)]
    pub delay: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl DelayResponse {
    /// 正数延迟视为成功，其余一律折算为失败值
    pub fn into_delay(self) -> i64 {
        match self.delay {
            Some(delay) if delay > 0 => delay,
            _ => FAILED_DELAY,
        }
    }
}

/// `GET /` 响应体，代理核心就绪后返回 `{"hello": "mihomo"}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelloResponse {
    #[serde(default)]
    pub hello: Option<String>,
}
