//! 代理核心模块封装
//! 对外提供代理核心控制接口与配置模板

// 导入子模块
mod health_check;
mod template;
mod types;

// 对外暴露公共类型和结构体（仅导出需要外部使用的部分）
pub use health_check::{HealthProbe, MihomoController, PROBE_GRACE_MS};
pub use template::build_clash_meta_config;
pub use types::FAILED_DELAY;
