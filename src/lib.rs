//! 订阅节点分段健康检查与隔离管理

pub mod app;
pub mod check;
pub mod clash_proxy;
pub mod config;
pub mod error;
pub mod output;
pub mod proxy;
pub mod quarantine;
pub mod subscription;
pub mod ui;

pub use check::{HealthCheckConfig, HealthCheckResult, ProxyChecker, QualifiedOrder};
pub use clash_proxy::HealthProbe;
pub use error::{ConfigError, HealthCheckError};
pub use proxy::{ProxyKey, ProxyRecord};
pub use quarantine::{ExclusionTracker, QuarantineEntry};
