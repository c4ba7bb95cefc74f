//! 日志初始化

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// 初始化全局tracing订阅器
///
/// RUST_LOG存在时优先生效，否则使用配置中的级别。
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
