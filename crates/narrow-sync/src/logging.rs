/// 日志初始化
///
/// 宿主 App 启动时调用一次；`RUST_LOG` 优先于 `default_filter`。
/// 重复调用是安全的（`try_init` 失败即忽略）。
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(true)
        .try_init();
}

/// 测试用：输出到 test writer，便于 `cargo test -- --nocapture` 查看
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "narrow_sync=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
