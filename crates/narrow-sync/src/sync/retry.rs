//! bootstrap 请求的重试执行器
//!
//! 失败即吞掉并在退避后重试，没有最大次数：bootstrap 数据是必需的，放弃会让 App 不可用。
//! 唯一的退出方式是会话关闭时取消 token。这是系统中唯一的重试原语，调用方不要再叠加重试。

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::error::{NarrowSyncError, Result};

#[derive(Debug, Clone)]
pub struct RetryRunner {
    config: RetryConfig,
    cancel: CancellationToken,
}

impl RetryRunner {
    pub fn new(config: RetryConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 基础延迟 = base_delay * (backoff_factor ^ (attempt - 1))
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base_delay = self.config.base_delay_ms as f64 * self.config.backoff_factor.powi(exponent);
        let capped_delay = base_delay.min(self.config.max_delay_ms as f64);

        // 添加随机抖动
        let jitter = capped_delay * self.config.jitter_factor * (rand::random::<f64>() - 0.5);
        let final_delay = (capped_delay + jitter).max(0.0);
        Duration::from_millis(final_delay as u64)
    }

    /// 反复执行 `operation` 直到成功并返回其结果
    ///
    /// 只有 token 被取消时才返回 `Err(Cancelled)`。
    pub async fn try_until_successful<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(NarrowSyncError::Cancelled(format!("{} 已取消", label)));
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(NarrowSyncError::Cancelled(format!("{} 已取消", label)));
                }
                result = operation() => result,
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        info!("✅ {} 重试成功: attempt={}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "⚠️ {} 失败，{}ms 后重试: attempt={}, error={}",
                        label,
                        delay.as_millis(),
                        attempt,
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            return Err(NarrowSyncError::Cancelled(format!("{} 已取消", label)));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
