//! 同步引擎配置
//!
//! 由宿主 App 注入，核心从不读取环境变量。

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NarrowSyncError, Result};

/// 认证上下文（服务器身份 + 凭据）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    /// 服务器地址，例如 https://chat.example.com
    pub realm: String,
    pub email: String,
    /// 为空表示尚未登录
    pub api_key: String,
}

impl Auth {
    pub fn new(realm: impl Into<String>, email: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            email: email.into(),
            api_key: api_key.into(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// 重试配置（仅用于 bootstrap 请求）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 基础延迟（毫秒）
    pub base_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// 同步引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 每页消息数（PAGE_SIZE）
    pub messages_per_request: u32,
    /// 启动时回填「全部私聊」的条数
    pub all_private_backfill: u32,
    /// 是否在 bootstrap 时初始化通知
    pub enable_notifications: bool,
    /// 在线心跳（focus ping）间隔（秒）
    pub focus_ping_interval_secs: u64,
    /// 单次增量拉取超时（秒）
    pub fetch_timeout_secs: u64,
    /// 最多保留多少个 narrow 的同步状态
    pub narrow_cache_capacity: usize,
    /// 事件广播缓冲区大小
    pub event_buffer_size: usize,
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            messages_per_request: 20,
            all_private_backfill: 100,
            enable_notifications: false,
            focus_ping_interval_secs: 60,
            fetch_timeout_secs: 30,
            narrow_cache_capacity: 32,
            event_buffer_size: 256,
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// 从宿主 App 传入的 JSON 解析配置，缺省字段取默认值
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn focus_ping_interval(&self) -> Duration {
        Duration::from_secs(self.focus_ping_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.messages_per_request == 0 {
            return Err(NarrowSyncError::Config("messages_per_request 必须大于 0".into()));
        }
        if self.narrow_cache_capacity == 0 {
            return Err(NarrowSyncError::Config("narrow_cache_capacity 必须大于 0".into()));
        }
        if self.event_buffer_size == 0 {
            return Err(NarrowSyncError::Config("event_buffer_size 必须大于 0".into()));
        }
        if self.focus_ping_interval_secs == 0 {
            return Err(NarrowSyncError::Config("focus_ping_interval_secs 必须大于 0".into()));
        }
        let retry = &self.retry;
        if retry.backoff_factor < 1.0 {
            return Err(NarrowSyncError::Config("retry.backoff_factor 不能小于 1.0".into()));
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(NarrowSyncError::Config("retry.jitter_factor 必须在 0.0-1.0 之间".into()));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(NarrowSyncError::Config("retry.max_delay_ms 不能小于 base_delay_ms".into()));
        }
        Ok(())
    }
}

/// 同步引擎配置构建器
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn messages_per_request(mut self, count: u32) -> Self {
        self.config.messages_per_request = count;
        self
    }

    pub fn all_private_backfill(mut self, count: u32) -> Self {
        self.config.all_private_backfill = count;
        self
    }

    pub fn enable_notifications(mut self, enabled: bool) -> Self {
        self.config.enable_notifications = enabled;
        self
    }

    pub fn focus_ping_interval_secs(mut self, secs: u64) -> Self {
        self.config.focus_ping_interval_secs = secs;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn narrow_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.narrow_cache_capacity = capacity;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn build(self) -> Result<SyncConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = SyncConfig::builder()
            .messages_per_request(50)
            .enable_notifications(true)
            .narrow_cache_capacity(4)
            .build()
            .unwrap();

        assert_eq!(config.messages_per_request, 50);
        assert!(config.enable_notifications);
        assert_eq!(config.narrow_cache_capacity, 4);
        assert_eq!(config.focus_ping_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_builder_rejects_zero_page_size() {
        let result = SyncConfig::builder().messages_per_request(0).build();
        assert!(matches!(result, Err(NarrowSyncError::Config(_))));
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = SyncConfig::from_json(r#"{"messages_per_request": 10}"#).unwrap();
        assert_eq!(config.messages_per_request, 10);
        assert_eq!(config.all_private_backfill, 100);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_invalid_jitter_rejected() {
        let retry = RetryConfig {
            jitter_factor: 1.5,
            ..RetryConfig::default()
        };
        assert!(SyncConfig::builder().retry(retry).build().is_err());
    }

    #[test]
    fn test_auth_api_key() {
        assert!(!Auth::default().has_api_key());
        assert!(Auth::new("https://chat.example.com", "me@example.com", "abc").has_api_key());
    }
}
