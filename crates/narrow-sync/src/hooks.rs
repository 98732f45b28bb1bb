//! 外部协作方边界
//!
//! 同步核心只负责在正确的时机触发这些协作方，不关心其内部实现：
//! - 事件轮询：bootstrap 必需数据到达后用 (queue_id, last_event_id) 启动一次
//! - 推送通知：初始化 + 在有 api_key 且尚无 token 时注册
//! - 发件箱：剩余 bootstrap 数据到达后冲刷待发消息
//! - 在线状态：周期性 focus ping

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::config::Auth;
use crate::error::Result;

#[async_trait]
pub trait EventPoller: Send + Sync {
    async fn start_event_polling(&self, queue_id: &str, last_event_id: i64) -> Result<()>;
}

#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn init_notifications(&self, auth: &Auth) -> Result<()>;

    /// 注册推送 token（fire-and-forget）
    async fn refresh_notification_token(&self, auth: &Auth) -> Result<()>;
}

#[async_trait]
pub trait Outbox: Send + Sync {
    async fn try_send_messages(&self) -> Result<()>;
}

#[async_trait]
pub trait PresenceReporter: Send + Sync {
    async fn send_focus_ping(&self, auth: &Auth) -> Result<()>;
}

/// 协作方集合
#[derive(Clone)]
pub struct Collaborators {
    pub event_poller: Arc<dyn EventPoller>,
    pub notifications: Arc<dyn NotificationHandler>,
    pub outbox: Arc<dyn Outbox>,
    pub presence: Arc<dyn PresenceReporter>,
}

impl Collaborators {
    /// 所有协作方都是空实现，只打日志
    pub fn noop() -> Self {
        let noop = Arc::new(NoopCollaborator);
        Self {
            event_poller: noop.clone(),
            notifications: noop.clone(),
            outbox: noop.clone(),
            presence: noop,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::noop()
    }
}

#[derive(Debug, Default)]
pub struct NoopCollaborator;

#[async_trait]
impl EventPoller for NoopCollaborator {
    async fn start_event_polling(&self, queue_id: &str, last_event_id: i64) -> Result<()> {
        debug!("[noop] start_event_polling: queue_id={}, last_event_id={}", queue_id, last_event_id);
        Ok(())
    }
}

#[async_trait]
impl NotificationHandler for NoopCollaborator {
    async fn init_notifications(&self, _auth: &Auth) -> Result<()> {
        debug!("[noop] init_notifications");
        Ok(())
    }

    async fn refresh_notification_token(&self, _auth: &Auth) -> Result<()> {
        debug!("[noop] refresh_notification_token");
        Ok(())
    }
}

#[async_trait]
impl Outbox for NoopCollaborator {
    async fn try_send_messages(&self) -> Result<()> {
        debug!("[noop] try_send_messages");
        Ok(())
    }
}

#[async_trait]
impl PresenceReporter for NoopCollaborator {
    async fn send_focus_ping(&self, _auth: &Auth) -> Result<()> {
        debug!("[noop] send_focus_ping");
        Ok(())
    }
}
