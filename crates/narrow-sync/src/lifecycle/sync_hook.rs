//! 同步会话生命周期 Hook
//!
//! App 回到前台时重新驱动同步：尚未 bootstrap 则启动，否则发送 focus ping。

use async_trait::async_trait;
use std::sync::Weak;
use tracing::debug;

use crate::error::Result;
use crate::lifecycle::LifecycleHook;
use crate::session::SyncSession;

/// 只持有弱引用，会话释放后变为空操作
pub struct SyncLifecycleHook {
    session: Weak<SyncSession>,
}

impl SyncLifecycleHook {
    pub fn new(session: Weak<SyncSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl LifecycleHook for SyncLifecycleHook {
    async fn on_background(&self) -> Result<()> {
        match self.session.upgrade() {
            Some(session) => session.on_background().await,
            None => Ok(()),
        }
    }

    async fn on_foreground(&self) -> Result<()> {
        match self.session.upgrade() {
            Some(session) => session.on_foreground().await,
            None => {
                debug!("[Sync Hook] 会话已释放，忽略前台事件");
                Ok(())
            }
        }
    }
}
