//! 生命周期管理
//!
//! App 前后台切换是唯一会重新驱动同步的外部信号，由宿主 App 通过 [`LifecycleManager`] 统一分发。

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;

/// 生命周期回调 Hook
///
/// 各模块通过实现此 trait 来响应生命周期变化
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// App 切换到后台时调用
    async fn on_background(&self) -> Result<()>;

    /// App 切换到前台时调用
    async fn on_foreground(&self) -> Result<()>;
}

/// 生命周期管理器
pub struct LifecycleManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub fn register_hook(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
        info!("✅ 生命周期 Hook 已注册: 当前共 {} 个", self.hooks.len());
    }

    /// 通知所有 Hook：App 切换到后台
    ///
    /// 按注册顺序执行，某个 Hook 失败时记录错误并继续，最后返回第一个错误
    pub async fn notify_background(&self) -> Result<()> {
        info!("🔄 通知所有模块：App 切换到后台");

        let mut first_error = None;
        let mut failed = 0;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_background().await {
                warn!("⚠️ Hook #{} 后台切换失败: {}", index, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => {
                warn!("⚠️ {} 个模块后台切换失败，但所有模块都已尝试执行", failed);
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// 通知所有 Hook：App 切换到前台
    ///
    /// 按注册顺序执行，某个 Hook 失败时记录错误并继续，最后返回第一个错误
    pub async fn notify_foreground(&self) -> Result<()> {
        info!("🔄 通知所有模块：App 切换到前台");

        let mut first_error = None;
        let mut failed = 0;
        for (index, hook) in self.hooks.iter().enumerate() {
            if let Err(e) = hook.on_foreground().await {
                warn!("⚠️ Hook #{} 前台切换失败: {}", index, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => {
                warn!("⚠️ {} 个模块前台切换失败，但所有模块都已尝试执行", failed);
                Err(e)
            }
            None => {
                info!("✅ 所有模块前台切换完成");
                Ok(())
            }
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

// 同步会话的 Hook
mod sync_hook;
pub use sync_hook::SyncLifecycleHook;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NarrowSyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LifecycleHook for CountingHook {
        async fn on_background(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_foreground(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NarrowSyncError::InvalidState("foreground failed".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_stop_others() {
        let failing = Arc::new(CountingHook { calls: AtomicUsize::new(0), fail: true });
        let healthy = Arc::new(CountingHook { calls: AtomicUsize::new(0), fail: false });

        let mut manager = LifecycleManager::new();
        manager.register_hook(failing.clone());
        manager.register_hook(healthy.clone());
        assert_eq!(manager.hook_count(), 2);

        let result = manager.notify_foreground().await;
        assert!(matches!(result, Err(NarrowSyncError::InvalidState(_))));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);

        manager.notify_background().await.unwrap();
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 2);
    }
}
