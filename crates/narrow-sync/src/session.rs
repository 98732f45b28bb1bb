//! 同步会话
//!
//! 一个登录会话对应一个 [`SyncSession`]：持有编排器、共享状态、focus ping 任务和取消 token。
//! `shutdown()`（或 drop）会取消挂起的 bootstrap 重试并停止 focus ping。

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ChatApi;
use crate::config::{Auth, SyncConfig};
use crate::error::Result;
use crate::events::{EventManager, SyncEvent};
use crate::hooks::Collaborators;
use crate::lifecycle::{LifecycleHook, SyncLifecycleHook};
use crate::narrow::Narrow;
use crate::sync::orchestrator::{BootstrapPhase, FetchOrchestrator, InitialFetch};
use crate::sync::state::{AppSyncState, NarrowSyncState, SyncStore};
use crate::sync::store::StoreHandle;

#[derive(Default)]
struct SessionTasks {
    initial_fetch: Option<InitialFetch>,
    focus_ping: Option<JoinHandle<()>>,
}

pub struct SyncSession {
    orchestrator: Arc<FetchOrchestrator>,
    config: SyncConfig,
    cancel: CancellationToken,
    tasks: Mutex<SessionTasks>,
}

impl SyncSession {
    pub fn new(
        api: Arc<dyn ChatApi>,
        auth: Auth,
        config: SyncConfig,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let events = Arc::new(EventManager::new(config.event_buffer_size));
        let store = StoreHandle::new(SyncStore::new(config.narrow_cache_capacity), events);
        let cancel = CancellationToken::new();
        let orchestrator = Arc::new(FetchOrchestrator::new(
            api,
            auth,
            config.clone(),
            collaborators,
            store,
            cancel.clone(),
        ));

        info!(
            "✅ 同步会话已创建: page_size={}, narrow_cache_capacity={}",
            config.messages_per_request, config.narrow_cache_capacity
        );
        Ok(Arc::new(Self {
            orchestrator,
            config,
            cancel,
            tasks: Mutex::new(SessionTasks::default()),
        }))
    }

    /// 启动 bootstrap 和 focus ping；已启动或已关闭时返回 false
    pub fn start(&self) -> bool {
        let Some(initial_fetch) = self.orchestrator.do_initial_fetch() else {
            return false;
        };
        self.tasks.lock().initial_fetch = Some(initial_fetch);
        self.start_focus_ping();
        true
    }

    /// 立即发送一次，之后按固定间隔发送，直到会话关闭
    fn start_focus_ping(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.focus_ping.is_some() {
            return;
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let cancel = self.cancel.clone();
        let period = self.config.focus_ping_interval();
        info!("💓 启动 focus ping: interval={}s", period.as_secs());

        tasks.focus_ping = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("focus ping 任务退出");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = orchestrator.send_focus_ping().await {
                            warn!("⚠️ focus ping 失败: {}", e);
                        }
                    }
                }
            }
        }));
    }

    /// App 回到前台：尚未 bootstrap 则启动，否则发送一次 focus ping
    pub async fn on_foreground(&self) -> Result<()> {
        if self.is_shutdown() {
            debug!("会话已关闭，忽略前台事件");
            return Ok(());
        }
        if !self.orchestrator.progress().is_started() {
            info!("🔄 前台恢复：开始 bootstrap");
            self.start();
            return Ok(());
        }
        self.orchestrator.send_focus_ping().await
    }

    pub async fn on_background(&self) -> Result<()> {
        debug!("App 切换到后台，同步会话不做处理");
        Ok(())
    }

    /// 取消挂起的 bootstrap 重试并停止 focus ping
    pub fn shutdown(&self) {
        if self.is_shutdown() {
            return;
        }
        info!("🛑 关闭同步会话");
        self.orchestrator.cancel();
        self.cancel.cancel();
        let mut tasks = self.tasks.lock();
        if let Some(handle) = tasks.focus_ping.take() {
            handle.abort();
        }
        tasks.initial_fetch = None;
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn lifecycle_hook(self: &Arc<Self>) -> Arc<dyn LifecycleHook> {
        Arc::new(SyncLifecycleHook::new(Arc::downgrade(self)))
    }

    /// 取走 bootstrap 任务句柄，由调用方 join 以拿到具体错误
    pub fn take_initial_fetch(&self) -> Option<InitialFetch> {
        self.tasks.lock().initial_fetch.take()
    }

    pub async fn wait_until_bootstrapped(&self) -> Result<()> {
        self.orchestrator.wait_until_bootstrapped().await
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.orchestrator.phase()
    }

    pub async fn fetch_older(&self) -> Result<bool> {
        self.orchestrator.fetch_older().await
    }

    pub async fn fetch_newer(&self) -> Result<bool> {
        self.orchestrator.fetch_newer().await
    }

    pub async fn fetch_messages(
        &self,
        anchor: u64,
        num_before: u32,
        num_after: u32,
        narrow: Narrow,
        use_first_unread: bool,
    ) -> Result<()> {
        self.orchestrator
            .fetch_messages(anchor, num_before, num_after, narrow, use_first_unread)
            .await
    }

    pub async fn fetch_messages_at_first_unread(&self, narrow: Narrow) -> Result<()> {
        self.orchestrator.fetch_messages_at_first_unread(narrow).await
    }

    /// 导航到 narrow
    pub fn set_active_narrow(&self, narrow: Narrow) {
        self.orchestrator.set_active_narrow(narrow);
    }

    pub fn mark_messages_read(&self, message_ids: Vec<u64>) {
        self.orchestrator.mark_messages_read(message_ids);
    }

    pub fn set_push_token(&self, token: impl Into<String>) {
        self.orchestrator.set_push_token(token);
    }

    pub fn app_state(&self) -> AppSyncState {
        self.orchestrator.store().app_state()
    }

    pub fn narrow_state(&self, narrow: &Narrow) -> Option<NarrowSyncState> {
        self.orchestrator.store().narrow_state(narrow)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.orchestrator.store().events().subscribe()
    }

    pub fn events(&self) -> &Arc<EventManager> {
        self.orchestrator.store().events()
    }

    pub fn orchestrator(&self) -> &Arc<FetchOrchestrator> {
        &self.orchestrator
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
