//! 拉取编排层
//!
//! **bootstrap 状态机**：`Idle → EssentialFetchInFlight → EssentialFetchComplete → RestFetchInFlight → FullyBootstrapped`
//!
//! - **必需数据**（essential）：registerForEvents + 当前 narrow 的首条未读页，两者并发、各自无限重试，
//!   **全部成功后**（join 屏障）才初始化 realm、替换消息、清除 `needs_initial_fetch` 并启动事件轮询（仅一次）。
//! - **剩余数据**（rest）：全部私聊回填、stream 列表、用户列表，与必需数据并发，不阻塞增量拉取。
//!
//! **增量拉取**：不重试。失败或超时时 dispatch `FetchFailed`（清除 fetching 并记录可重试错误），
//! 错误返回给调用方，由下一次触发重新发起。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{ChatApi, GetMessagesRequest, LAST_MESSAGE_ANCHOR};
use crate::config::{Auth, SyncConfig};
use crate::error::{NarrowSyncError, Result};
use crate::events::SyncEvent;
use crate::hooks::Collaborators;
use crate::narrow::Narrow;
use crate::sync::policy::FetchPolicy;
use crate::sync::reducer::SyncAction;
use crate::sync::retry::RetryRunner;
use crate::sync::state::FetchEdge;
use crate::sync::store::StoreHandle;

/// bootstrap 阶段（由两条并发链路的状态推导）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BootstrapPhase {
    Idle,
    EssentialFetchInFlight,
    EssentialFetchComplete,
    RestFetchInFlight,
    FullyBootstrapped,
    /// 会话关闭，挂起的重试已取消
    Cancelled,
}

/// 单条 bootstrap 链路的状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegState {
    #[default]
    NotStarted,
    InFlight,
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapProgress {
    pub essential: LegState,
    pub rest: LegState,
}

impl BootstrapProgress {
    pub fn phase(&self) -> BootstrapPhase {
        use LegState::*;
        match (self.essential, self.rest) {
            (Cancelled, _) | (_, Cancelled) => BootstrapPhase::Cancelled,
            (NotStarted, NotStarted) => BootstrapPhase::Idle,
            (Complete, Complete) => BootstrapPhase::FullyBootstrapped,
            (Complete, NotStarted) => BootstrapPhase::EssentialFetchComplete,
            (Complete, InFlight) => BootstrapPhase::RestFetchInFlight,
            _ => BootstrapPhase::EssentialFetchInFlight,
        }
    }

    pub fn is_started(&self) -> bool {
        self.phase() != BootstrapPhase::Idle
    }
}

#[derive(Debug, Clone, Copy)]
enum Leg {
    Essential,
    Rest,
}

/// 一次 bootstrap 的两个后台任务
pub struct InitialFetch {
    essential: JoinHandle<Result<()>>,
    rest: JoinHandle<Result<()>>,
}

impl InitialFetch {
    /// 等待两条链路结束，返回第一个错误
    pub async fn join(self) -> Result<()> {
        let (essential, rest) = tokio::join!(self.essential, self.rest);
        let essential = flatten_join(essential);
        let rest = flatten_join(rest);
        essential.and(rest)
    }
}

fn flatten_join(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(inner) => inner,
        Err(e) if e.is_cancelled() => Err(NarrowSyncError::Cancelled("bootstrap 任务已中止".into())),
        Err(e) => Err(NarrowSyncError::InvalidState(format!("bootstrap 任务异常退出: {}", e))),
    }
}

pub struct FetchOrchestrator {
    api: Arc<dyn ChatApi>,
    auth: Auth,
    config: SyncConfig,
    policy: FetchPolicy,
    store: StoreHandle,
    collaborators: Collaborators,
    retry: RetryRunner,
    progress: watch::Sender<BootstrapProgress>,
    event_polling_started: AtomicBool,
}

impl FetchOrchestrator {
    pub fn new(
        api: Arc<dyn ChatApi>,
        auth: Auth,
        config: SyncConfig,
        collaborators: Collaborators,
        store: StoreHandle,
        cancel: CancellationToken,
    ) -> Self {
        let (progress, _) = watch::channel(BootstrapProgress::default());
        Self {
            api,
            auth,
            policy: FetchPolicy::new(config.messages_per_request),
            retry: RetryRunner::new(config.retry.clone(), cancel),
            config,
            store,
            collaborators,
            progress,
            event_polling_started: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn progress(&self) -> BootstrapProgress {
        *self.progress.borrow()
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.progress().phase()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<BootstrapProgress> {
        self.progress.subscribe()
    }

    /// 取消所有挂起的 bootstrap 重试
    pub fn cancel(&self) {
        if !self.retry.cancellation_token().is_cancelled() {
            info!("🛑 取消 bootstrap 重试");
            self.retry.cancellation_token().cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.retry.cancellation_token().is_cancelled()
    }

    /// 启动 bootstrap：必需数据与剩余数据两条链路并发执行
    ///
    /// 每个会话只会真正启动一次，重复调用或已取消时返回 `None`。
    pub fn do_initial_fetch(self: &Arc<Self>) -> Option<InitialFetch> {
        if self.is_cancelled() {
            debug!("会话已关闭，跳过 bootstrap");
            return None;
        }

        let claimed = self.progress.send_if_modified(|progress| {
            if progress.is_started() {
                return false;
            }
            progress.essential = LegState::InFlight;
            progress.rest = LegState::InFlight;
            true
        });
        if !claimed {
            debug!("bootstrap 已启动过，忽略重复触发");
            return None;
        }

        info!("🚀 开始 bootstrap: realm={}", self.auth.realm);
        self.store.events().emit(SyncEvent::BootstrapPhaseChanged {
            phase: self.phase(),
        });

        let this = Arc::clone(self);
        let essential = tokio::spawn(async move { this.fetch_essential_initial_data().await });
        let this = Arc::clone(self);
        let rest = tokio::spawn(async move { this.fetch_rest_of_initial_data().await });

        if self.config.enable_notifications {
            let notifications = self.collaborators.notifications.clone();
            let auth = self.auth.clone();
            tokio::spawn(async move {
                if let Err(e) = notifications.init_notifications(&auth).await {
                    warn!("⚠️ 初始化通知失败: {}", e);
                }
            });
        }

        Some(InitialFetch { essential, rest })
    }

    /// 必需数据：注册事件队列 + 首条未读页，全部到达后才放行增量拉取与事件轮询
    pub async fn fetch_essential_initial_data(&self) -> Result<()> {
        let started = Instant::now();
        let narrow = self.store.app_state().active_narrow;
        let window = self.policy.essential_request();
        let request = GetMessagesRequest {
            anchor: window.anchor,
            num_before: window.num_before,
            num_after: window.num_after,
            narrow: narrow.clone(),
            use_first_unread: true,
        };

        let api = &self.api;
        let auth = &self.auth;
        let request = &request;
        let joined = tokio::try_join!(
            self.retry
                .try_until_successful("registerForEvents", move || api.register_for_events(auth)),
            self.retry
                .try_until_successful("getMessages(first unread)", move || api.get_messages(auth, request)),
        );
        let (registration, messages) = match joined {
            Ok(values) => values,
            Err(e) => {
                self.mark_leg(Leg::Essential, LegState::Cancelled);
                return Err(e);
            }
        };
        info!("⏱️ Essential server data: {}ms", started.elapsed().as_millis());

        let queue_id = registration.queue_id.clone();
        let last_event_id = registration.last_event_id;
        self.store.dispatch(SyncAction::RealmInit(registration));
        self.store.dispatch(SyncAction::FetchComplete {
            messages,
            narrow,
            anchor: window.anchor,
            num_before: window.num_before,
            num_after: window.num_after,
            replace_existing: true,
        });
        self.store.dispatch(SyncAction::InitialFetchComplete);

        self.start_event_polling(&queue_id, last_event_id).await;
        self.mark_leg(Leg::Essential, LegState::Complete);
        Ok(())
    }

    /// 剩余数据：全部私聊回填、stream、用户；完成后注册推送并冲刷发件箱
    pub async fn fetch_rest_of_initial_data(&self) -> Result<()> {
        let started = Instant::now();
        let push_token_missing = self.store.app_state().push_token.is_empty();
        let backfill = GetMessagesRequest {
            anchor: LAST_MESSAGE_ANCHOR,
            num_before: self.config.all_private_backfill,
            num_after: 0,
            narrow: Narrow::all_private(),
            use_first_unread: false,
        };

        let api = &self.api;
        let auth = &self.auth;
        let backfill = &backfill;
        let joined = tokio::try_join!(
            self.retry
                .try_until_successful("getMessages(all private)", move || api.get_messages(auth, backfill)),
            self.retry
                .try_until_successful("getStreams", move || api.get_streams(auth)),
            self.retry
                .try_until_successful("getUsers", move || api.get_users(auth)),
        );
        let (private_messages, streams, users) = match joined {
            Ok(values) => values,
            Err(e) => {
                self.mark_leg(Leg::Rest, LegState::Cancelled);
                return Err(e);
            }
        };
        info!("⏱️ Rest of server data: {}ms", started.elapsed().as_millis());

        self.store.dispatch(SyncAction::FetchComplete {
            messages: private_messages,
            narrow: Narrow::all_private(),
            anchor: 0,
            num_before: 0,
            num_after: 0,
            replace_existing: true,
        });
        self.store.dispatch(SyncAction::InitStreams(streams));
        self.store.dispatch(SyncAction::InitUsers(users));

        if self.auth.has_api_key() && push_token_missing {
            let notifications = self.collaborators.notifications.clone();
            let auth = self.auth.clone();
            tokio::spawn(async move {
                if let Err(e) = notifications.refresh_notification_token(&auth).await {
                    warn!("⚠️ 刷新推送 token 失败: {}", e);
                }
            });
        }

        if let Err(e) = self.collaborators.outbox.try_send_messages().await {
            warn!("⚠️ 发件箱冲刷失败: {}", e);
        }

        self.mark_leg(Leg::Rest, LegState::Complete);
        Ok(())
    }

    /// FetchStart + 网络请求 + FetchComplete
    pub async fn fetch_messages(
        &self,
        anchor: u64,
        num_before: u32,
        num_after: u32,
        narrow: Narrow,
        use_first_unread: bool,
    ) -> Result<()> {
        self.store.dispatch(SyncAction::FetchStart {
            narrow: narrow.clone(),
            num_before,
            num_after,
        });
        self.background_fetch_messages(anchor, num_before, num_after, narrow, use_first_unread)
            .await
    }

    /// 只发请求并 dispatch 结果，不登记 FetchStart
    ///
    /// 单次尝试，带超时；失败时 dispatch `FetchFailed` 并把错误返回给调用方。
    pub async fn background_fetch_messages(
        &self,
        anchor: u64,
        num_before: u32,
        num_after: u32,
        narrow: Narrow,
        use_first_unread: bool,
    ) -> Result<()> {
        let request = GetMessagesRequest {
            anchor,
            num_before,
            num_after,
            narrow: narrow.clone(),
            use_first_unread,
        };
        let timeout = self.config.fetch_timeout();
        let cancel = self.retry.cancellation_token();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NarrowSyncError::Cancelled("会话已关闭".into())),
            outcome = tokio::time::timeout(timeout, self.api.get_messages(&self.auth, &request)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(NarrowSyncError::Timeout(timeout)),
                }
            }
        };

        match result {
            Ok(messages) => {
                debug!(
                    "拉取完成: narrow={}, anchor={}, before={}, after={}, received={}",
                    narrow,
                    anchor,
                    num_before,
                    num_after,
                    messages.len()
                );
                self.store.dispatch(SyncAction::FetchComplete {
                    messages,
                    narrow,
                    anchor,
                    num_before,
                    num_after,
                    replace_existing: false,
                });
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ 拉取消息失败: narrow={}, anchor={}, error={}", narrow, anchor, e);
                self.store.dispatch(SyncAction::FetchFailed {
                    narrow,
                    num_before,
                    num_after,
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    pub async fn fetch_messages_at_first_unread(&self, narrow: Narrow) -> Result<()> {
        let window = self.policy.first_unread_request();
        self.fetch_messages(window.anchor, window.num_before, window.num_after, narrow, true)
            .await
    }

    /// 当前 narrow 向旧拉取一页；策略不允许时返回 `Ok(false)`
    pub async fn fetch_older(&self) -> Result<bool> {
        self.fetch_edge(FetchEdge::Older).await
    }

    /// 当前 narrow 向新拉取一页；策略不允许时返回 `Ok(false)`
    pub async fn fetch_newer(&self) -> Result<bool> {
        self.fetch_edge(FetchEdge::Newer).await
    }

    async fn fetch_edge(&self, edge: FetchEdge) -> Result<bool> {
        let Some((narrow, request)) = self.store.begin_fetch(edge, &self.policy) else {
            debug!("跳过拉取: edge={:?}", edge);
            return Ok(false);
        };
        self.background_fetch_messages(request.anchor, request.num_before, request.num_after, narrow, false)
            .await?;
        Ok(true)
    }

    pub fn mark_messages_read(&self, message_ids: Vec<u64>) {
        self.store.dispatch(SyncAction::MarkRead { message_ids });
    }

    pub fn set_active_narrow(&self, narrow: Narrow) {
        self.store.dispatch(SyncAction::SetActiveNarrow(narrow));
    }

    pub fn set_push_token(&self, token: impl Into<String>) {
        self.store.dispatch(SyncAction::SetPushToken(token.into()));
    }

    pub async fn send_focus_ping(&self) -> Result<()> {
        self.collaborators.presence.send_focus_ping(&self.auth).await
    }

    /// 等待 bootstrap 两条链路全部完成
    pub async fn wait_until_bootstrapped(&self) -> Result<()> {
        let mut rx = self.progress.subscribe();
        loop {
            let phase = rx.borrow_and_update().phase();
            match phase {
                BootstrapPhase::FullyBootstrapped => return Ok(()),
                BootstrapPhase::Cancelled => {
                    return Err(NarrowSyncError::Cancelled("bootstrap 已取消".into()))
                }
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(NarrowSyncError::InvalidState("bootstrap 进度通道已关闭".into()));
            }
        }
    }

    /// 事件轮询在每个会话中只启动一次
    async fn start_event_polling(&self, queue_id: &str, last_event_id: i64) {
        if self
            .event_polling_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("⚠️ 事件轮询已启动，忽略: queue_id={}", queue_id);
            return;
        }
        info!("📡 启动事件轮询: queue_id={}, last_event_id={}", queue_id, last_event_id);
        if let Err(e) = self
            .collaborators
            .event_poller
            .start_event_polling(queue_id, last_event_id)
            .await
        {
            error!("❌ 启动事件轮询失败: {}", e);
        }
    }

    fn mark_leg(&self, leg: Leg, state: LegState) {
        let before = self.phase();
        self.progress.send_modify(|progress| match leg {
            Leg::Essential => progress.essential = state,
            Leg::Rest => progress.rest = state,
        });
        let after = self.phase();
        if before != after {
            info!("🔄 bootstrap 阶段: {:?} -> {:?}", before, after);
            self.store
                .events()
                .emit(SyncEvent::BootstrapPhaseChanged { phase: after });
        }
    }
}
