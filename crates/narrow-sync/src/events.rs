//! 事件系统模块
//!
//! UI 层只读地观察同步状态：每次 reducer 应用 action 后，由 StoreHandle 广播对应事件。

use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::narrow::Narrow;
use crate::sync::orchestrator::BootstrapPhase;
use crate::sync::state::FetchFlags;

/// 同步事件
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// narrow 的消息集合或拉取标记发生变化
    NarrowUpdated {
        narrow: Narrow,
        fetching: FetchFlags,
        caught_up: FetchFlags,
        first_message_id: Option<u64>,
        last_message_id: Option<u64>,
        message_count: usize,
    },
    /// 增量拉取失败（可由下一次触发重试）
    FetchFailed {
        narrow: Narrow,
        error: String,
        retryable: bool,
    },
    MessagesRead {
        message_ids: Vec<u64>,
    },
    ActiveNarrowChanged {
        narrow: Narrow,
    },
    RealmInitialized {
        queue_id: String,
        last_event_id: i64,
    },
    /// bootstrap 必需数据已到达，可以开始增量拉取
    InitialFetchComplete,
    StreamsUpdated {
        count: usize,
    },
    UsersUpdated {
        count: usize,
    },
    PushTokenChanged,
    BootstrapPhaseChanged {
        phase: BootstrapPhase,
    },
}

impl SyncEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::NarrowUpdated { .. } => "narrow_updated",
            SyncEvent::FetchFailed { .. } => "fetch_failed",
            SyncEvent::MessagesRead { .. } => "messages_read",
            SyncEvent::ActiveNarrowChanged { .. } => "active_narrow_changed",
            SyncEvent::RealmInitialized { .. } => "realm_initialized",
            SyncEvent::InitialFetchComplete => "initial_fetch_complete",
            SyncEvent::StreamsUpdated { .. } => "streams_updated",
            SyncEvent::UsersUpdated { .. } => "users_updated",
            SyncEvent::PushTokenChanged => "push_token_changed",
            SyncEvent::BootstrapPhaseChanged { .. } => "bootstrap_phase_changed",
        }
    }

    /// 获取事件关联的 narrow
    pub fn narrow(&self) -> Option<&Narrow> {
        match self {
            SyncEvent::NarrowUpdated { narrow, .. } => Some(narrow),
            SyncEvent::FetchFailed { narrow, .. } => Some(narrow),
            SyncEvent::ActiveNarrowChanged { narrow } => Some(narrow),
            _ => None,
        }
    }
}

/// 事件统计
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    /// UTC 毫秒时间戳
    pub last_event_time: Option<i64>,
    pub listener_count: usize,
}

type EventListener = Box<dyn Fn(&SyncEvent) + Send + Sync>;

/// 事件管理器
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<SyncEvent>,
    /// 事件监听器映射（"*" 表示全部事件）
    listeners: RwLock<HashMap<String, Vec<EventListener>>>,
    stats: RwLock<EventStats>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: RwLock::new(HashMap::new()),
            stats: RwLock::new(EventStats::default()),
        }
    }

    /// 发布事件
    pub fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_time = Some(chrono::Utc::now().timestamp_millis());
        }

        let listeners = self.listeners.read();
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }
        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
        drop(listeners);

        // 无订阅者时 send 会失败，属正常场景（无 UI 客户端）
        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// 添加事件监听器，`event_type` 为 "*" 时接收全部事件
    ///
    /// 监听器在 reducer 锁外同步调用，不要在其中阻塞。
    pub fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write();
        listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(listener));

        self.stats.write().listener_count = listeners.values().map(|v| v.len()).sum();
        info!("Added listener for event type: {}", event_type);
    }

    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
        self.stats.write().listener_count = 0;
        info!("Cleared all event listeners");
    }

    pub fn get_stats(&self) -> EventStats {
        self.stats.read().clone()
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new(256)
    }
}
