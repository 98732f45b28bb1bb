//! 同步状态
//!
//! 只有 reducer 会修改这里的状态（见 `sync::reducer`），请求发起方只读。

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::api::{RegisterResponse, Stream, User};
use crate::error::NarrowSyncError;
use crate::message::Message;
use crate::narrow::Narrow;

/// 分页方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchEdge {
    Older,
    Newer,
}

/// older / newer 两个方向上的布尔标记
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFlags {
    pub older: bool,
    pub newer: bool,
}

impl FetchFlags {
    pub fn get(&self, edge: FetchEdge) -> bool {
        match edge {
            FetchEdge::Older => self.older,
            FetchEdge::Newer => self.newer,
        }
    }

    pub fn any(&self) -> bool {
        self.older || self.newer
    }
}

/// 最近一次增量拉取失败（下一次 FetchStart 清除）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub num_before: u32,
    pub num_after: u32,
    pub error: String,
    pub retryable: bool,
    /// UTC 毫秒时间戳
    pub failed_at: i64,
}

impl FetchFailure {
    pub fn new(num_before: u32, num_after: u32, error: &NarrowSyncError) -> Self {
        Self {
            num_before,
            num_after,
            error: error.to_string(),
            retryable: error.is_retryable(),
            failed_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 单个 narrow 的同步状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NarrowSyncState {
    /// 请求进行中；每个 (narrow, edge) 同时最多一个
    pub fetching: FetchFlags,
    /// 某方向已到达历史边界
    pub caught_up: FetchFlags,
    pub last_error: Option<FetchFailure>,
    /// 按 id 去重、有序
    pub(crate) messages: BTreeMap<u64, Message>,
}

impl NarrowSyncState {
    pub fn first_message_id(&self) -> Option<u64> {
        self.messages.keys().next().copied()
    }

    pub fn last_message_id(&self) -> Option<u64> {
        self.messages.keys().next_back().copied()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn message(&self, id: u64) -> Option<&Message> {
        self.messages.get(&id)
    }

    pub fn message_ids(&self) -> Vec<u64> {
        self.messages.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// 进程级同步状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSyncState {
    /// bootstrap 必需数据到达前为 true
    pub needs_initial_fetch: bool,
    /// 未注册时为空
    pub push_token: String,
    /// 当前界面所在的 narrow
    pub active_narrow: Narrow,
}

impl Default for AppSyncState {
    fn default() -> Self {
        Self {
            needs_initial_fetch: true,
            push_token: String::new(),
            active_narrow: Narrow::All,
        }
    }
}

/// 全部共享状态
pub struct SyncStore {
    pub app: AppSyncState,
    narrows: LruCache<Narrow, NarrowSyncState>,
    capacity: usize,
    pub realm: Option<RegisterResponse>,
    pub streams: Vec<Stream>,
    pub users: Vec<User>,
}

impl SyncStore {
    /// `capacity` 为保留的 narrow 上限（超出时淘汰最久未访问且空闲的 narrow）
    pub fn new(capacity: usize) -> Self {
        Self {
            app: AppSyncState::default(),
            narrows: LruCache::unbounded(),
            capacity: capacity.max(1),
            realm: None,
            streams: Vec::new(),
            users: Vec::new(),
        }
    }

    /// 只读查询，不影响 LRU 顺序
    pub fn narrow(&self, narrow: &Narrow) -> Option<&NarrowSyncState> {
        self.narrows.peek(narrow)
    }

    /// 查看某 narrow（提升为最近访问）
    pub fn view(&mut self, narrow: &Narrow) -> Option<&NarrowSyncState> {
        self.narrows.get(narrow)
    }

    pub fn contains(&self, narrow: &Narrow) -> bool {
        self.narrows.contains(narrow)
    }

    pub fn narrow_count(&self) -> usize {
        self.narrows.len()
    }

    /// 首次触发时惰性创建
    pub(crate) fn entry(&mut self, narrow: &Narrow) -> &mut NarrowSyncState {
        if !self.narrows.contains(narrow) {
            self.evict_for_insert();
            debug!("创建 narrow 同步状态: narrow={}", narrow);
        }
        self.narrows.get_or_insert_mut(narrow.clone(), NarrowSyncState::default)
    }

    pub(crate) fn states_mut(&mut self) -> impl Iterator<Item = &mut NarrowSyncState> {
        self.narrows.iter_mut().map(|(_, state)| state)
    }

    /// 为新 narrow 腾出位置：跳过有请求在途的 narrow 和当前 narrow
    fn evict_for_insert(&mut self) {
        while self.narrows.len() >= self.capacity {
            let victim = self
                .narrows
                .iter()
                .rev()
                .find(|(narrow, state)| !state.fetching.any() && **narrow != self.app.active_narrow)
                .map(|(narrow, _)| narrow.clone());

            match victim {
                Some(narrow) => {
                    self.narrows.pop(&narrow);
                    debug!("🧹 淘汰 narrow 同步状态: narrow={}", narrow);
                }
                None => {
                    warn!(
                        "⚠️ 所有 narrow 都在使用中，暂时超出容量: len={}, capacity={}",
                        self.narrows.len(),
                        self.capacity
                    );
                    break;
                }
            }
        }
    }
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new(crate::config::SyncConfig::default().narrow_cache_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::stream_message;

    fn narrow_n(n: usize) -> Narrow {
        Narrow::stream(format!("stream-{}", n))
    }

    #[test]
    fn test_first_and_last_message_id() {
        let mut state = NarrowSyncState::default();
        assert_eq!(state.first_message_id(), None);
        assert_eq!(state.last_message_id(), None);

        for id in [30, 10, 20] {
            state.messages.insert(id, stream_message(id, "general", "lunch"));
        }
        assert_eq!(state.first_message_id(), Some(10));
        assert_eq!(state.last_message_id(), Some(30));
        assert_eq!(state.message_ids(), vec![10, 20, 30]);
    }

    #[test]
    fn test_app_state_defaults() {
        let app = AppSyncState::default();
        assert!(app.needs_initial_fetch);
        assert!(app.push_token.is_empty());
        assert_eq!(app.active_narrow, Narrow::All);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let mut store = SyncStore::new(3);
        store.app.active_narrow = narrow_n(99);
        for n in 0..3 {
            store.entry(&narrow_n(n));
        }
        // 访问 0，使 1 成为最久未访问
        store.view(&narrow_n(0));
        store.entry(&narrow_n(3));

        assert_eq!(store.narrow_count(), 3);
        assert!(!store.contains(&narrow_n(1)));
        assert!(store.contains(&narrow_n(0)));
        assert!(store.contains(&narrow_n(3)));
    }

    #[test]
    fn test_lru_skips_in_flight_and_active() {
        let mut store = SyncStore::new(2);
        store.entry(&narrow_n(0)).fetching.older = true;
        store.entry(&narrow_n(1));
        store.app.active_narrow = narrow_n(1);

        store.entry(&narrow_n(2));

        // 两个都不能淘汰，暂时超出容量
        assert_eq!(store.narrow_count(), 3);
        assert!(store.contains(&narrow_n(0)));
        assert!(store.contains(&narrow_n(1)));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut store = SyncStore::new(2);
        store.app.active_narrow = narrow_n(99);
        store.entry(&narrow_n(0));
        store.entry(&narrow_n(1));
        assert!(store.narrow(&narrow_n(0)).is_some());

        store.entry(&narrow_n(2));
        assert!(!store.contains(&narrow_n(0)));
    }
}
