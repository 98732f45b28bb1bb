//! 共享状态句柄
//!
//! 所有修改都经过 [`StoreHandle::dispatch`]：在写锁内调用 reducer，释放锁后再广播事件。

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::events::{EventManager, SyncEvent};
use crate::narrow::Narrow;
use crate::sync::policy::{FetchPolicy, FetchRequest};
use crate::sync::reducer::{reduce, SyncAction};
use crate::sync::state::{AppSyncState, FetchEdge, NarrowSyncState, SyncStore};

#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<RwLock<SyncStore>>,
    events: Arc<EventManager>,
}

impl StoreHandle {
    pub fn new(store: SyncStore, events: Arc<EventManager>) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            events,
        }
    }

    pub fn dispatch(&self, action: SyncAction) {
        let events = {
            let mut store = self.store.write();
            reduce(&mut store, action)
        };
        self.publish(events);
    }

    /// 检查策略并登记 FetchStart，两步在同一把写锁内完成
    ///
    /// 作用于当前 narrow；策略不允许时返回 `None` 且不产生任何事件。
    pub fn begin_fetch(&self, edge: FetchEdge, policy: &FetchPolicy) -> Option<(Narrow, FetchRequest)> {
        let (narrow, request, events) = {
            let mut store = self.store.write();
            let narrow = store.app.active_narrow.clone();
            let request = policy.plan(edge, &store.app, store.narrow(&narrow))?;
            let events = reduce(
                &mut store,
                SyncAction::FetchStart {
                    narrow: narrow.clone(),
                    num_before: request.num_before,
                    num_after: request.num_after,
                },
            );
            (narrow, request, events)
        };
        debug!(
            "begin_fetch: narrow={}, edge={:?}, anchor={}",
            narrow, edge, request.anchor
        );
        self.publish(events);
        Some((narrow, request))
    }

    /// 在读锁内访问完整状态
    pub fn read<R>(&self, f: impl FnOnce(&SyncStore) -> R) -> R {
        f(&self.store.read())
    }

    pub fn app_state(&self) -> AppSyncState {
        self.store.read().app.clone()
    }

    /// UI 查看某个 narrow（计入 LRU 访问）
    pub fn narrow_state(&self, narrow: &Narrow) -> Option<NarrowSyncState> {
        self.store.write().view(narrow).cloned()
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    fn publish(&self, events: Vec<SyncEvent>) {
        for event in events {
            self.events.emit(event);
        }
    }
}
