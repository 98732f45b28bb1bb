//! 分页策略
//!
//! 纯函数：根据当前同步状态判断能否拉取某个方向，并计算请求参数。
//! 服务端分页包含 anchor 本身，所以向新拉取时 anchor 取 last + 1。

use serde::{Deserialize, Serialize};

use crate::sync::state::{AppSyncState, FetchEdge, NarrowSyncState};

/// getMessages 的分页窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub anchor: u64,
    pub num_before: u32,
    pub num_after: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    page_size: u32,
}

impl FetchPolicy {
    pub fn new(page_size: u32) -> Self {
        Self { page_size }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// bootstrap 完成、该方向无在途请求、未到边界、且有 anchor 可用
    pub fn can_fetch(&self, edge: FetchEdge, app: &AppSyncState, state: Option<&NarrowSyncState>) -> bool {
        if app.needs_initial_fetch {
            return false;
        }
        match state {
            Some(state) => {
                !state.fetching.get(edge) && !state.caught_up.get(edge) && anchor_id(edge, state).is_some()
            }
            None => false,
        }
    }

    pub fn can_fetch_older(&self, app: &AppSyncState, state: Option<&NarrowSyncState>) -> bool {
        self.can_fetch(FetchEdge::Older, app, state)
    }

    pub fn can_fetch_newer(&self, app: &AppSyncState, state: Option<&NarrowSyncState>) -> bool {
        self.can_fetch(FetchEdge::Newer, app, state)
    }

    pub fn compute_older_request(&self, state: &NarrowSyncState) -> Option<FetchRequest> {
        let first = state.first_message_id()?;
        Some(FetchRequest {
            anchor: first,
            num_before: self.page_size,
            num_after: 0,
        })
    }

    pub fn compute_newer_request(&self, state: &NarrowSyncState) -> Option<FetchRequest> {
        let last = state.last_message_id()?;
        Some(FetchRequest {
            anchor: last.saturating_add(1),
            num_before: 0,
            num_after: self.page_size,
        })
    }

    /// 策略允许时返回请求参数，否则 `None`
    pub fn plan(&self, edge: FetchEdge, app: &AppSyncState, state: Option<&NarrowSyncState>) -> Option<FetchRequest> {
        if !self.can_fetch(edge, app, state) {
            return None;
        }
        let state = state?;
        match edge {
            FetchEdge::Older => self.compute_older_request(state),
            FetchEdge::Newer => self.compute_newer_request(state),
        }
    }

    /// 以第一条未读为中心（anchor 被服务端忽略）
    pub fn first_unread_request(&self) -> FetchRequest {
        FetchRequest {
            anchor: 0,
            num_before: self.page_size,
            num_after: 0,
        }
    }

    /// bootstrap 必需页：前后各半页
    pub fn essential_request(&self) -> FetchRequest {
        let half = self.page_size / 2;
        FetchRequest {
            anchor: 0,
            num_before: half,
            num_after: half,
        }
    }
}

fn anchor_id(edge: FetchEdge, state: &NarrowSyncState) -> Option<u64> {
    match edge {
        FetchEdge::Older => state.first_message_id(),
        FetchEdge::Newer => state.last_message_id(),
    }
}
