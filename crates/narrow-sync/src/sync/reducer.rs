//! 同步状态 reducer
//!
//! 所有共享状态只通过 [`reduce`] 修改；返回值是给观察者广播的事件。
//! 不同 narrow 的 action 互不影响，应用顺序可交换。

use tracing::debug;

use crate::api::{RegisterResponse, Stream, User};
use crate::error::NarrowSyncError;
use crate::events::SyncEvent;
use crate::message::Message;
use crate::narrow::Narrow;
use crate::sync::state::{FetchFailure, FetchFlags, NarrowSyncState, SyncStore};

#[derive(Debug, Clone)]
pub enum SyncAction {
    /// 导航到新的 narrow
    SetActiveNarrow(Narrow),
    FetchStart {
        narrow: Narrow,
        num_before: u32,
        num_after: u32,
    },
    /// 回显请求参数，用于推断 caught_up
    FetchComplete {
        messages: Vec<Message>,
        narrow: Narrow,
        anchor: u64,
        num_before: u32,
        num_after: u32,
        replace_existing: bool,
    },
    /// 增量拉取失败或超时：清除 fetching 并记录可重试错误
    FetchFailed {
        narrow: Narrow,
        num_before: u32,
        num_after: u32,
        error: NarrowSyncError,
    },
    MarkRead {
        message_ids: Vec<u64>,
    },
    RealmInit(RegisterResponse),
    InitialFetchComplete,
    InitStreams(Vec<Stream>),
    InitUsers(Vec<User>),
    SetPushToken(String),
}

impl SyncAction {
    /// 日志用的 action 标签
    pub fn tag(&self) -> &'static str {
        match self {
            SyncAction::SetActiveNarrow(_) => "SetActiveNarrow",
            SyncAction::FetchStart { .. } => "FetchStart",
            SyncAction::FetchComplete { .. } => "FetchComplete",
            SyncAction::FetchFailed { .. } => "FetchFailed",
            SyncAction::MarkRead { .. } => "MarkRead",
            SyncAction::RealmInit(_) => "RealmInit",
            SyncAction::InitialFetchComplete => "InitialFetchComplete",
            SyncAction::InitStreams(_) => "InitStreams",
            SyncAction::InitUsers(_) => "InitUsers",
            SyncAction::SetPushToken(_) => "SetPushToken",
        }
    }
}

/// 应用一个 action
pub fn reduce(store: &mut SyncStore, action: SyncAction) -> Vec<SyncEvent> {
    debug!("reduce: {}", action.tag());
    match action {
        SyncAction::SetActiveNarrow(narrow) => {
            if store.app.active_narrow == narrow {
                return Vec::new();
            }
            store.app.active_narrow = narrow.clone();
            vec![SyncEvent::ActiveNarrowChanged { narrow }]
        }

        SyncAction::FetchStart {
            narrow,
            num_before,
            num_after,
        } => {
            let state = store.entry(&narrow);
            // 只置位本次请求的方向，另一方向的在途请求不受影响
            if num_before > 0 {
                state.fetching.older = true;
            }
            if num_after > 0 {
                state.fetching.newer = true;
            }
            state.last_error = None;
            vec![narrow_updated(narrow, state)]
        }

        SyncAction::FetchComplete {
            messages,
            narrow,
            anchor,
            num_before,
            num_after,
            replace_existing,
        } => {
            let state = store.entry(&narrow);
            if num_before > 0 {
                state.fetching.older = false;
            }
            if num_after > 0 {
                state.fetching.newer = false;
            }

            let received = messages.len();
            let reached = FetchFlags {
                older: num_before > 0 && received < num_before as usize,
                newer: num_after > 0 && received < num_after as usize,
            };

            if replace_existing {
                // 全量替换：丢弃旧消息，caught_up 只由本次结果决定
                state.messages.clear();
                state.caught_up = reached;
            } else {
                // caught_up 一旦为 true，只有全量替换才能复位
                state.caught_up.older |= reached.older;
                state.caught_up.newer |= reached.newer;
            }

            for message in messages {
                state.messages.insert(message.id, message);
            }
            state.last_error = None;

            debug!(
                "FetchComplete: narrow={}, anchor={}, received={}, held={}, replace={}",
                narrow,
                anchor,
                received,
                state.messages.len(),
                replace_existing
            );
            vec![narrow_updated(narrow, state)]
        }

        SyncAction::FetchFailed {
            narrow,
            num_before,
            num_after,
            error,
        } => {
            let state = store.entry(&narrow);
            if num_before > 0 {
                state.fetching.older = false;
            }
            if num_after > 0 {
                state.fetching.newer = false;
            }
            let failure = FetchFailure::new(num_before, num_after, &error);
            let retryable = failure.retryable;
            state.last_error = Some(failure);
            vec![
                narrow_updated(narrow.clone(), state),
                SyncEvent::FetchFailed {
                    narrow,
                    error: error.to_string(),
                    retryable,
                },
            ]
        }

        SyncAction::MarkRead { message_ids } => {
            for state in store.states_mut() {
                for id in &message_ids {
                    if let Some(message) = state.messages.get_mut(id) {
                        message.mark_read();
                    }
                }
            }
            vec![SyncEvent::MessagesRead { message_ids }]
        }

        SyncAction::RealmInit(response) => {
            let event = SyncEvent::RealmInitialized {
                queue_id: response.queue_id.clone(),
                last_event_id: response.last_event_id,
            };
            store.realm = Some(response);
            vec![event]
        }

        SyncAction::InitialFetchComplete => {
            store.app.needs_initial_fetch = false;
            vec![SyncEvent::InitialFetchComplete]
        }

        SyncAction::InitStreams(streams) => {
            let count = streams.len();
            store.streams = streams;
            vec![SyncEvent::StreamsUpdated { count }]
        }

        SyncAction::InitUsers(users) => {
            let count = users.len();
            store.users = users;
            vec![SyncEvent::UsersUpdated { count }]
        }

        SyncAction::SetPushToken(token) => {
            store.app.push_token = token;
            vec![SyncEvent::PushTokenChanged]
        }
    }
}

fn narrow_updated(narrow: Narrow, state: &NarrowSyncState) -> SyncEvent {
    SyncEvent::NarrowUpdated {
        narrow,
        fetching: state.fetching,
        caught_up: state.caught_up,
        first_message_id: state.first_message_id(),
        last_message_id: state.last_message_id(),
        message_count: state.len(),
    }
}
