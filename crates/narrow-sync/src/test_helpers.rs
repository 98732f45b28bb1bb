//! 测试辅助：可编排的 ChatApi mock 与记录型协作方

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::api::{ChatApi, GetMessagesRequest, RegisterResponse, Stream, User};
use crate::config::Auth;
use crate::error::{NarrowSyncError, Result};
use crate::hooks::{Collaborators, EventPoller, NotificationHandler, Outbox, PresenceReporter};
use crate::message::Message;
use crate::narrow::Narrow;

pub fn auth() -> Auth {
    Auth::new("https://chat.example.com", "me@example.com", "secret-key")
}

pub fn register_response(queue_id: &str, last_event_id: i64) -> RegisterResponse {
    RegisterResponse {
        queue_id: queue_id.to_string(),
        last_event_id,
        realm_init: serde_json::Map::new(),
    }
}

pub fn stream(stream_id: u64, name: &str) -> Stream {
    Stream {
        stream_id,
        name: name.to_string(),
        description: String::new(),
        invite_only: false,
    }
}

/// 让已 spawn 的任务跑到下一个挂起点
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// 单次调用的应答
pub enum MockReply<T> {
    Ready(Result<T>),
    /// 由测试通过 oneshot 决定何时、以何结果返回
    Gated(oneshot::Receiver<Result<T>>),
    /// 永不返回
    Hang,
}

impl<T> MockReply<T> {
    async fn resolve(self) -> Result<T> {
        match self {
            MockReply::Ready(result) => result,
            MockReply::Gated(rx) => rx
                .await
                .unwrap_or_else(|_| Err(NarrowSyncError::Transport("gate dropped".into()))),
            MockReply::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Register,
    GetMessages(GetMessagesRequest),
    GetStreams,
    GetUsers,
}

/// 按调用类型排队应答；队列为空时返回默认成功结果
#[derive(Default)]
pub struct MockChatApi {
    register: Mutex<VecDeque<MockReply<RegisterResponse>>>,
    messages: Mutex<HashMap<Narrow, VecDeque<MockReply<Vec<Message>>>>>,
    streams: Mutex<VecDeque<MockReply<Vec<Stream>>>>,
    users: Mutex<VecDeque<MockReply<Vec<User>>>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_register(&self, reply: MockReply<RegisterResponse>) {
        self.register.lock().push_back(reply);
    }

    pub fn push_messages(&self, narrow: Narrow, reply: MockReply<Vec<Message>>) {
        self.messages.lock().entry(narrow).or_default().push_back(reply);
    }

    pub fn push_streams(&self, reply: MockReply<Vec<Stream>>) {
        self.streams.lock().push_back(reply);
    }

    pub fn push_users(&self, reply: MockReply<Vec<User>>) {
        self.users.lock().push_back(reply);
    }

    pub fn gate_register(&self) -> oneshot::Sender<Result<RegisterResponse>> {
        let (tx, rx) = oneshot::channel();
        self.push_register(MockReply::Gated(rx));
        tx
    }

    pub fn gate_messages(&self, narrow: Narrow) -> oneshot::Sender<Result<Vec<Message>>> {
        let (tx, rx) = oneshot::channel();
        self.push_messages(narrow, MockReply::Gated(rx));
        tx
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn message_requests(&self) -> Vec<GetMessagesRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                MockCall::GetMessages(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn register_for_events(&self, _auth: &Auth) -> Result<RegisterResponse> {
        self.record(MockCall::Register);
        let reply = self.register.lock().pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(register_response("queue-default", -1)),
        }
    }

    async fn get_messages(&self, _auth: &Auth, request: &GetMessagesRequest) -> Result<Vec<Message>> {
        self.record(MockCall::GetMessages(request.clone()));
        let reply = self
            .messages
            .lock()
            .get_mut(&request.narrow)
            .and_then(|queue| queue.pop_front());
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(Vec::new()),
        }
    }

    async fn get_streams(&self, _auth: &Auth) -> Result<Vec<Stream>> {
        self.record(MockCall::GetStreams);
        let reply = self.streams.lock().pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(Vec::new()),
        }
    }

    async fn get_users(&self, _auth: &Auth) -> Result<Vec<User>> {
        self.record(MockCall::GetUsers);
        let reply = self.users.lock().pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(Vec::new()),
        }
    }
}

/// 记录每个协作方被调用的情况
#[derive(Default)]
pub struct RecordingCollaborators {
    polling_starts: Mutex<Vec<(String, i64)>>,
    notification_inits: AtomicUsize,
    token_refreshes: AtomicUsize,
    outbox_flushes: AtomicUsize,
    focus_pings: AtomicUsize,
}

impl RecordingCollaborators {
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            event_poller: self.clone(),
            notifications: self.clone(),
            outbox: self.clone(),
            presence: self.clone(),
        }
    }

    pub fn polling_starts(&self) -> Vec<(String, i64)> {
        self.polling_starts.lock().clone()
    }

    pub fn notification_inits(&self) -> usize {
        self.notification_inits.load(Ordering::SeqCst)
    }

    pub fn token_refreshes(&self) -> usize {
        self.token_refreshes.load(Ordering::SeqCst)
    }

    pub fn outbox_flushes(&self) -> usize {
        self.outbox_flushes.load(Ordering::SeqCst)
    }

    pub fn focus_pings(&self) -> usize {
        self.focus_pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPoller for RecordingCollaborators {
    async fn start_event_polling(&self, queue_id: &str, last_event_id: i64) -> Result<()> {
        self.polling_starts.lock().push((queue_id.to_string(), last_event_id));
        Ok(())
    }
}

#[async_trait]
impl NotificationHandler for RecordingCollaborators {
    async fn init_notifications(&self, _auth: &Auth) -> Result<()> {
        self.notification_inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_notification_token(&self, _auth: &Auth) -> Result<()> {
        self.token_refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Outbox for RecordingCollaborators {
    async fn try_send_messages(&self) -> Result<()> {
        self.outbox_flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PresenceReporter for RecordingCollaborators {
    async fn send_focus_ping(&self, _auth: &Auth) -> Result<()> {
        self.focus_pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
