//! 网络边界
//!
//! 同步核心只依赖 [`ChatApi`] trait；[`HttpChatApi`] 是基于 reqwest 的默认实现，
//! 测试中使用 `test_helpers::MockChatApi`。

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Auth;
use crate::error::{NarrowSyncError, Result};
use crate::message::{Message, MessageRecipient};
use crate::narrow::Narrow;

/// registerForEvents 的返回：事件队列 + realm 初始化数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub queue_id: String,
    pub last_event_id: i64,
    /// 其余字段原样保留，供 realm 初始化使用
    #[serde(flatten)]
    pub realm_init: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub stream_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub invite_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: u64,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// 表示“从最新一条开始”的 anchor，取 2^53 - 1 以保证任何服务端都能解析
pub const LAST_MESSAGE_ANCHOR: u64 = 9_007_199_254_740_991;

/// getMessages 参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMessagesRequest {
    pub anchor: u64,
    pub num_before: u32,
    pub num_after: u32,
    pub narrow: Narrow,
    /// 为 true 时服务端忽略 anchor，以第一条未读为中心
    pub use_first_unread: bool,
}

/// 同步核心需要的网络能力（认证信息随每次调用传入）
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn register_for_events(&self, auth: &Auth) -> Result<RegisterResponse>;

    async fn get_messages(&self, auth: &Auth, request: &GetMessagesRequest) -> Result<Vec<Message>>;

    async fn get_streams(&self, auth: &Auth) -> Result<Vec<Stream>>;

    async fn get_users(&self, auth: &Auth) -> Result<Vec<User>>;
}

// ============================================================
// HTTP 实现
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DisplayRecipient {
    Stream(String),
    Private(Vec<WireRecipient>),
}

#[derive(Debug, Deserialize)]
struct WireRecipient {
    email: String,
}

/// 服务端消息格式
#[derive(Debug, Deserialize)]
struct WireMessage {
    id: u64,
    sender_id: u64,
    sender_email: String,
    #[serde(default)]
    sender_full_name: String,
    content: String,
    timestamp: i64,
    #[serde(default)]
    flags: Vec<String>,
    display_recipient: DisplayRecipient,
    #[serde(default)]
    subject: String,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let recipient = match wire.display_recipient {
            DisplayRecipient::Stream(stream) => MessageRecipient::Stream {
                stream,
                topic: wire.subject,
            },
            DisplayRecipient::Private(recipients) => MessageRecipient::Private {
                participants: recipients.into_iter().map(|r| r.email).collect::<BTreeSet<_>>(),
            },
        };
        Message {
            id: wire.id,
            sender_id: wire.sender_id,
            sender_email: wire.sender_email,
            sender_full_name: wire.sender_full_name,
            content: wire.content,
            timestamp: wire.timestamp,
            flags: wire.flags.into_iter().collect(),
            recipient,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    streams: Vec<Stream>,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    members: Vec<User>,
}

/// 基于 reqwest 的 ChatApi 实现（basic auth: email:api_key）
pub struct HttpChatApi {
    client: Client,
}

impl HttpChatApi {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(crate::version::client_name())
            .build()
            .map_err(|e| NarrowSyncError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ HTTP 客户端已创建");
        Ok(Self { client })
    }

    fn url(auth: &Auth, path: &str) -> String {
        format!("{}/api/v1/{}", auth.realm.trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(&self, auth: &Auth, request: RequestBuilder) -> Result<T> {
        let response = request
            .basic_auth(&auth.email, Some(&auth.api_key))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NarrowSyncError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn register_for_events(&self, auth: &Auth) -> Result<RegisterResponse> {
        let request = self
            .client
            .post(Self::url(auth, "register"))
            .form(&[("apply_markdown", "true")]);
        let response: RegisterResponse = self.send(auth, request).await?;
        debug!("register 完成: queue_id={}, last_event_id={}", response.queue_id, response.last_event_id);
        Ok(response)
    }

    async fn get_messages(&self, auth: &Auth, request: &GetMessagesRequest) -> Result<Vec<Message>> {
        let narrow = serde_json::to_string(&request.narrow.to_api_operators())?;
        let query = [
            ("anchor", request.anchor.to_string()),
            ("num_before", request.num_before.to_string()),
            ("num_after", request.num_after.to_string()),
            ("narrow", narrow),
            ("use_first_unread_anchor", request.use_first_unread.to_string()),
            ("apply_markdown", "true".to_string()),
        ];
        let builder = self.client.get(Self::url(auth, "messages")).query(&query);
        let response: MessagesResponse = self.send(auth, builder).await?;
        Ok(response.messages.into_iter().map(Message::from).collect())
    }

    async fn get_streams(&self, auth: &Auth) -> Result<Vec<Stream>> {
        let builder = self.client.get(Self::url(auth, "streams"));
        let response: StreamsResponse = self.send(auth, builder).await?;
        Ok(response.streams)
    }

    async fn get_users(&self, auth: &Auth) -> Result<Vec<User>> {
        let builder = self.client.get(Self::url(auth, "users"));
        let response: UsersResponse = self.send(auth, builder).await?;
        Ok(response.members)
    }
}
