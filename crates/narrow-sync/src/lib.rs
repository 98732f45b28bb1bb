//! Narrow Sync - 聊天客户端消息同步引擎
//!
//! 本 crate 负责让本地消息状态与服务端保持一致：
//! - 🚀 bootstrap：注册事件队列 + 首条未读页（join 屏障），并发拉取私聊 / stream / 用户
//! - 📜 按 narrow（过滤视图）双向分页，去重合并，到达边界后停止
//! - 🔁 bootstrap 请求无限重试（指数退避 + 抖动，可随会话关闭取消）
//! - ⏱️ 增量拉取带超时，失败后由下一次触发重试
//! - 🧹 按 narrow 的 LRU 缓存上限
//! - ⚙️ 事件系统：UI 只读观察状态变化
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use narrow_sync::{Auth, Collaborators, HttpChatApi, Narrow, SyncConfig, SyncSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     narrow_sync::init_logging("narrow_sync=info");
//!
//!     let api = Arc::new(HttpChatApi::new(Duration::from_secs(10), Duration::from_secs(60))?);
//!     let auth = Auth::new("https://chat.example.com", "me@example.com", "api-key");
//!     let config = SyncConfig::builder().messages_per_request(50).build()?;
//!
//!     let session = SyncSession::new(api, auth, config, Collaborators::noop())?;
//!     session.start();
//!     session.wait_until_bootstrapped().await?;
//!
//!     // 进入某个 stream，向旧翻页
//!     session.set_active_narrow(Narrow::stream("general"));
//!     session.fetch_messages_at_first_unread(Narrow::stream("general")).await?;
//!     session.fetch_older().await?;
//!
//!     session.shutdown();
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod error;
pub mod version;
pub mod config;
pub mod logging;
pub mod narrow;
pub mod message;
pub mod api;
pub mod hooks;
pub mod events;
pub mod lifecycle;
pub mod sync;
pub mod session;

#[cfg(test)]
pub mod test_helpers;

// 重新导出核心类型，方便使用
pub use error::{NarrowSyncError, Result};
pub use version::SDK_VERSION;
pub use config::{Auth, RetryConfig, SyncConfig, SyncConfigBuilder};
pub use logging::init_logging;
pub use narrow::{Narrow, NarrowKind, NarrowOperator, SpecialNarrow};
pub use message::{Message, MessageRecipient};
pub use api::{ChatApi, GetMessagesRequest, HttpChatApi, RegisterResponse, Stream, User};
pub use hooks::{Collaborators, EventPoller, NoopCollaborator, NotificationHandler, Outbox, PresenceReporter};
pub use events::{EventManager, EventStats, SyncEvent};
pub use lifecycle::{LifecycleHook, LifecycleManager, SyncLifecycleHook};
pub use sync::{
    AppSyncState, BootstrapPhase, BootstrapProgress, FetchEdge, FetchFlags, FetchOrchestrator,
    FetchPolicy, FetchRequest, NarrowSyncState, RetryRunner, StoreHandle, SyncAction, SyncStore,
};
pub use session::SyncSession;
