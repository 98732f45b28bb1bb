//! 消息同步模块
//!
//! 职责：
//! - 按 narrow 维护同步状态（fetching / caught_up / 消息集合）
//! - 判断能否分页并计算请求窗口
//! - 编排 bootstrap（必需数据 + 剩余数据）与增量拉取
//! - bootstrap 请求的无限重试（可取消）

pub mod retry;
pub mod state;
pub mod reducer;
pub mod policy;
pub mod store;
pub mod orchestrator;

pub use retry::RetryRunner;
pub use state::{AppSyncState, FetchEdge, FetchFailure, FetchFlags, NarrowSyncState, SyncStore};
pub use reducer::{reduce, SyncAction};
pub use policy::{FetchPolicy, FetchRequest};
pub use store::StoreHandle;
pub use orchestrator::{BootstrapPhase, BootstrapProgress, FetchOrchestrator, InitialFetch, LegState};
