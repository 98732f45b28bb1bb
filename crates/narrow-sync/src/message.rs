//! 消息实体
//!
//! - id：服务端分配、单调递增，既是排序 key 也是分页 anchor
//! - 载荷与 narrow 无关；同一条消息可以同时出现在多个 narrow 中

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::narrow::{Narrow, SpecialNarrow};

pub const FLAG_READ: &str = "read";
pub const FLAG_STARRED: &str = "starred";
pub const FLAG_MENTIONED: &str = "mentioned";

/// 消息接收方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageRecipient {
    Stream { stream: String, topic: String },
    /// 私聊参与者（包含自己）
    Private { participants: BTreeSet<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender_id: u64,
    pub sender_email: String,
    #[serde(default)]
    pub sender_full_name: String,
    pub content: String,
    /// UNIX 时间戳（秒）
    pub timestamp: i64,
    #[serde(default)]
    pub flags: BTreeSet<String>,
    pub recipient: MessageRecipient,
}

impl Message {
    pub fn is_read(&self) -> bool {
        self.flags.contains(FLAG_READ)
    }

    pub fn mark_read(&mut self) {
        self.flags.insert(FLAG_READ.to_string());
    }

    /// 该消息所属的全部 narrow
    ///
    /// `own_email` 用来从私聊参与者里去掉自己。
    pub fn narrows(&self, own_email: &str) -> Vec<Narrow> {
        let mut narrows = vec![Narrow::All];
        match &self.recipient {
            MessageRecipient::Stream { stream, topic } => {
                narrows.push(Narrow::stream(stream.as_str()));
                narrows.push(Narrow::topic(stream.as_str(), topic.as_str()));
            }
            MessageRecipient::Private { participants } => {
                let others: BTreeSet<String> = participants
                    .iter()
                    .filter(|email| email.as_str() != own_email)
                    .cloned()
                    .collect();
                // 和自己的私聊
                let conversation = if others.is_empty() {
                    Narrow::private(own_email)
                } else {
                    Narrow::conversation(others)
                };
                narrows.push(conversation);
                narrows.push(Narrow::all_private());
            }
        }
        if self.flags.contains(FLAG_STARRED) {
            narrows.push(Narrow::special(SpecialNarrow::Starred));
        }
        if self.flags.contains(FLAG_MENTIONED) {
            narrows.push(Narrow::special(SpecialNarrow::Mentioned));
        }
        narrows
    }
}

#[cfg(test)]
pub(crate) fn stream_message(id: u64, stream: &str, topic: &str) -> Message {
    Message {
        id,
        sender_id: 7,
        sender_email: "alice@example.com".to_string(),
        sender_full_name: "Alice".to_string(),
        content: format!("message {}", id),
        timestamp: 1_700_000_000 + id as i64,
        flags: BTreeSet::new(),
        recipient: MessageRecipient::Stream {
            stream: stream.to_string(),
            topic: topic.to_string(),
        },
    }
}

#[cfg(test)]
pub(crate) fn private_message(id: u64, participants: &[&str]) -> Message {
    Message {
        id,
        sender_id: 7,
        sender_email: participants.first().copied().unwrap_or_default().to_string(),
        sender_full_name: String::new(),
        content: format!("pm {}", id),
        timestamp: 1_700_000_000 + id as i64,
        flags: BTreeSet::new(),
        recipient: MessageRecipient::Private {
            participants: participants.iter().map(|p| p.to_string()).collect(),
        },
    }
}
