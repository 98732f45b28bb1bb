//! Narrow：消息流上的过滤视图
//!
//! Narrow 是按值比较的不可变描述符，作为每个 narrow 同步状态的缓存 key。
//! 私聊 / 群聊的参与者用有序集合保存，参与者顺序不影响相等性和哈希。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// 特殊视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialNarrow {
    /// 全部私聊
    AllPrivate,
    /// 星标消息
    Starred,
    /// @ 提及我的消息
    Mentioned,
}

impl SpecialNarrow {
    pub fn as_operand(&self) -> &'static str {
        match self {
            SpecialNarrow::AllPrivate => "private",
            SpecialNarrow::Starred => "starred",
            SpecialNarrow::Mentioned => "mentioned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Narrow {
    /// 首页（全部消息）
    All,
    Stream { stream: String },
    Topic { stream: String, topic: String },
    /// 一对一私聊，集合里只有对方
    Private { participants: BTreeSet<String> },
    /// 多人私聊
    Group { participants: BTreeSet<String> },
    Special(SpecialNarrow),
}

/// Narrow 分类，每个 Narrow 恰好属于一类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NarrowKind {
    Home,
    Stream,
    Topic,
    Private,
    Group,
    Special,
}

/// 服务端 narrow 过滤条件（`[{operator, operand}]`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrowOperator {
    pub operator: String,
    pub operand: String,
}

impl NarrowOperator {
    fn new(operator: &str, operand: impl Into<String>) -> Self {
        Self {
            operator: operator.to_string(),
            operand: operand.into(),
        }
    }
}

impl Narrow {
    pub fn home() -> Self {
        Narrow::All
    }

    pub fn stream(stream: impl Into<String>) -> Self {
        Narrow::Stream {
            stream: stream.into(),
        }
    }

    pub fn topic(stream: impl Into<String>, topic: impl Into<String>) -> Self {
        Narrow::Topic {
            stream: stream.into(),
            topic: topic.into(),
        }
    }

    pub fn private(email: impl Into<String>) -> Self {
        Narrow::Private {
            participants: BTreeSet::from([email.into()]),
        }
    }

    pub fn group<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Narrow::Group {
            participants: emails.into_iter().map(Into::into).collect(),
        }
    }

    /// 按参与者人数选择私聊或群聊
    pub fn conversation<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let participants: BTreeSet<String> = emails.into_iter().map(Into::into).collect();
        if participants.len() == 1 {
            Narrow::Private { participants }
        } else {
            Narrow::Group { participants }
        }
    }

    pub fn special(kind: SpecialNarrow) -> Self {
        Narrow::Special(kind)
    }

    pub fn all_private() -> Self {
        Narrow::Special(SpecialNarrow::AllPrivate)
    }

    pub fn kind(&self) -> NarrowKind {
        match self {
            Narrow::All => NarrowKind::Home,
            Narrow::Stream { .. } => NarrowKind::Stream,
            Narrow::Topic { .. } => NarrowKind::Topic,
            Narrow::Private { .. } => NarrowKind::Private,
            Narrow::Group { .. } => NarrowKind::Group,
            Narrow::Special(_) => NarrowKind::Special,
        }
    }

    pub fn is_home_narrow(&self) -> bool {
        self.kind() == NarrowKind::Home
    }

    pub fn is_stream_narrow(&self) -> bool {
        self.kind() == NarrowKind::Stream
    }

    pub fn is_topic_narrow(&self) -> bool {
        self.kind() == NarrowKind::Topic
    }

    pub fn is_private_narrow(&self) -> bool {
        self.kind() == NarrowKind::Private
    }

    pub fn is_group_narrow(&self) -> bool {
        self.kind() == NarrowKind::Group
    }

    pub fn is_special_narrow(&self) -> bool {
        self.kind() == NarrowKind::Special
    }

    /// 私聊 / 群聊的参与者
    pub fn participants(&self) -> Option<&BTreeSet<String>> {
        match self {
            Narrow::Private { participants } | Narrow::Group { participants } => Some(participants),
            _ => None,
        }
    }

    /// 转换为 getMessages 的 narrow 参数
    pub fn to_api_operators(&self) -> Vec<NarrowOperator> {
        match self {
            Narrow::All => Vec::new(),
            Narrow::Stream { stream } => vec![NarrowOperator::new("stream", stream.as_str())],
            Narrow::Topic { stream, topic } => vec![
                NarrowOperator::new("stream", stream.as_str()),
                NarrowOperator::new("topic", topic.as_str()),
            ],
            Narrow::Private { participants } | Narrow::Group { participants } => {
                let emails: Vec<&str> = participants.iter().map(String::as_str).collect();
                vec![NarrowOperator::new("pm-with", emails.join(","))]
            }
            Narrow::Special(kind) => vec![NarrowOperator::new("is", kind.as_operand())],
        }
    }
}

impl Default for Narrow {
    fn default() -> Self {
        Narrow::All
    }
}

impl fmt::Display for Narrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Narrow::All => write!(f, "home"),
            Narrow::Stream { stream } => write!(f, "stream:{}", stream),
            Narrow::Topic { stream, topic } => write!(f, "topic:{}/{}", stream, topic),
            Narrow::Private { participants } | Narrow::Group { participants } => {
                let emails: Vec<&str> = participants.iter().map(String::as_str).collect();
                write!(f, "pm:{}", emails.join(","))
            }
            Narrow::Special(kind) => write!(f, "is:{}", kind.as_operand()),
        }
    }
}
