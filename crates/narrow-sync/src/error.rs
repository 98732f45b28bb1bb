use std::time::Duration;

/// 同步引擎错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NarrowSyncError {
    /// 传输层错误（连接失败、读写中断等）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 服务端返回非 2xx
    #[error("HTTP error [{status}]: {message}")]
    Http { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 单次增量拉取超时
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// 会话已关闭，挂起的重试被取消
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl NarrowSyncError {
    /// 是否为可重试的瞬时错误
    ///
    /// 5xx 与 429 可重试，其余 4xx 不重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            NarrowSyncError::Transport(_) => true,
            NarrowSyncError::Timeout(_) => true,
            NarrowSyncError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            NarrowSyncError::Serialization(_)
            | NarrowSyncError::Cancelled(_)
            | NarrowSyncError::InvalidState(_)
            | NarrowSyncError::Config(_) => false,
        }
    }
}

impl From<serde_json::Error> for NarrowSyncError {
    fn from(error: serde_json::Error) -> Self {
        NarrowSyncError::Serialization(error.to_string())
    }
}

impl From<reqwest::Error> for NarrowSyncError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => NarrowSyncError::Http {
                status: status.as_u16(),
                message: error.to_string(),
            },
            None if error.is_decode() => NarrowSyncError::Serialization(error.to_string()),
            None => NarrowSyncError::Transport(error.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, NarrowSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(NarrowSyncError::Transport("reset".into()).is_retryable());
        assert!(NarrowSyncError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(NarrowSyncError::Http { status: 502, message: String::new() }.is_retryable());
        assert!(NarrowSyncError::Http { status: 429, message: String::new() }.is_retryable());
        assert!(!NarrowSyncError::Http { status: 401, message: String::new() }.is_retryable());
        assert!(!NarrowSyncError::Cancelled("logout".into()).is_retryable());
        assert!(!NarrowSyncError::Serialization("eof".into()).is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: NarrowSyncError = serde_json::from_str::<u64>("not a number")
            .unwrap_err()
            .into();
        assert!(matches!(err, NarrowSyncError::Serialization(_)));
    }
}
