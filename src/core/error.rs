//! 远端存储错误与操作结果
//!
//! StoreError 描述一次远端调用为何失败；ErrorKind 是其去掉负载后的分类，
//! 用于 SaveOutcome::Failed 等需要轻量标签的地方。

use thiserror::Error;

use crate::remote::ExploredObject;

/// 访问远端对象存储时可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 网络失败或超时（探测、读写均适用）
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    /// 凭证过期或无效（HTTP 401）
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 远端拒绝了格式错误的负载，或本地预校验未通过
    #[error("Validation error: {0}")]
    Validation(String),

    /// 外部图片存储清理失败（尽力而为，不会中断所属操作）
    #[error("Storage error: {0}")]
    Storage(String),

    /// 其他非 2xx 响应
    #[error("Remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    /// 访客会话没有远端身份，写操作不可用
    #[error("Operation requires a signed-in identity")]
    GuestSession,

    /// 会话已拆除或请求已被更新的请求取代
    #[error("Operation cancelled")]
    Cancelled,
}

/// 错误分类（不含负载）
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorKind {
    Unreachable,
    Unauthorized,
    NotFound,
    Validation,
    Storage,
    Remote,
    Cancelled,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unreachable(_) => ErrorKind::Unreachable,
            StoreError::Unauthorized(_) | StoreError::GuestSession => ErrorKind::Unauthorized,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::Storage(_) => ErrorKind::Storage,
            StoreError::Remote { .. } | StoreError::Decode(_) => ErrorKind::Remote,
            StoreError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// 是否应把会话降级为离线
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreError::Unreachable(_))
    }
}

/// save 的结果：区分「已保存」「因离线按设计跳过」「失败」
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(ExploredObject),
    OfflineSkipped,
    Failed(ErrorKind),
}

impl SaveOutcome {
    pub fn saved(&self) -> Option<&ExploredObject> {
        match self {
            SaveOutcome::Saved(obj) => Some(obj),
            _ => None,
        }
    }
}

/// load 的结果；读路径从不返回错误，只报告降级方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// 已用远端数据整体替换本地缓存
    Synced { objects: usize, collections: usize },
    /// 远端不可达，缓存保持不变
    Offline,
    /// 访客会话，仅本地数据
    LocalOnly,
    /// 拉取期间会话被重置或拆除，结果已丢弃
    Superseded,
    /// 远端可达但拉取失败（如 401），缓存保持不变
    Degraded(ErrorKind),
}

impl LoadOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, LoadOutcome::Synced { .. })
    }
}

/// RetryGate 跳过本次恢复的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InProgress,
    Exhausted,
}

/// 一次 attempt_recovery 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    Recovered,
    StillOffline(StoreError),
    Skipped(SkipReason),
    /// 执行期间发生了会话重置，结果不落地
    Superseded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            StoreError::Unreachable("timeout".into()).kind(),
            ErrorKind::Unreachable
        );
        assert_eq!(StoreError::GuestSession.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            StoreError::Remote { status: 500, message: "boom".into() }.kind(),
            ErrorKind::Remote
        );
        assert_eq!(StoreError::Decode("eof".into()).kind(), ErrorKind::Remote);
    }

    #[test]
    fn test_only_unreachable_downgrades_session() {
        assert!(StoreError::Unreachable("dns".into()).is_unreachable());
        assert!(!StoreError::Unauthorized("expired".into()).is_unreachable());
        assert!(!StoreError::Storage("bucket".into()).is_unreachable());
    }

    #[test]
    fn test_load_outcome_synced() {
        assert!(LoadOutcome::Synced { objects: 1, collections: 0 }.is_synced());
        assert!(!LoadOutcome::Offline.is_synced());
    }
}
