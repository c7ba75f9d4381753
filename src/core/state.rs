//! 会话身份与状态投影
//!
//! UI 只读取 SessionStatus（身份类型、离线、可达性、重试进度）；完整状态由 ExplorerSession 维护并投影。

use serde::Serialize;

use crate::remote::AccessToken;
use crate::sync::{Reachability, RetryState};

/// 当前会话身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// 无持久身份，数据仅存本地，会话结束即丢弃
    Guest,
    Authenticated { user_id: String, token: AccessToken },
}

impl Identity {
    pub fn authenticated(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Identity::Authenticated {
            user_id: user_id.into(),
            token: AccessToken::new(token),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest)
    }

    pub fn token(&self) -> Option<&AccessToken> {
        match self {
            Identity::Guest => None,
            Identity::Authenticated { token, .. } => Some(token),
        }
    }

    /// 日志与状态栏用的属主标识
    pub fn owner(&self) -> &str {
        match self {
            Identity::Guest => crate::remote::GUEST_OWNER,
            Identity::Authenticated { user_id, .. } => user_id,
        }
    }
}

/// 身份类型（投影用，不含凭证）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdentityKind {
    Guest,
    Authenticated,
}

/// UI 看到的「投影」状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub identity: IdentityKind,
    pub offline: bool,
    pub reachability: Reachability,
    pub retry: RetryState,
    pub max_retry_attempts: u32,
    pub objects: usize,
    pub collections: usize,
}

impl SessionStatus {
    /// 是否还应显示「重试」入口（访客不显示）
    pub fn can_retry(&self) -> bool {
        self.identity == IdentityKind::Authenticated
            && self.offline
            && !self.retry.in_progress
            && self.retry.attempts < self.max_retry_attempts
    }

    /// 状态栏文本，如 "Offline Mode 1/3"
    pub fn banner(&self) -> Option<String> {
        match (self.identity, self.offline) {
            (IdentityKind::Guest, _) => Some("Guest Mode".to_string()),
            (IdentityKind::Authenticated, true) if self.retry.attempts > 0 => Some(format!(
                "Offline Mode {}/{}",
                self.retry.attempts, self.max_retry_attempts
            )),
            (IdentityKind::Authenticated, true) => Some("Offline Mode".to_string()),
            (IdentityKind::Authenticated, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(identity: IdentityKind, offline: bool, attempts: u32) -> SessionStatus {
        SessionStatus {
            identity,
            offline,
            reachability: Reachability::Unknown,
            retry: RetryState { attempts, in_progress: false },
            max_retry_attempts: 3,
            objects: 0,
            collections: 0,
        }
    }

    #[test]
    fn test_banner() {
        assert_eq!(status(IdentityKind::Guest, false, 0).banner().as_deref(), Some("Guest Mode"));
        assert_eq!(status(IdentityKind::Authenticated, false, 0).banner(), None);
        assert_eq!(
            status(IdentityKind::Authenticated, true, 2).banner().as_deref(),
            Some("Offline Mode 2/3")
        );
    }

    #[test]
    fn test_can_retry() {
        assert!(status(IdentityKind::Authenticated, true, 0).can_retry());
        assert!(!status(IdentityKind::Authenticated, true, 3).can_retry());
        assert!(!status(IdentityKind::Guest, true, 0).can_retry());
        assert!(!status(IdentityKind::Authenticated, false, 0).can_retry());
    }

    #[test]
    fn test_identity_debug_hides_token() {
        let id = Identity::authenticated("u1", "secret-token");
        assert!(!format!("{:?}", id).contains("secret-token"));
        assert_eq!(id.owner(), "u1");
        assert_eq!(Identity::Guest.owner(), "guest");
    }
}
