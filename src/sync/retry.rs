//! 恢复重试门：封装用户触发的「重新探测 + 重新同步」
//!
//! attempts 有上限（默认 3），执行中再次调用或预算耗尽时直接返回、不执行 action；
//! in_progress 由 guard 在所有退出路径（成功、失败、future 被丢弃）上释放。
//! attempts 只会被整个会话的 reset 清零，它与可达性缓存的清空同时发生。

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::core::{Generation, RecoveryOutcome, SkipReason, StoreError};
use crate::sync::reachability::{AvailabilityProbe, OfflineFlag};

/// 默认恢复次数上限
pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// 重试状态（会话内单调）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryState {
    pub attempts: u32,
    pub in_progress: bool,
}

/// 执行期间持有，Drop 时释放 in_progress（会话已重置则不动新状态）
struct InProgressGuard {
    state: Arc<Mutex<RetryState>>,
    generation: Arc<Generation>,
    token: u64,
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation.is_current(self.token) {
            st.in_progress = false;
        }
    }
}

/// 恢复重试门
pub struct RetryGate {
    probe: Arc<AvailabilityProbe>,
    offline: Arc<OfflineFlag>,
    max_attempts: u32,
    state: Arc<Mutex<RetryState>>,
    generation: Arc<Generation>,
}

impl RetryGate {
    pub fn new(probe: Arc<AvailabilityProbe>, offline: Arc<OfflineFlag>, max_attempts: u32) -> Self {
        Self {
            probe,
            offline,
            max_attempts,
            state: Arc::new(Mutex::new(RetryState::default())),
            generation: Arc::new(Generation::new()),
        }
    }

    pub fn state(&self) -> RetryState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 剩余可用次数
    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.state().attempts)
    }

    /// 在预算内执行一次恢复；action 返回 Ok 即视为恢复成功并清除离线标记
    pub async fn attempt_recovery<F, Fut>(&self, action: F) -> RecoveryOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        self.run(action, true).await
    }

    /// 与 attempt_recovery 共用预算与互斥，但不改动离线标记（访客会话没有远端数据可离线）
    pub async fn attempt_reprobe<F, Fut>(&self, action: F) -> RecoveryOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        self.run(action, false).await
    }

    async fn run<F, Fut>(&self, action: F, track_offline: bool) -> RecoveryOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        let token = {
            let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if st.in_progress {
                tracing::debug!("Recovery already in progress, ignoring");
                return RecoveryOutcome::Skipped(SkipReason::InProgress);
            }
            if st.attempts >= self.max_attempts {
                tracing::info!(attempts = st.attempts, "Recovery budget exhausted");
                return RecoveryOutcome::Skipped(SkipReason::Exhausted);
            }
            st.in_progress = true;
            st.attempts += 1;
            tracing::info!(attempt = st.attempts, max = self.max_attempts, "Attempting recovery");
            self.generation.current()
        };
        let _guard = InProgressGuard {
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
            token,
        };

        self.probe.reset();
        let result = action().await;

        if !self.generation.is_current(token) {
            return RecoveryOutcome::Superseded;
        }
        match result {
            Ok(()) => {
                if track_offline {
                    self.offline.set(false);
                }
                tracing::info!("Recovery succeeded, back online");
                RecoveryOutcome::Recovered
            }
            Err(e) => {
                if track_offline {
                    self.offline.set(true);
                }
                tracing::warn!("Recovery failed: {}", e);
                RecoveryOutcome::StillOffline(e)
            }
        }
    }

    /// 整个会话重置：清零次数并清空可达性缓存
    pub fn reset(&self) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.generation.advance();
        *st = RetryState::default();
        self.probe.reset();
    }
}
