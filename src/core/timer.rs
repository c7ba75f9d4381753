//! 可取消调度与代际令牌
//!
//! TimerSlot 是单槽定时器：arm 会先取消旧定时再布置新的，cancel 撤销当前定时。
//! Generation 是单调递增的代际计数，异步结果落地前与当前代比较，旧代结果直接丢弃。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// 代际令牌：重置 / 取代时 advance，落地前用 is_current 校验
#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

impl Generation {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// 进入新一代，返回新值
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.current() == token
    }
}

#[derive(Debug)]
struct Armed {
    id: u64,
    token: CancellationToken,
}

/// 单槽可取消定时器（需要在 tokio 运行时内 arm）
#[derive(Debug, Clone, Default)]
pub struct TimerSlot {
    armed: Arc<Mutex<Option<Armed>>>,
    next_id: Arc<AtomicU64>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 布置一次性定时：delay 后执行 fire；已有定时会被先取消
    pub fn arm<F>(&self, delay: Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut slot = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(prev) = slot.replace(Armed { id, token: token.clone() }) {
                prev.token.cancel();
            }
        }

        let armed = Arc::clone(&self.armed);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut slot = armed.lock().unwrap_or_else(PoisonError::into_inner);
                        if slot.as_ref().map(|a| a.id) == Some(id) {
                            *slot = None;
                        }
                    }
                    fire();
                }
            }
        });
    }

    /// 撤销当前定时（未布置时无操作）
    pub fn cancel(&self) {
        let mut slot = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(armed) = slot.take() {
            armed.token.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_generation_advance() {
        let g = Generation::new();
        let t0 = g.current();
        assert!(g.is_current(t0));
        let t1 = g.advance();
        assert_eq!(t1, t0 + 1);
        assert!(!g.is_current(t0));
        assert!(g.is_current(t1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once() {
        let slot = TimerSlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        slot.arm(Duration::from_millis(100), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(slot.is_armed());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let slot = TimerSlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        slot.arm(Duration::from_millis(100), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        slot.cancel();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous() {
        let slot = TimerSlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let f = Arc::clone(&fired);
            slot.arm(Duration::from_millis(100), move || {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
