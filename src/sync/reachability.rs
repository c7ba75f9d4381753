//! 远端可达性：三态缓存、离线标记与单飞探测
//!
//! ReachabilityCache 是显式注入的状态持有者（不是全局变量）：Unknown / Reachable / Unreachable
//! 加上最近一次检查时间。结果一旦写入就保持粘性，直到显式 reset；没有定时重探。
//! AvailabilityProbe 在缓存为 Unknown 时发起一次有超时的 health 探测，并发调用者共享同一次结果。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::Generation;
use crate::remote::ObjectStore;

/// 可达性三态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reachability {
    Unknown,
    Reachable,
    Unreachable,
}

/// 缓存快照：状态 + 最近检查时间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReachabilitySnapshot {
    pub status: Reachability,
    pub checked_at: Option<DateTime<Utc>>,
}

impl Default for ReachabilitySnapshot {
    fn default() -> Self {
        Self {
            status: Reachability::Unknown,
            checked_at: None,
        }
    }
}

/// 可达性缓存（构造一次，以 Arc 共享给探测、重试门与同步集合）
#[derive(Debug, Default)]
pub struct ReachabilityCache {
    snapshot: RwLock<ReachabilitySnapshot>,
    generation: Generation,
}

impl ReachabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ReachabilitySnapshot {
        *self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// 已缓存的结果；Unknown 时为 None
    pub fn cached(&self) -> Option<bool> {
        match self.snapshot().status {
            Reachability::Unknown => None,
            Reachability::Reachable => Some(true),
            Reachability::Unreachable => Some(false),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// 写入探测结果；探测期间发生过 reset 则丢弃，返回是否写入
    pub fn record(&self, generation: u64, reachable: bool) -> bool {
        let mut snap = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        if !self.generation.is_current(generation) {
            return false;
        }
        *snap = ReachabilitySnapshot {
            status: if reachable {
                Reachability::Reachable
            } else {
                Reachability::Unreachable
            },
            checked_at: Some(Utc::now()),
        };
        true
    }

    /// 清回 Unknown，强制下一次 check 重新探测
    pub fn reset(&self) {
        let mut snap = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.advance();
        *snap = ReachabilitySnapshot::default();
    }
}

/// 会话级「离线」标记：不可达时置位，仅由成功的恢复（或成功同步）清除
#[derive(Debug, Default)]
pub struct OfflineFlag(AtomicBool);

impl OfflineFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, offline: bool) {
        self.0.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 单飞可达性探测
pub struct AvailabilityProbe {
    cache: Arc<ReachabilityCache>,
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
    in_flight: tokio::sync::Mutex<()>,
}

impl AvailabilityProbe {
    pub fn new(cache: Arc<ReachabilityCache>, store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self {
            cache,
            store,
            timeout,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<ReachabilityCache> {
        &self.cache
    }

    /// 远端当前是否可达。首次（或 reset 后）发起一次探测，之后返回缓存值
    pub async fn check(&self) -> bool {
        if let Some(reachable) = self.cache.cached() {
            return reachable;
        }

        // 单飞：后到者等待持锁者完成，然后直接读缓存
        let _flight = self.in_flight.lock().await;
        if let Some(reachable) = self.cache.cached() {
            return reachable;
        }

        let generation = self.cache.generation();
        let reachable = match tokio::time::timeout(self.timeout, self.store.health()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!("Health check failed: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Health check timed out");
                false
            }
        };
        if !self.cache.record(generation, reachable) {
            tracing::debug!("Reachability reset during probe, result not cached");
        }
        tracing::info!(reachable, "Remote reachability probed");
        reachable
    }

    /// 清空缓存
    pub fn reset(&self) {
        self.cache.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryObjectStore;

    fn probe_with(store: Arc<InMemoryObjectStore>, timeout: Duration) -> AvailabilityProbe {
        AvailabilityProbe::new(Arc::new(ReachabilityCache::new()), store, timeout)
    }

    #[tokio::test]
    async fn test_check_is_cached_until_reset() {
        let store = Arc::new(InMemoryObjectStore::new());
        let probe = probe_with(Arc::clone(&store), Duration::from_secs(10));

        assert!(probe.check().await);
        store.set_reachable(false);
        assert!(probe.check().await);
        assert_eq!(store.health_calls(), 1);

        probe.reset();
        assert_eq!(probe.cache().snapshot().status, Reachability::Unknown);
        assert!(!probe.check().await);
        assert_eq!(store.health_calls(), 2);
        assert_eq!(probe.cache().snapshot().status, Reachability::Unreachable);
        assert!(probe.cache().snapshot().checked_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_unreachable() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.set_health_delay(Some(Duration::from_secs(30)));
        let probe = probe_with(Arc::clone(&store), Duration::from_secs(10));

        assert!(!probe.check().await);
        assert_eq!(probe.cache().cached(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_checks_share_one_probe() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.set_health_delay(Some(Duration::from_millis(200)));
        let probe = Arc::new(probe_with(Arc::clone(&store), Duration::from_secs(10)));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let p = Arc::clone(&probe);
                tokio::spawn(async move { p.check().await })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(store.health_calls(), 1);
    }

    #[test]
    fn test_record_after_reset_is_discarded() {
        let cache = ReachabilityCache::new();
        let stale = cache.generation();
        cache.reset();
        assert!(!cache.record(stale, true));
        assert_eq!(cache.cached(), None);
        assert!(cache.record(cache.generation(), true));
        assert_eq!(cache.cached(), Some(true));
    }

    #[test]
    fn test_offline_flag() {
        let flag = OfflineFlag::new();
        assert!(!flag.is_offline());
        flag.set(true);
        assert!(flag.is_offline());
    }
}
