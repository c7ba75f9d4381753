//! 探索会话：为一个身份装配可达性探测、恢复重试门与同步集合
//!
//! 可达性缓存与离线标记在会话内构造一次，以 Arc 注入各组件；sign_out 时拆除旧集合并切换为访客。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{
    Identity, IdentityKind, LoadOutcome, RecoveryOutcome, SaveOutcome, SessionStatus, StoreError,
};
use crate::remote::{Collection, ExploredObject, ObjectStore, UserStats};
use crate::sync::{
    AvailabilityProbe, OfflineFlag, ReachabilityCache, RetryGate, SyncedCollection,
    DEFAULT_GUEST_CAPACITY, DEFAULT_MAX_RECOVERY_ATTEMPTS,
};
use crate::timeline::Catalog;

/// 会话参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub probe_timeout: Duration,
    pub guest_capacity: usize,
    pub max_recovery_attempts: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            guest_capacity: DEFAULT_GUEST_CAPACITY,
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
        }
    }
}

impl From<&AppConfig> for SessionOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            probe_timeout: cfg.remote.timeouts.health(),
            guest_capacity: cfg.sync.guest_capacity,
            max_recovery_attempts: cfg.sync.max_recovery_attempts,
        }
    }
}

/// 用户拍摄的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct ExplorerSession {
    store: Arc<dyn ObjectStore>,
    options: SessionOptions,
    probe: Arc<AvailabilityProbe>,
    offline: Arc<OfflineFlag>,
    gate: RetryGate,
    collection: SyncedCollection,
    catalog: Catalog,
}

impl ExplorerSession {
    pub fn new(
        identity: Identity,
        store: Arc<dyn ObjectStore>,
        options: SessionOptions,
        catalog: Catalog,
    ) -> Self {
        let cache = Arc::new(ReachabilityCache::new());
        let probe = Arc::new(AvailabilityProbe::new(
            cache,
            Arc::clone(&store),
            options.probe_timeout,
        ));
        let offline = Arc::new(OfflineFlag::new());
        let gate = RetryGate::new(
            Arc::clone(&probe),
            Arc::clone(&offline),
            options.max_recovery_attempts,
        );
        let collection = SyncedCollection::new(
            identity,
            Arc::clone(&store),
            Arc::clone(&probe),
            Arc::clone(&offline),
            options.guest_capacity,
        );
        tracing::info!(owner = %collection.identity().owner(), "Explorer session started");
        Self {
            store,
            options,
            probe,
            offline,
            gate,
            collection,
            catalog,
        }
    }

    pub fn identity(&self) -> &Identity {
        self.collection.identity()
    }

    pub fn collection(&self) -> &SyncedCollection {
        &self.collection
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn objects(&self) -> Vec<ExploredObject> {
        self.collection.objects()
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.collection.collections()
    }

    /// 投影给 UI 的状态
    pub fn status(&self) -> SessionStatus {
        let (objects, collections) = self.collection.counts();
        SessionStatus {
            identity: if self.identity().is_guest() {
                IdentityKind::Guest
            } else {
                IdentityKind::Authenticated
            },
            offline: self.offline.is_offline(),
            reachability: self.probe.cache().snapshot().status,
            retry: self.gate.state(),
            max_retry_attempts: self.gate.max_attempts(),
            objects,
            collections,
        }
    }

    pub async fn load(&self) -> LoadOutcome {
        self.collection.load().await
    }

    /// 用户点击「重试连接」：在重试预算内重新探测并同步
    pub async fn retry_connection(&self) -> RecoveryOutcome {
        let collection = &self.collection;
        let probe = &self.probe;
        if self.identity().is_guest() {
            return self
                .gate
                .attempt_reprobe(|| async move {
                    if probe.check().await {
                        Ok(())
                    } else {
                        Err(StoreError::Unreachable("health check failed".to_string()))
                    }
                })
                .await;
        }
        self.gate
            .attempt_recovery(|| async move {
                match collection.load().await {
                    LoadOutcome::Synced { .. } | LoadOutcome::LocalOnly => Ok(()),
                    // 远端已可达，只是数据拉取失败
                    LoadOutcome::Degraded(kind) => {
                        tracing::warn!(?kind, "Reconnected but resync failed");
                        Ok(())
                    }
                    LoadOutcome::Offline => {
                        Err(StoreError::Unreachable("health check failed".to_string()))
                    }
                    LoadOutcome::Superseded => Err(StoreError::Cancelled),
                }
            })
            .await
    }

    /// 整个会话重置：清空可达性缓存与重试次数
    pub fn reset(&self) {
        self.gate.reset();
        tracing::info!("Session reset");
    }

    /// 退出登录：拆除进行中的操作、丢弃缓存并切换为访客
    pub fn sign_out(&mut self) {
        self.collection.shutdown();
        self.collection.clear();
        self.gate.reset();
        self.offline.set(false);
        self.collection = SyncedCollection::new(
            Identity::Guest,
            Arc::clone(&self.store),
            Arc::clone(&self.probe),
            Arc::clone(&self.offline),
            self.options.guest_capacity,
        );
        tracing::info!("Signed out, continuing as guest");
    }

    /// 探索一个对象并保存；拍摄的图片先上传，上传失败不阻断探索
    pub async fn explore(
        &self,
        name: &str,
        captured: Option<CapturedImage>,
    ) -> Result<SaveOutcome, StoreError> {
        let draft = self
            .catalog
            .draft(name)
            .ok_or_else(|| StoreError::NotFound(format!("No timeline for {}", name)))?;

        let uploaded = match captured {
            Some(image) if !self.identity().is_guest() => {
                match self
                    .collection
                    .capture_image(image.bytes, &image.content_type)
                    .await
                {
                    Ok(uploaded) => Some(uploaded),
                    Err(e @ StoreError::Validation(_)) => return Err(e),
                    Err(e) => {
                        tracing::warn!("Image upload failed, exploring without it: {}", e);
                        None
                    }
                }
            }
            Some(_) => {
                tracing::debug!("Guest session, captured image kept out of the saved object");
                None
            }
            None => None,
        };

        self.collection.save(draft, uploaded).await
    }

    /// 探索统计：登录且可达时取远端，否则由本地缓存计算
    pub async fn stats(&self) -> UserStats {
        if let Some(token) = self.identity().token() {
            if self.probe.check().await {
                match self.store.stats(token).await {
                    Ok(stats) => return stats,
                    Err(e) => tracing::warn!("Failed to fetch stats, using cache: {}", e),
                }
            }
        }
        let mut stats = UserStats::default();
        for object in self.collection.objects() {
            *stats
                .category_breakdown
                .entry(object.category.clone())
                .or_default() += 1;
            stats.total_objects += 1;
        }
        stats.total_collections = self.collection.counts().1;
        stats.categories_explored = stats.category_breakdown.len();
        stats
    }

    /// 拆除：取消所有进行中的远端调用
    pub fn shutdown(&self) {
        self.collection.shutdown();
        tracing::info!("Explorer session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SkipReason;
    use crate::remote::InMemoryObjectStore;
    use crate::sync::Reachability;

    fn session(store: &Arc<InMemoryObjectStore>, identity: Identity) -> ExplorerSession {
        ExplorerSession::new(
            identity,
            store.clone(),
            SessionOptions::default(),
            Catalog::builtin().unwrap(),
        )
    }

    fn store() -> Arc<InMemoryObjectStore> {
        let store = Arc::new(InMemoryObjectStore::new());
        store.register_user("tok", "user-1", "Ada");
        store
    }

    #[tokio::test]
    async fn test_status_projection() {
        let store = store();
        let s = session(&store, Identity::authenticated("user-1", "tok"));
        let status = s.status();
        assert_eq!(status.identity, IdentityKind::Authenticated);
        assert_eq!(status.reachability, Reachability::Unknown);
        assert!(!status.offline);

        s.explore("Smartphone Evolution", None).await.unwrap();
        let status = s.status();
        assert_eq!(status.reachability, Reachability::Reachable);
        assert_eq!(status.objects, 1);
        assert_eq!(status.banner(), None);
    }

    #[tokio::test]
    async fn test_retry_recovers_after_outage() {
        let store = store();
        let s = session(&store, Identity::authenticated("user-1", "tok"));
        store.set_reachable(false);
        assert_eq!(s.load().await, LoadOutcome::Offline);
        assert!(s.status().can_retry());

        assert!(matches!(s.retry_connection().await, RecoveryOutcome::StillOffline(_)));
        assert_eq!(s.status().banner().as_deref(), Some("Offline Mode 1/3"));

        store.set_reachable(true);
        assert_eq!(s.retry_connection().await, RecoveryOutcome::Recovered);
        let status = s.status();
        assert!(!status.offline);
        assert_eq!(status.retry.attempts, 2);
        assert!(!status.can_retry());
    }

    #[tokio::test]
    async fn test_retry_budget_and_reset() {
        let store = store();
        store.set_reachable(false);
        let s = session(&store, Identity::authenticated("user-1", "tok"));
        s.load().await;
        for _ in 0..3 {
            s.retry_connection().await;
        }
        assert_eq!(
            s.retry_connection().await,
            RecoveryOutcome::Skipped(SkipReason::Exhausted)
        );
        assert_eq!(store.health_calls(), 4);

        s.reset();
        assert_eq!(s.status().retry.attempts, 0);
        assert_eq!(s.status().reachability, Reachability::Unknown);
    }

    #[tokio::test]
    async fn test_guest_retry_never_sets_offline() {
        let store = store();
        store.set_reachable(false);
        let s = session(&store, Identity::Guest);
        assert!(matches!(s.retry_connection().await, RecoveryOutcome::StillOffline(_)));
        let status = s.status();
        assert!(!status.offline);
        assert_eq!(status.reachability, Reachability::Unreachable);
        assert_eq!(status.retry.attempts, 1);
        assert_eq!(status.banner().as_deref(), Some("Guest Mode"));
    }

    #[tokio::test]
    async fn test_sign_out_switches_to_guest() {
        let store = store();
        let mut s = session(&store, Identity::authenticated("user-1", "tok"));
        s.explore("Music Evolution", None).await.unwrap();
        assert_eq!(s.objects().len(), 1);

        s.sign_out();
        assert!(s.identity().is_guest());
        assert!(s.objects().is_empty());
        assert_eq!(s.status().banner().as_deref(), Some("Guest Mode"));

        let out = s.explore("Music Evolution", None).await.unwrap();
        assert!(out.saved().unwrap().is_guest());
    }

    #[tokio::test]
    async fn test_explore_unknown_name() {
        let store = store();
        let s = session(&store, Identity::Guest);
        assert!(matches!(
            s.explore("Toaster Evolution", None).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_explore_with_capture() {
        let store = store();
        let s = session(&store, Identity::authenticated("user-1", "tok"));
        let out = s
            .explore(
                "Automobile Evolution",
                Some(CapturedImage {
                    bytes: vec![1; 64],
                    content_type: "image/jpeg".into(),
                }),
            )
            .await
            .unwrap();
        let saved = out.saved().unwrap();
        assert!(saved.user_image.is_some());
        assert!(saved.points().last().unwrap().user_uploaded);
        assert_eq!(store.blob_count(), 1);
    }

    #[tokio::test]
    async fn test_stats_for_guest_from_cache() {
        let store = store();
        let s = session(&store, Identity::Guest);
        s.explore("Music Evolution", None).await.unwrap();
        s.explore("Smartphone Evolution", None).await.unwrap();
        let stats = s.stats().await;
        assert_eq!(stats.total_objects, 2);
        assert_eq!(stats.categories_explored, 2);
    }
}
