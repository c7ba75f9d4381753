//! 同步集合：当前身份的「已探索对象」与「集合」的本地镜像
//!
//! 登录身份：load 在可达时整体替换缓存，不可达时保留缓存并置离线（读路径从不报错）；
//! 写操作必须远端成功后才更新本地，save 成功后以一次完整 load 对齐服务端。
//! 访客身份：只有本地环形缓冲（默认 10 条，最新在前），load 为空操作。
//! 所有操作经 op_lock 串行；落地前比对代际令牌，clear / 拆除之后到达的结果被丢弃。

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Datelike, Utc};
use futures_util::future::try_join;
use tokio_util::sync::CancellationToken;

use crate::core::{Generation, Identity, LoadOutcome, SaveOutcome, StoreError};
use crate::remote::{
    validate_upload, AccessToken, Collection, CollectionPatch, ExploredObject, ObjectDraft,
    ObjectStore, SaveObjectRequest, TimelinePoint, UploadedImage, GUEST_OWNER,
};
use crate::sync::reachability::{AvailabilityProbe, OfflineFlag};
use crate::timeline::validate_timeline;

/// 访客环形缓冲默认容量
pub const DEFAULT_GUEST_CAPACITY: usize = 10;

#[derive(Debug, Default, Clone)]
struct CollectionCache {
    objects: Vec<ExploredObject>,
    collections: Vec<Collection>,
}

/// 当前身份的对象 / 集合镜像
pub struct SyncedCollection {
    identity: Identity,
    store: Arc<dyn ObjectStore>,
    probe: Arc<AvailabilityProbe>,
    offline: Arc<OfflineFlag>,
    cache: RwLock<CollectionCache>,
    op_lock: tokio::sync::Mutex<()>,
    generation: Generation,
    teardown: CancellationToken,
    guest_capacity: usize,
}

/// 用户拍摄图片追加为「Present」节点
fn with_captured_point(name: &str, mut timeline: Vec<TimelinePoint>, image: &UploadedImage) -> Vec<TimelinePoint> {
    timeline.push(TimelinePoint {
        year: Utc::now().year().to_string(),
        period: "Present".to_string(),
        description: format!("User captured image of {}", name),
        image: image.url.clone(),
        position: 100.0,
        user_uploaded: true,
    });
    timeline
}

fn validate_name(name: &str, what: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::Validation(format!("{} name is required", what)));
    }
    Ok(())
}

impl SyncedCollection {
    pub fn new(
        identity: Identity,
        store: Arc<dyn ObjectStore>,
        probe: Arc<AvailabilityProbe>,
        offline: Arc<OfflineFlag>,
        guest_capacity: usize,
    ) -> Self {
        Self {
            identity,
            store,
            probe,
            offline,
            cache: RwLock::new(CollectionCache::default()),
            op_lock: tokio::sync::Mutex::new(()),
            generation: Generation::new(),
            teardown: CancellationToken::new(),
            guest_capacity: guest_capacity.max(1),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// 对象列表快照（最新在前）
    pub fn objects(&self) -> Vec<ExploredObject> {
        self.read().objects.clone()
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.read().collections.clone()
    }

    pub fn counts(&self) -> (usize, usize) {
        let cache = self.read();
        (cache.objects.len(), cache.collections.len())
    }

    pub fn is_offline(&self) -> bool {
        self.offline.is_offline()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CollectionCache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CollectionCache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 远端调用与拆除令牌竞速
    async fn guarded<T>(&self, fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        tokio::select! {
            _ = self.teardown.cancelled() => Err(StoreError::Cancelled),
            r = fut => r,
        }
    }

    /// 不可达错误把会话降级为离线
    fn note(&self, e: StoreError) -> StoreError {
        if e.is_unreachable() {
            self.offline.set(true);
        }
        e
    }

    /// 写操作前置：必须是登录身份且远端可达
    async fn require_online(&self) -> Result<&AccessToken, StoreError> {
        let token = self.identity.token().ok_or(StoreError::GuestSession)?;
        if !self.probe.check().await {
            self.offline.set(true);
            return Err(StoreError::Unreachable(
                "Backend service is currently unavailable".to_string(),
            ));
        }
        Ok(token)
    }

    /// 从远端刷新缓存；失败时保留现有缓存
    pub async fn load(&self) -> LoadOutcome {
        let Some(token) = self.identity.token() else {
            return LoadOutcome::LocalOnly;
        };
        let _op = self.op_lock.lock().await;
        self.load_locked(token).await
    }

    async fn load_locked(&self, token: &AccessToken) -> LoadOutcome {
        let generation = self.generation.current();
        if !self.probe.check().await {
            self.offline.set(true);
            tracing::info!("Remote unavailable, keeping cached objects");
            return LoadOutcome::Offline;
        }

        let fetched = self
            .guarded(try_join(
                self.store.list_objects(token),
                self.store.list_collections(token),
            ))
            .await;

        match fetched {
            Ok((objects, collections)) => {
                let mut cache = self.write();
                if !self.generation.is_current(generation) {
                    tracing::debug!("Load superseded, discarding fetched data");
                    return LoadOutcome::Superseded;
                }
                let outcome = LoadOutcome::Synced {
                    objects: objects.len(),
                    collections: collections.len(),
                };
                cache.objects = objects;
                cache.collections = collections;
                self.offline.set(false);
                tracing::info!(?outcome, "Synced with remote store");
                outcome
            }
            Err(StoreError::Cancelled) => LoadOutcome::Superseded,
            Err(e) if e.is_unreachable() => {
                self.offline.set(true);
                tracing::warn!("Load failed, keeping cache: {}", e);
                LoadOutcome::Offline
            }
            Err(e) => {
                tracing::warn!("Load failed, keeping cache: {}", e);
                LoadOutcome::Degraded(e.kind())
            }
        }
    }

    /// 保存一个新探索的对象
    ///
    /// - 访客：插入本地环形缓冲最前，超出容量淘汰最旧的
    /// - 登录且不可达：返回 OfflineSkipped，不报错
    /// - 登录且可达：远端保存成功后完整 load；普通保存失败返回 Err，
    ///   附带拍摄图片的保存失败返回 Ok(Failed)，已上传的图片不回滚
    pub async fn save(
        &self,
        draft: ObjectDraft,
        user_image: Option<UploadedImage>,
    ) -> Result<SaveOutcome, StoreError> {
        validate_timeline(&draft.timeline).map_err(|e| StoreError::Validation(e.to_string()))?;
        validate_name(&draft.name, "Object")?;

        let timeline = match &user_image {
            Some(image) => with_captured_point(&draft.name, draft.timeline, image),
            None => draft.timeline,
        };

        let Some(token) = self.identity.token() else {
            return Ok(SaveOutcome::Saved(self.save_guest(draft.name, draft.category, timeline)));
        };

        let _op = self.op_lock.lock().await;
        if !self.probe.check().await {
            self.offline.set(true);
            tracing::info!(object = %draft.name, "Remote unavailable, object not saved (offline mode)");
            return Ok(SaveOutcome::OfflineSkipped);
        }

        let request = SaveObjectRequest {
            object_name: draft.name,
            timeline_data: timeline.into(),
            category: draft.category,
            user_image: user_image.as_ref().map(UploadedImage::as_ref_only),
        };

        match self.guarded(self.store.save_object(token, &request)).await {
            Ok(object) => {
                tracing::info!(object = %object.id, name = %object.name, "Object saved");
                self.load_locked(token).await;
                Ok(SaveOutcome::Saved(object))
            }
            Err(e) => {
                let e = self.note(e);
                match &user_image {
                    Some(image) => {
                        tracing::warn!(
                            file = %image.file_name,
                            "Save with captured image failed, uploaded image left in place: {}",
                            e
                        );
                        Ok(SaveOutcome::Failed(e.kind()))
                    }
                    None => Err(e),
                }
            }
        }
    }

    fn save_guest(&self, name: String, category: String, timeline: Vec<TimelinePoint>) -> ExploredObject {
        let object = ExploredObject {
            id: format!("guest-{}", uuid::Uuid::new_v4()),
            name,
            category,
            timeline_data: timeline.into(),
            explored_at: Utc::now(),
            user_id: GUEST_OWNER.to_string(),
            user_image: None,
        };
        let mut cache = self.write();
        cache.objects.insert(0, object.clone());
        cache.objects.truncate(self.guest_capacity);
        object
    }

    /// 上传用户拍摄的图片（先在本地校验类型与大小）
    pub async fn capture_image(&self, bytes: Vec<u8>, content_type: &str) -> Result<UploadedImage, StoreError> {
        validate_upload(bytes.len(), content_type)?;
        let token = self.require_online().await?;
        let uploaded = self
            .guarded(self.store.upload_image(token, bytes, content_type))
            .await
            .map_err(|e| self.note(e))?;
        tracing::info!(file = %uploaded.file_name, "Captured image uploaded");
        Ok(uploaded)
    }

    /// 取单个对象：访客或离线时读缓存，否则走远端（不可达时回退缓存）
    pub async fn object(&self, id: &str) -> Result<ExploredObject, StoreError> {
        let cached = || {
            self.read()
                .objects
                .iter()
                .find(|o| o.id == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("Object {} not found", id)))
        };
        let Some(token) = self.identity.token() else {
            return cached();
        };
        if !self.probe.check().await {
            self.offline.set(true);
            return cached();
        }
        match self.guarded(self.store.get_object(token, id)).await {
            Ok(object) => Ok(object),
            Err(e) if e.is_unreachable() => {
                self.note(e);
                cached()
            }
            Err(e) => Err(e),
        }
    }

    /// 删除对象（远端成功后才从本地移除，并同步移出所有集合）
    pub async fn delete(&self, object_id: &str) -> Result<(), StoreError> {
        let _op = self.op_lock.lock().await;
        let token = self.require_online().await?;
        self.guarded(self.store.delete_object(token, object_id))
            .await
            .map_err(|e| self.note(e))?;

        let mut cache = self.write();
        cache.objects.retain(|o| o.id != object_id);
        for c in cache.collections.iter_mut() {
            c.object_ids.retain(|id| id != object_id);
        }
        tracing::info!(object = %object_id, "Object deleted");
        Ok(())
    }

    pub async fn create_collection(
        &self,
        name: &str,
        description: &str,
        object_ids: &[String],
    ) -> Result<Collection, StoreError> {
        validate_name(name, "Collection")?;
        let _op = self.op_lock.lock().await;
        let token = self.require_online().await?;
        let collection = self
            .guarded(self.store.create_collection(token, name, description, object_ids))
            .await
            .map_err(|e| self.note(e))?;
        self.write().collections.insert(0, collection.clone());
        Ok(collection)
    }

    pub async fn update_collection(&self, id: &str, patch: CollectionPatch) -> Result<Collection, StoreError> {
        if let Some(name) = &patch.name {
            validate_name(name, "Collection")?;
        }
        let _op = self.op_lock.lock().await;
        let token = self.require_online().await?;
        let updated = self
            .guarded(self.store.update_collection(token, id, &patch))
            .await
            .map_err(|e| self.note(e))?;

        let mut cache = self.write();
        match cache.collections.iter_mut().find(|c| c.id == id) {
            Some(slot) => *slot = updated.clone(),
            None => cache.collections.insert(0, updated.clone()),
        }
        Ok(updated)
    }

    pub async fn rename_collection(&self, id: &str, name: &str) -> Result<Collection, StoreError> {
        self.update_collection(
            id,
            CollectionPatch {
                name: Some(name.to_string()),
                description: None,
            },
        )
        .await
    }

    pub async fn delete_collection(&self, id: &str) -> Result<(), StoreError> {
        let _op = self.op_lock.lock().await;
        let token = self.require_online().await?;
        self.guarded(self.store.delete_collection(token, id))
            .await
            .map_err(|e| self.note(e))?;
        self.write().collections.retain(|c| c.id != id);
        Ok(())
    }

    pub async fn add_to_collection(&self, collection_id: &str, object_id: &str) -> Result<(), StoreError> {
        let _op = self.op_lock.lock().await;
        let token = self.require_online().await?;
        self.guarded(self.store.add_to_collection(token, collection_id, object_id))
            .await
            .map_err(|e| self.note(e))?;

        let mut cache = self.write();
        if let Some(c) = cache.collections.iter_mut().find(|c| c.id == collection_id) {
            if !c.contains(object_id) {
                c.object_ids.push(object_id.to_string());
                c.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    pub async fn remove_from_collection(&self, collection_id: &str, object_id: &str) -> Result<(), StoreError> {
        let _op = self.op_lock.lock().await;
        let token = self.require_online().await?;
        self.guarded(self.store.remove_from_collection(token, collection_id, object_id))
            .await
            .map_err(|e| self.note(e))?;

        let mut cache = self.write();
        if let Some(c) = cache.collections.iter_mut().find(|c| c.id == collection_id) {
            c.object_ids.retain(|id| id != object_id);
            c.updated_at = Utc::now();
        }
        Ok(())
    }

    /// 丢弃本地缓存；进行中的 load 结果不会再落地
    pub fn clear(&self) {
        let mut cache = self.write();
        self.generation.advance();
        *cache = CollectionCache::default();
    }

    /// 拆除：取消所有进行中的远端调用并丢弃其结果
    pub fn shutdown(&self) {
        self.generation.advance();
        self.teardown.cancel();
    }
}
