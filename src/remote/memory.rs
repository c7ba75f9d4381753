//! 内存版远端对象存储（无需网络）
//!
//! 复刻服务端可观察的策略：每个身份最多 50 个对象（超出按 FIFO 淘汰并尽力清理其图片 blob），
//! 新对象 / 集合插在最前，删除对象时从所有集合中移除，时间线格式不合法时拒绝保存，上传限制 10MB 且必须为 image/*。
//! 另带故障注入开关（不可达、探测延迟、下一次写失败、blob 删除失败），供测试与离线演示使用。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::core::StoreError;
use crate::remote::models::{
    Collection, CollectionPatch, ExploredObject, Profile, SaveObjectRequest, SignedUpUser,
    UploadedImage, UserStats,
};
use crate::remote::traits::{AccessToken, ObjectStore};
use crate::remote::{validate_upload, MAX_OBJECTS_PER_USER};
use crate::timeline::validate_timeline;

#[derive(Debug, Default)]
struct UserData {
    profile: Option<Profile>,
    /// 最新在前
    object_ids: Vec<String>,
    objects: HashMap<String, ExploredObject>,
    collection_ids: Vec<String>,
    collections: HashMap<String, Collection>,
}

#[derive(Debug, Default)]
struct State {
    tokens: HashMap<String, String>,
    users: HashMap<String, UserData>,
    /// file_name -> (属主, 字节)
    blobs: HashMap<String, (String, Vec<u8>)>,
}

/// 内存对象存储
#[derive(Debug)]
pub struct InMemoryObjectStore {
    state: Mutex<State>,
    reachable: AtomicBool,
    fail_blob_removal: AtomicBool,
    health_calls: AtomicUsize,
    health_delay: Mutex<Option<Duration>>,
    read_delay: Mutex<Option<Duration>>,
    fail_next_write: Mutex<Option<StoreError>>,
}

fn new_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..9])
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            reachable: AtomicBool::new(true),
            fail_blob_removal: AtomicBool::new(false),
            health_calls: AtomicUsize::new(0),
            health_delay: Mutex::new(None),
            read_delay: Mutex::new(None),
            fail_next_write: Mutex::new(None),
        }
    }

    /// 注册一个已登录身份：token -> user_id
    pub fn register_user(&self, token: &str, user_id: &str, name: &str) {
        let mut state = self.lock();
        state.tokens.insert(token.to_string(), user_id.to_string());
        let user = state.users.entry(user_id.to_string()).or_default();
        user.profile.get_or_insert_with(|| Profile {
            name: name.to_string(),
            email: format!("{}@example.com", user_id),
            created_at: Some(Utc::now().to_rfc3339()),
            objects_explored: 0,
            collections_created: 0,
        });
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// 让 health 调用先等待 delay（模拟探测超时）
    pub fn set_health_delay(&self, delay: Option<Duration>) {
        *self.health_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// 让列表读取先等待 delay（模拟慢速同步）
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// 下一次写操作返回给定错误
    pub fn fail_next_write(&self, err: StoreError) {
        *self.fail_next_write.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    pub fn set_fail_blob_removal(&self, fail: bool) {
        self.fail_blob_removal.store(fail, Ordering::SeqCst);
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn blob_count(&self) -> usize {
        self.lock().blobs.len()
    }

    pub fn has_blob(&self, file_name: &str) -> bool {
        self.lock().blobs.contains_key(file_name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_reachable(&self) -> Result<(), StoreError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable("connection refused".to_string()))
        }
    }

    fn take_write_failure(&self) -> Result<(), StoreError> {
        match self
            .fail_next_write
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn read_pause(&self) {
        let delay = *self.read_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }

    fn user_id(state: &State, token: &AccessToken) -> Result<String, StoreError> {
        state
            .tokens
            .get(token.as_str())
            .cloned()
            .ok_or_else(|| StoreError::Unauthorized("invalid or missing token".to_string()))
    }

    /// 尽力删除 blob；失败只记日志，不影响所属操作
    fn remove_blob(&self, state: &mut State, file_name: &str) {
        if self.fail_blob_removal.load(Ordering::SeqCst) {
            let err = StoreError::Storage(format!("failed to remove {}", file_name));
            tracing::warn!(file = %file_name, "blob cleanup failed: {}", err);
            return;
        }
        state.blobs.remove(file_name);
    }

    /// 执行一次写操作的公共前置检查，返回 user_id
    fn begin_write(&self, state: &State, token: &AccessToken) -> Result<String, StoreError> {
        self.ensure_reachable()?;
        let user_id = Self::user_id(state, token)?;
        self.take_write_failure()?;
        Ok(user_id)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn health(&self) -> Result<(), StoreError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.health_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.ensure_reachable()
    }

    async fn signup(&self, email: &str, password: &str, name: &str) -> Result<SignedUpUser, StoreError> {
        self.ensure_reachable()?;
        if email.trim().is_empty() || password.is_empty() || name.trim().is_empty() {
            return Err(StoreError::Validation(
                "Email, password, and name are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(StoreError::Validation("Invalid email format".to_string()));
        }
        if password.len() < 6 {
            return Err(StoreError::Validation(
                "Password must be at least 6 characters long".to_string(),
            ));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = self.lock();
        state.users.entry(id.clone()).or_default().profile = Some(Profile {
            name: name.trim().to_string(),
            email: email.trim().to_lowercase(),
            created_at: Some(Utc::now().to_rfc3339()),
            objects_explored: 0,
            collections_created: 0,
        });
        Ok(SignedUpUser {
            id,
            email: email.trim().to_lowercase(),
            name: name.trim().to_string(),
        })
    }

    async fn profile(&self, token: &AccessToken) -> Result<Profile, StoreError> {
        self.ensure_reachable()?;
        let state = self.lock();
        let user_id = Self::user_id(&state, token)?;
        let user = state
            .users
            .get(&user_id)
            .ok_or_else(|| StoreError::NotFound("Profile not found".to_string()))?;
        let mut profile = user
            .profile
            .clone()
            .ok_or_else(|| StoreError::NotFound("Profile not found".to_string()))?;
        profile.objects_explored = user.object_ids.len();
        profile.collections_created = user.collection_ids.len();
        Ok(profile)
    }

    async fn update_profile(&self, token: &AccessToken, name: &str) -> Result<Profile, StoreError> {
        let mut state = self.lock();
        let user_id = self.begin_write(&state, token)?;
        if name.trim().is_empty() {
            return Err(StoreError::Validation("Name is required".to_string()));
        }
        let profile = state
            .users
            .get_mut(&user_id)
            .and_then(|u| u.profile.as_mut())
            .ok_or_else(|| StoreError::NotFound("Profile not found".to_string()))?;
        profile.name = name.trim().to_string();
        Ok(profile.clone())
    }

    async fn save_object(
        &self,
        token: &AccessToken,
        request: &SaveObjectRequest,
    ) -> Result<ExploredObject, StoreError> {
        let mut state = self.lock();
        let user_id = self.begin_write(&state, token)?;
        if request.object_name.trim().is_empty() {
            return Err(StoreError::Validation(
                "Object name and timeline data are required".to_string(),
            ));
        }
        if validate_timeline(&request.timeline_data.timeline_points).is_err() {
            return Err(StoreError::Validation(
                "Invalid timeline data format".to_string(),
            ));
        }

        let object = ExploredObject {
            id: new_id(),
            name: request.object_name.trim().to_string(),
            category: if request.category.is_empty() {
                "General".to_string()
            } else {
                request.category.clone()
            },
            timeline_data: request.timeline_data.clone(),
            explored_at: Utc::now(),
            user_id: user_id.clone(),
            user_image: request.user_image.clone(),
        };

        let evicted = {
            let user = state.users.entry(user_id.clone()).or_default();
            user.objects.insert(object.id.clone(), object.clone());
            user.object_ids.insert(0, object.id.clone());
            if user.object_ids.len() > MAX_OBJECTS_PER_USER {
                let removed: Vec<String> = user.object_ids.split_off(MAX_OBJECTS_PER_USER);
                removed
                    .into_iter()
                    .filter_map(|id| user.objects.remove(&id))
                    .collect::<Vec<_>>()
            } else {
                Vec::new()
            }
        };

        for old in evicted {
            tracing::debug!(object = %old.id, "evicted oldest object over cap");
            if let Some(image) = old.user_image {
                self.remove_blob(&mut state, &image.file_name);
            }
        }

        Ok(object)
    }

    async fn list_objects(&self, token: &AccessToken) -> Result<Vec<ExploredObject>, StoreError> {
        self.ensure_reachable()?;
        self.read_pause().await;
        self.ensure_reachable()?;
        let state = self.lock();
        let user_id = Self::user_id(&state, token)?;
        Ok(state
            .users
            .get(&user_id)
            .map(|u| {
                u.object_ids
                    .iter()
                    .filter_map(|id| u.objects.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_object(&self, token: &AccessToken, id: &str) -> Result<ExploredObject, StoreError> {
        self.ensure_reachable()?;
        let state = self.lock();
        let user_id = Self::user_id(&state, token)?;
        state
            .users
            .get(&user_id)
            .and_then(|u| u.objects.get(id).cloned())
            .ok_or_else(|| StoreError::NotFound("Object not found".to_string()))
    }

    async fn delete_object(&self, token: &AccessToken, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let user_id = self.begin_write(&state, token)?;
        let removed = {
            let user = state
                .users
                .get_mut(&user_id)
                .ok_or_else(|| StoreError::NotFound("Object not found".to_string()))?;
            let removed = user
                .objects
                .remove(id)
                .ok_or_else(|| StoreError::NotFound("Object not found".to_string()))?;
            user.object_ids.retain(|oid| oid != id);
            for collection in user.collections.values_mut() {
                if collection.contains(id) {
                    collection.object_ids.retain(|oid| oid != id);
                }
            }
            removed
        };
        if let Some(image) = removed.user_image {
            self.remove_blob(&mut state, &image.file_name);
        }
        Ok(())
    }

    async fn create_collection(
        &self,
        token: &AccessToken,
        name: &str,
        description: &str,
        object_ids: &[String],
    ) -> Result<Collection, StoreError> {
        let mut state = self.lock();
        let user_id = self.begin_write(&state, token)?;
        if name.trim().is_empty() {
            return Err(StoreError::Validation("Collection name is required".to_string()));
        }
        let now = Utc::now();
        let collection = Collection {
            id: new_id(),
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            object_ids: object_ids.to_vec(),
            created_at: now,
            updated_at: now,
        };
        let user = state.users.entry(user_id).or_default();
        user.collections.insert(collection.id.clone(), collection.clone());
        user.collection_ids.insert(0, collection.id.clone());
        Ok(collection)
    }

    async fn list_collections(&self, token: &AccessToken) -> Result<Vec<Collection>, StoreError> {
        self.ensure_reachable()?;
        self.read_pause().await;
        self.ensure_reachable()?;
        let state = self.lock();
        let user_id = Self::user_id(&state, token)?;
        Ok(state
            .users
            .get(&user_id)
            .map(|u| {
                u.collection_ids
                    .iter()
                    .filter_map(|id| u.collections.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_collection(&self, token: &AccessToken, id: &str) -> Result<Collection, StoreError> {
        self.ensure_reachable()?;
        let state = self.lock();
        let user_id = Self::user_id(&state, token)?;
        state
            .users
            .get(&user_id)
            .and_then(|u| u.collections.get(id).cloned())
            .ok_or_else(|| StoreError::NotFound("Collection not found".to_string()))
    }

    async fn update_collection(
        &self,
        token: &AccessToken,
        id: &str,
        patch: &CollectionPatch,
    ) -> Result<Collection, StoreError> {
        let mut state = self.lock();
        let user_id = self.begin_write(&state, token)?;
        let collection = state
            .users
            .get_mut(&user_id)
            .and_then(|u| u.collections.get_mut(id))
            .ok_or_else(|| StoreError::NotFound("Collection not found".to_string()))?;
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(StoreError::Validation(
                    "Collection name cannot be empty".to_string(),
                ));
            }
            collection.name = name.trim().to_string();
        }
        if let Some(description) = &patch.description {
            collection.description = description.trim().to_string();
        }
        collection.updated_at = Utc::now();
        Ok(collection.clone())
    }

    async fn delete_collection(&self, token: &AccessToken, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let user_id = self.begin_write(&state, token)?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound("Collection not found".to_string()))?;
        user.collections
            .remove(id)
            .ok_or_else(|| StoreError::NotFound("Collection not found".to_string()))?;
        user.collection_ids.retain(|cid| cid != id);
        Ok(())
    }

    async fn add_to_collection(
        &self,
        token: &AccessToken,
        collection_id: &str,
        object_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let user_id = self.begin_write(&state, token)?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound("Collection not found".to_string()))?;
        if !user.objects.contains_key(object_id) {
            return Err(StoreError::NotFound("Object not found".to_string()));
        }
        let collection = user
            .collections
            .get_mut(collection_id)
            .ok_or_else(|| StoreError::NotFound("Collection not found".to_string()))?;
        if !collection.contains(object_id) {
            collection.object_ids.push(object_id.to_string());
            collection.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_from_collection(
        &self,
        token: &AccessToken,
        collection_id: &str,
        object_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let user_id = self.begin_write(&state, token)?;
        let collection = state
            .users
            .get_mut(&user_id)
            .and_then(|u| u.collections.get_mut(collection_id))
            .ok_or_else(|| StoreError::NotFound("Collection not found".to_string()))?;
        collection.object_ids.retain(|id| id != object_id);
        collection.updated_at = Utc::now();
        Ok(())
    }

    async fn upload_image(
        &self,
        token: &AccessToken,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadedImage, StoreError> {
        let mut state = self.lock();
        let user_id = self.begin_write(&state, token)?;
        validate_upload(bytes.len(), content_type)?;
        let extension = content_type.strip_prefix("image/").unwrap_or("jpg");
        let file_name = format!("{}/{}.{}", user_id, new_id(), extension);
        state
            .blobs
            .insert(file_name.clone(), (user_id, bytes));
        Ok(UploadedImage {
            url: format!("memory://user-uploads/{}", file_name),
            path: file_name.clone(),
            file_name,
        })
    }

    async fn image_url(&self, token: &AccessToken, file_name: &str) -> Result<String, StoreError> {
        self.ensure_reachable()?;
        let state = self.lock();
        let user_id = Self::user_id(&state, token)?;
        match state.blobs.get(file_name) {
            Some((owner, _)) if *owner == user_id => {
                Ok(format!("memory://user-uploads/{}?signed=1", file_name))
            }
            Some(_) => Err(StoreError::NotFound("Access denied".to_string())),
            None => Err(StoreError::NotFound("File not found".to_string())),
        }
    }

    async fn stats(&self, token: &AccessToken) -> Result<UserStats, StoreError> {
        self.ensure_reachable()?;
        let state = self.lock();
        let user_id = Self::user_id(&state, token)?;
        let mut stats = UserStats::default();
        if let Some(user) = state.users.get(&user_id) {
            stats.total_objects = user.object_ids.len();
            stats.total_collections = user.collection_ids.len();
            for obj in user.objects.values() {
                *stats.category_breakdown.entry(obj.category.clone()).or_default() += 1;
            }
            stats.categories_explored = stats.category_breakdown.len();
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::models::{TimelineData, TimelinePoint, UserImageRef};

    fn token() -> AccessToken {
        AccessToken::new("tok-1")
    }

    fn store() -> InMemoryObjectStore {
        let s = InMemoryObjectStore::new();
        s.register_user("tok-1", "user-1", "Ada");
        s
    }

    fn request(name: &str, image: Option<UserImageRef>) -> SaveObjectRequest {
        SaveObjectRequest {
            object_name: name.to_string(),
            timeline_data: TimelineData::from(vec![TimelinePoint::new("1900", "Past", "d", "i", 0.0)]),
            category: "Technology".to_string(),
            user_image: image,
        }
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthorized() {
        let s = store();
        let err = s.list_objects(&AccessToken::new("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_newest_first_and_cap_evicts_oldest() {
        let s = store();
        for i in 0..(MAX_OBJECTS_PER_USER + 2) {
            s.save_object(&token(), &request(&format!("obj-{}", i), None)).await.unwrap();
        }
        let list = s.list_objects(&token()).await.unwrap();
        assert_eq!(list.len(), MAX_OBJECTS_PER_USER);
        assert_eq!(list[0].name, format!("obj-{}", MAX_OBJECTS_PER_USER + 1));
        assert!(list.iter().all(|o| o.name != "obj-0" && o.name != "obj-1"));
    }

    #[tokio::test]
    async fn test_eviction_cleans_up_blob() {
        let s = store();
        let uploaded = s.upload_image(&token(), vec![1, 2, 3], "image/png").await.unwrap();
        s.save_object(&token(), &request("first", Some(uploaded.as_ref_only())))
            .await
            .unwrap();
        for i in 0..MAX_OBJECTS_PER_USER {
            s.save_object(&token(), &request(&format!("filler-{}", i), None)).await.unwrap();
        }
        assert!(!s.has_blob(&uploaded.file_name));
    }

    #[tokio::test]
    async fn test_blob_cleanup_failure_does_not_fail_delete() {
        let s = store();
        let uploaded = s.upload_image(&token(), vec![9], "image/jpeg").await.unwrap();
        let obj = s
            .save_object(&token(), &request("with image", Some(uploaded.as_ref_only())))
            .await
            .unwrap();
        s.set_fail_blob_removal(true);
        s.delete_object(&token(), &obj.id).await.unwrap();
        assert!(s.list_objects(&token()).await.unwrap().is_empty());
        assert!(s.has_blob(&uploaded.file_name));
    }

    #[tokio::test]
    async fn test_blob_cleanup_failure_does_not_fail_eviction() {
        let s = store();
        let uploaded = s.upload_image(&token(), vec![7; 8], "image/png").await.unwrap();
        s.save_object(&token(), &request("oldest", Some(uploaded.as_ref_only())))
            .await
            .unwrap();
        for i in 0..(MAX_OBJECTS_PER_USER - 1) {
            s.save_object(&token(), &request(&format!("filler-{}", i), None)).await.unwrap();
        }
        s.set_fail_blob_removal(true);

        let newest = s.save_object(&token(), &request("newest", None)).await;
        assert!(newest.is_ok());
        let list = s.list_objects(&token()).await.unwrap();
        assert_eq!(list.len(), MAX_OBJECTS_PER_USER);
        assert_eq!(list[0].name, "newest");
        assert!(list.iter().all(|o| o.name != "oldest"));
        assert!(s.has_blob(&uploaded.file_name));
    }

    #[tokio::test]
    async fn test_save_rejects_malformed_timeline() {
        let s = store();
        let mut empty = request("empty", None);
        empty.timeline_data = TimelineData::default();
        assert_eq!(
            s.save_object(&token(), &empty).await,
            Err(StoreError::Validation("Invalid timeline data format".into()))
        );

        let mut decreasing = request("decreasing", None);
        decreasing.timeline_data = TimelineData::from(vec![
            TimelinePoint::new("1900", "Past", "d", "i", 0.0),
            TimelinePoint::new("1950", "Mid", "d", "i", 80.0),
            TimelinePoint::new("2000", "Now", "d", "i", 40.0),
        ]);
        assert!(matches!(
            s.save_object(&token(), &decreasing).await,
            Err(StoreError::Validation(_))
        ));
        assert!(s.list_objects(&token()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_from_collections() {
        let s = store();
        let obj = s.save_object(&token(), &request("a", None)).await.unwrap();
        let c = s
            .create_collection(&token(), "Favs", "", &[obj.id.clone()])
            .await
            .unwrap();
        s.delete_object(&token(), &obj.id).await.unwrap();
        let c = s.get_collection(&token(), &c.id).await.unwrap();
        assert!(c.object_ids.is_empty());
    }

    #[tokio::test]
    async fn test_add_to_collection_is_idempotent() {
        let s = store();
        let obj = s.save_object(&token(), &request("a", None)).await.unwrap();
        let c = s.create_collection(&token(), "Favs", "", &[]).await.unwrap();
        s.add_to_collection(&token(), &c.id, &obj.id).await.unwrap();
        s.add_to_collection(&token(), &c.id, &obj.id).await.unwrap();
        let c = s.get_collection(&token(), &c.id).await.unwrap();
        assert_eq!(c.object_ids, vec![obj.id]);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_image() {
        let s = store();
        let err = s
            .upload_image(&token(), vec![0; 4], "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_fail_next_write_applies_once() {
        let s = store();
        s.fail_next_write(StoreError::Remote { status: 500, message: "boom".into() });
        assert!(s.save_object(&token(), &request("a", None)).await.is_err());
        assert!(s.save_object(&token(), &request("a", None)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_health() {
        let s = store();
        s.set_reachable(false);
        assert!(matches!(s.health().await, Err(StoreError::Unreachable(_))));
        assert_eq!(s.health_calls(), 1);
    }
}
