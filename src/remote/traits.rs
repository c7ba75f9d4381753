//! 远端对象存储抽象
//!
//! 所有实现（HTTP / 内存模拟）实现 ObjectStore。health 不需要身份；其余调用携带 Bearer 凭证。

use async_trait::async_trait;

use crate::core::StoreError;
use crate::remote::models::{
    Collection, CollectionPatch, ExploredObject, Profile, SaveObjectRequest, SignedUpUser,
    UploadedImage, UserStats,
};

/// Bearer 凭证（不在 Debug 中泄露内容）
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// 远端对象存储：对象、集合、图片上传与身份资料
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 存活检查，2xx 即成功
    async fn health(&self) -> Result<(), StoreError>;

    async fn signup(&self, email: &str, password: &str, name: &str)
        -> Result<SignedUpUser, StoreError>;

    async fn profile(&self, token: &AccessToken) -> Result<Profile, StoreError>;

    async fn update_profile(&self, token: &AccessToken, name: &str)
        -> Result<Profile, StoreError>;

    async fn save_object(
        &self,
        token: &AccessToken,
        request: &SaveObjectRequest,
    ) -> Result<ExploredObject, StoreError>;

    /// 按最新在前的顺序返回对象列表
    async fn list_objects(&self, token: &AccessToken) -> Result<Vec<ExploredObject>, StoreError>;

    async fn get_object(&self, token: &AccessToken, id: &str)
        -> Result<ExploredObject, StoreError>;

    async fn delete_object(&self, token: &AccessToken, id: &str) -> Result<(), StoreError>;

    async fn create_collection(
        &self,
        token: &AccessToken,
        name: &str,
        description: &str,
        object_ids: &[String],
    ) -> Result<Collection, StoreError>;

    async fn list_collections(&self, token: &AccessToken) -> Result<Vec<Collection>, StoreError>;

    async fn get_collection(&self, token: &AccessToken, id: &str)
        -> Result<Collection, StoreError>;

    async fn update_collection(
        &self,
        token: &AccessToken,
        id: &str,
        patch: &CollectionPatch,
    ) -> Result<Collection, StoreError>;

    async fn delete_collection(&self, token: &AccessToken, id: &str) -> Result<(), StoreError>;

    async fn add_to_collection(
        &self,
        token: &AccessToken,
        collection_id: &str,
        object_id: &str,
    ) -> Result<(), StoreError>;

    async fn remove_from_collection(
        &self,
        token: &AccessToken,
        collection_id: &str,
        object_id: &str,
    ) -> Result<(), StoreError>;

    /// 上传原始图片字节（≤10MB，image/*）
    async fn upload_image(
        &self,
        token: &AccessToken,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadedImage, StoreError>;

    /// 获取图片的签名 URL
    async fn image_url(&self, token: &AccessToken, file_name: &str) -> Result<String, StoreError>;

    async fn stats(&self, token: &AccessToken) -> Result<UserStats, StoreError>;
}
