//! 基于 reqwest 的远端对象存储客户端
//!
//! 每类调用使用独立超时（探测 / 读 / 写 / 上传）；传输层错误与超时归为 Unreachable，
//! 401 归为 Unauthorized；错误信息取自服务端 `{"error": "..."}` 响应体。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::config::RemoteSection;
use crate::core::StoreError;
use crate::remote::models::{
    Collection, CollectionPatch, ExploredObject, Profile, SaveObjectRequest, SignedUpUser,
    UploadedImage, UserStats,
};
use crate::remote::traits::{AccessToken, ObjectStore};

/// 各类请求的超时
#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    pub health: Duration,
    pub read: Duration,
    pub write: Duration,
    pub upload: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            health: Duration::from_secs(10),
            read: Duration::from_secs(10),
            write: Duration::from_secs(15),
            upload: Duration::from_secs(30),
        }
    }
}

/// HTTP 远端对象存储
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    anon_key: String,
    timeouts: HttpTimeouts,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Deserialize)]
struct ObjectEnvelope {
    object: ExploredObject,
}

#[derive(Deserialize)]
struct ObjectsEnvelope {
    #[serde(default)]
    objects: Vec<ExploredObject>,
}

#[derive(Deserialize)]
struct CollectionEnvelope {
    collection: Collection,
}

#[derive(Deserialize)]
struct CollectionsEnvelope {
    #[serde(default)]
    collections: Vec<Collection>,
}

#[derive(Deserialize)]
struct ProfileEnvelope {
    profile: Profile,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: SignedUpUser,
}

#[derive(Deserialize)]
struct UrlEnvelope {
    url: String,
}

#[derive(Deserialize)]
struct StatsEnvelope {
    stats: UserStats,
}

/// 将 reqwest 传输错误归类（连接失败、超时、DNS 等均为不可达）
fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Unreachable(format!("request timed out: {}", e))
    } else {
        StoreError::Unreachable(format!("request failed: {}", e))
    }
}

/// 非 2xx 响应按状态码归类
pub(crate) fn classify_status(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED => StoreError::Unauthorized(message),
        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => StoreError::NotFound(message),
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Validation(message),
        _ => StoreError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}

async fn error_from(resp: Response) -> StoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body
            }
        });
    classify_status(status, message)
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
    if !resp.status().is_success() {
        return Err(error_from(resp).await);
    }
    resp.json::<T>()
        .await
        .map_err(|e| StoreError::Decode(e.to_string()))
}

async fn expect_success(resp: Response) -> Result<(), StoreError> {
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(error_from(resp).await)
    }
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>, timeouts: HttpTimeouts) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::builder()
                .user_agent(concat!("chronoscope/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            base_url,
            anon_key: anon_key.into(),
            timeouts,
        }
    }

    /// 从 [remote] 配置段构造；未配置 base_url 时返回 None
    pub fn from_config(section: &RemoteSection) -> Option<Self> {
        let base_url = section.base_url.as_ref()?;
        let t = &section.timeouts;
        Some(Self::new(
            base_url.clone(),
            section.anon_key.clone().unwrap_or_default(),
            HttpTimeouts {
                health: Duration::from_secs(t.health_secs),
                read: Duration::from_secs(t.read_secs),
                write: Duration::from_secs(t.write_secs),
                upload: Duration::from_secs(t.upload_secs),
            },
        ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder, token: &AccessToken, timeout: Duration) -> RequestBuilder {
        builder.bearer_auth(token.as_str()).timeout(timeout)
    }

    async fn send(builder: RequestBuilder) -> Result<Response, StoreError> {
        builder.send().await.map_err(transport_error)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn health(&self) -> Result<(), StoreError> {
        let req = self
            .client
            .get(self.url("/health"))
            .bearer_auth(&self.anon_key)
            .timeout(self.timeouts.health);
        let resp = Self::send(req).await?;
        tracing::debug!(status = %resp.status(), "health response");
        expect_success(resp).await
    }

    async fn signup(&self, email: &str, password: &str, name: &str) -> Result<SignedUpUser, StoreError> {
        let req = self
            .client
            .post(self.url("/auth/signup"))
            .bearer_auth(&self.anon_key)
            .timeout(self.timeouts.write)
            .json(&json!({ "email": email, "password": password, "name": name }));
        let env: UserEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.user)
    }

    async fn profile(&self, token: &AccessToken) -> Result<Profile, StoreError> {
        let req = self.authed(self.client.get(self.url("/auth/profile")), token, self.timeouts.read);
        let env: ProfileEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.profile)
    }

    async fn update_profile(&self, token: &AccessToken, name: &str) -> Result<Profile, StoreError> {
        let req = self
            .authed(self.client.put(self.url("/auth/profile")), token, self.timeouts.write)
            .json(&json!({ "name": name }));
        let env: ProfileEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.profile)
    }

    async fn save_object(
        &self,
        token: &AccessToken,
        request: &SaveObjectRequest,
    ) -> Result<ExploredObject, StoreError> {
        let req = self
            .authed(self.client.post(self.url("/objects/save")), token, self.timeouts.write)
            .json(request);
        let env: ObjectEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.object)
    }

    async fn list_objects(&self, token: &AccessToken) -> Result<Vec<ExploredObject>, StoreError> {
        let req = self.authed(self.client.get(self.url("/objects")), token, self.timeouts.read);
        let env: ObjectsEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.objects)
    }

    async fn get_object(&self, token: &AccessToken, id: &str) -> Result<ExploredObject, StoreError> {
        let req = self.authed(
            self.client.get(self.url(&format!("/objects/{}", id))),
            token,
            self.timeouts.read,
        );
        let env: ObjectEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.object)
    }

    async fn delete_object(&self, token: &AccessToken, id: &str) -> Result<(), StoreError> {
        let req = self.authed(
            self.client.delete(self.url(&format!("/objects/{}", id))),
            token,
            self.timeouts.read,
        );
        expect_success(Self::send(req).await?).await
    }

    async fn create_collection(
        &self,
        token: &AccessToken,
        name: &str,
        description: &str,
        object_ids: &[String],
    ) -> Result<Collection, StoreError> {
        let req = self
            .authed(self.client.post(self.url("/collections")), token, self.timeouts.write)
            .json(&json!({ "name": name, "description": description, "objectIds": object_ids }));
        let env: CollectionEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.collection)
    }

    async fn list_collections(&self, token: &AccessToken) -> Result<Vec<Collection>, StoreError> {
        let req = self.authed(self.client.get(self.url("/collections")), token, self.timeouts.read);
        let env: CollectionsEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.collections)
    }

    async fn get_collection(&self, token: &AccessToken, id: &str) -> Result<Collection, StoreError> {
        let req = self.authed(
            self.client.get(self.url(&format!("/collections/{}", id))),
            token,
            self.timeouts.read,
        );
        let env: CollectionEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.collection)
    }

    async fn update_collection(
        &self,
        token: &AccessToken,
        id: &str,
        patch: &CollectionPatch,
    ) -> Result<Collection, StoreError> {
        let req = self
            .authed(
                self.client.put(self.url(&format!("/collections/{}", id))),
                token,
                self.timeouts.write,
            )
            .json(patch);
        let env: CollectionEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.collection)
    }

    async fn delete_collection(&self, token: &AccessToken, id: &str) -> Result<(), StoreError> {
        let req = self.authed(
            self.client.delete(self.url(&format!("/collections/{}", id))),
            token,
            self.timeouts.write,
        );
        expect_success(Self::send(req).await?).await
    }

    async fn add_to_collection(
        &self,
        token: &AccessToken,
        collection_id: &str,
        object_id: &str,
    ) -> Result<(), StoreError> {
        let req = self
            .authed(
                self.client
                    .post(self.url(&format!("/collections/{}/objects", collection_id))),
                token,
                self.timeouts.write,
            )
            .json(&json!({ "objectId": object_id }));
        expect_success(Self::send(req).await?).await
    }

    async fn remove_from_collection(
        &self,
        token: &AccessToken,
        collection_id: &str,
        object_id: &str,
    ) -> Result<(), StoreError> {
        let req = self.authed(
            self.client.delete(self.url(&format!(
                "/collections/{}/objects/{}",
                collection_id, object_id
            ))),
            token,
            self.timeouts.write,
        );
        expect_success(Self::send(req).await?).await
    }

    async fn upload_image(
        &self,
        token: &AccessToken,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadedImage, StoreError> {
        let req = self
            .authed(self.client.post(self.url("/upload/image")), token, self.timeouts.upload)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        decode(Self::send(req).await?).await
    }

    async fn image_url(&self, token: &AccessToken, file_name: &str) -> Result<String, StoreError> {
        let req = self.authed(
            self.client.get(self.url(&format!("/images/{}", file_name))),
            token,
            self.timeouts.read,
        );
        let env: UrlEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.url)
    }

    async fn stats(&self, token: &AccessToken) -> Result<UserStats, StoreError> {
        let req = self.authed(self.client.get(self.url("/stats")), token, self.timeouts.read);
        let env: StatsEnvelope = decode(Self::send(req).await?).await?;
        Ok(env.stats)
    }
}
