//! 远端对象存储：数据模型、抽象与实现（HTTP / 内存）

pub mod http;
pub mod memory;
pub mod models;
pub mod traits;

pub use http::{HttpObjectStore, HttpTimeouts};
pub use memory::InMemoryObjectStore;
pub use models::{
    Collection, CollectionPatch, ExploredObject, ObjectDraft, Profile, SaveObjectRequest,
    SignedUpUser, TimelineData, TimelinePoint, UploadedImage, UserImageRef, UserStats,
    GUEST_OWNER,
};
pub use traits::{AccessToken, ObjectStore};

use crate::core::StoreError;

/// 服务端每个身份保留的对象上限
pub const MAX_OBJECTS_PER_USER: usize = 50;

/// 单张上传图片上限（10MB）
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// 上传前校验：必须是 image/* 且不超过 10MB
pub fn validate_upload(len: usize, content_type: &str) -> Result<(), StoreError> {
    if !content_type.starts_with("image/") {
        return Err(StoreError::Validation(
            "Please select a valid image file".to_string(),
        ));
    }
    if len == 0 {
        return Err(StoreError::Validation("No image data provided".to_string()));
    }
    if len > MAX_UPLOAD_BYTES {
        return Err(StoreError::Validation(
            "Image file is too large. Maximum size is 10MB".to_string(),
        ));
    }
    Ok(())
}
