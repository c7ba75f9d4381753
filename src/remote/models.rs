//! 远端对象存储的数据模型（与服务端 JSON 字段一一对应，camelCase）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 访客数据的属主标记
pub const GUEST_OWNER: &str = "guest";

/// 时间线上的一个节点；position 为 0–100 的归一化进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePoint {
    pub year: String,
    pub period: String,
    pub description: String,
    pub image: String,
    pub position: f64,
    /// 用户拍摄并上传的节点
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub user_uploaded: bool,
}

impl TimelinePoint {
    pub fn new(
        year: impl Into<String>,
        period: impl Into<String>,
        description: impl Into<String>,
        image: impl Into<String>,
        position: f64,
    ) -> Self {
        Self {
            year: year.into(),
            period: period.into(),
            description: description.into(),
            image: image.into(),
            position,
            user_uploaded: false,
        }
    }
}

/// 服务端的 timelineData 包装
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineData {
    pub timeline_points: Vec<TimelinePoint>,
}

impl From<Vec<TimelinePoint>> for TimelineData {
    fn from(timeline_points: Vec<TimelinePoint>) -> Self {
        Self { timeline_points }
    }
}

/// 附着在对象上的用户图片引用（外部 blob）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserImageRef {
    pub file_name: String,
    pub path: String,
}

/// 已探索对象：创建后不可变，只会被新建 / 删除 / 淘汰
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploredObject {
    pub id: String,
    pub name: String,
    pub category: String,
    pub timeline_data: TimelineData,
    pub explored_at: DateTime<Utc>,
    /// 属主身份；访客为 "guest"
    pub user_id: String,
    #[serde(default)]
    pub user_image: Option<UserImageRef>,
}

impl ExploredObject {
    pub fn points(&self) -> &[TimelinePoint] {
        &self.timeline_data.timeline_points
    }

    pub fn is_guest(&self) -> bool {
        self.user_id == GUEST_OWNER
    }
}

/// 用户集合：按顺序引用若干对象 id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub object_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn contains(&self, object_id: &str) -> bool {
        self.object_ids.iter().any(|id| id == object_id)
    }
}

/// 待保存对象（服务端分配 id 与时间戳）
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDraft {
    pub name: String,
    pub category: String,
    pub timeline: Vec<TimelinePoint>,
}

impl ObjectDraft {
    pub fn new(
        name: impl Into<String>,
        timeline: Vec<TimelinePoint>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            timeline,
        }
    }
}

/// POST /objects/save 请求体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveObjectRequest {
    pub object_name: String,
    pub timeline_data: TimelineData,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_image: Option<UserImageRef>,
}

/// 集合的可选更新字段（None 表示不改）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// POST /upload/image 的返回
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub file_name: String,
    pub url: String,
    pub path: String,
}

impl UploadedImage {
    pub fn as_ref_only(&self) -> UserImageRef {
        UserImageRef {
            file_name: self.file_name.clone(),
            path: self.path.clone(),
        }
    }
}

/// 用户资料（身份管理不在核心范围内，仅透传）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub objects_explored: usize,
    #[serde(default)]
    pub collections_created: usize,
}

/// POST /auth/signup 的返回用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUpUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// GET /stats 的统计数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_objects: usize,
    pub total_collections: usize,
    pub categories_explored: usize,
    #[serde(default)]
    pub category_breakdown: std::collections::BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_wire_format() {
        let json = r#"{
            "id": "1700000000000-abc",
            "name": "Smartphone Evolution",
            "category": "Technology",
            "timelineData": {"timelinePoints": [
                {"year": "1973", "period": "Origins", "description": "d", "image": "i", "position": 0}
            ]},
            "exploredAt": "2024-01-02T03:04:05Z",
            "userId": "u1",
            "userImage": null
        }"#;
        let obj: ExploredObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.points().len(), 1);
        assert!(!obj.points()[0].user_uploaded);
        assert!(obj.user_image.is_none());
        assert!(!obj.is_guest());
    }

    #[test]
    fn test_save_request_omits_missing_image() {
        let req = SaveObjectRequest {
            object_name: "Music Evolution".into(),
            timeline_data: TimelineData::default(),
            category: "Entertainment".into(),
            user_image: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["objectName"], "Music Evolution");
        assert!(v.get("userImage").is_none());
    }

    #[test]
    fn test_collection_defaults() {
        let json = r#"{"id":"c1","name":"Favs","createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z","items":3}"#;
        let c: Collection = serde_json::from_str(json).unwrap();
        assert!(c.object_ids.is_empty());
        assert!(c.description.is_empty());
    }
}
