//! 内置示例时间线与名称到分类的映射

use serde::Deserialize;

use crate::remote::{ObjectDraft, TimelinePoint};
use crate::timeline::validate_timeline;

const BUILTIN: &str = include_str!("catalog.json");

/// 未登记名称的分类
pub const DEFAULT_CATEGORY: &str = "General";

/// 对象名称 -> 分类
pub fn category_for(name: &str) -> &'static str {
    match name {
        "Smartphone Evolution"
        | "Photography Evolution"
        | "Lighting Evolution"
        | "Currency Evolution"
        | "Communication Evolution"
        | "Timekeeping Evolution"
        | "Energy Evolution" => "Technology",
        "Automobile Evolution" | "Flight Evolution" | "Public Transportation Evolution" => {
            "Transportation"
        }
        "Television Evolution" | "Music Evolution" | "Gaming Evolution" => "Entertainment",
        "Architectural Evolution" | "Writing Evolution" | "Kitchen Evolution" => "Culture",
        "Clothing Evolution" | "Footwear Evolution" => "Fashion",
        _ => DEFAULT_CATEGORY,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    name: String,
    category: String,
    timeline_points: Vec<TimelinePoint>,
}

/// 示例时间线目录
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<Entry>,
}

impl Catalog {
    /// 加载内置目录；不合法的条目跳过并记日志
    pub fn builtin() -> Result<Self, serde_json::Error> {
        let entries: Vec<Entry> = serde_json::from_str(BUILTIN)?;
        let entries = entries
            .into_iter()
            .filter(|e| match validate_timeline(&e.timeline_points) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(name = %e.name, "Skipping catalog entry: {}", err);
                    false
                }
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按名称取待保存对象（大小写不敏感）
    pub fn draft(&self, name: &str) -> Option<ObjectDraft> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| ObjectDraft::new(e.name.clone(), e.timeline_points.clone(), e.category.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.len(), 3);
        let draft = catalog.draft("smartphone evolution").unwrap();
        assert_eq!(draft.name, "Smartphone Evolution");
        assert_eq!(draft.category, "Technology");
        assert_eq!(draft.timeline.first().unwrap().position, 0.0);
        assert_eq!(draft.timeline.last().unwrap().position, 100.0);
        assert!(catalog.draft("Toaster Evolution").is_none());
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(category_for("Automobile Evolution"), "Transportation");
        assert_eq!(category_for("Music Evolution"), "Entertainment");
        assert_eq!(category_for("Footwear Evolution"), "Fashion");
        assert_eq!(category_for("Something Else"), "General");
    }

    #[test]
    fn test_catalog_categories_match_mapping() {
        let catalog = Catalog::builtin().unwrap();
        for name in catalog.names() {
            let draft = catalog.draft(name).unwrap();
            assert_eq!(draft.category, category_for(name));
        }
    }
}
