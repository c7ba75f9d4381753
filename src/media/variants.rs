//! 图片 URL 变体：级联降级阶梯、优化参数、分类兜底图

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;

use crate::remote::ExploredObject;

const UNSPLASH_HOST: &str = "images.unsplash.com";

static PHOTO_ID_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn unsplash_photo_id(url: &str) -> Option<&str> {
    if !url.contains(UNSPLASH_HOST) {
        return None;
    }
    let re = PHOTO_ID_RE
        .get_or_init(|| Regex::new(r"photo-([a-zA-Z0-9_-]+)").ok())
        .as_ref()?;
    re.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// 第 attempt 次尝试使用的 URL；None 表示阶梯已到底
///
/// - 第 0 次：原始地址
/// - Unsplash：1 -> `?w=400`，2 及以后 -> 不带参数
/// - 其他地址：去掉 query（没有 query 时无变体）
pub fn cascade_variant(source: &str, attempt: u32) -> Option<String> {
    if attempt == 0 {
        return Some(source.to_string());
    }
    if let Some(id) = unsplash_photo_id(source) {
        let base = format!("https://{}/photo-{}", UNSPLASH_HOST, id);
        return Some(if attempt == 1 {
            format!("{}?w=400", base)
        } else {
            base
        });
    }
    let mut url = Url::parse(source).ok()?;
    url.query()?;
    url.set_query(None);
    Some(url.to_string())
}

/// 图片优化参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProfile {
    pub width: u32,
    pub quality: u32,
}

impl ImageProfile {
    /// 默认：列表 / 时间线图片
    pub const FAST: ImageProfile = ImageProfile { width: 400, quality: 75 };
    pub const THUMBNAIL: ImageProfile = ImageProfile { width: 200, quality: 70 };
    /// 大图查看
    pub const HIGH: ImageProfile = ImageProfile { width: 800, quality: 85 };
}

/// 用 profile 重写 query（w / q / auto / fit）；无法解析的地址原样返回
pub fn optimize_image_url(url: &str, profile: ImageProfile) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed
                .query_pairs_mut()
                .clear()
                .append_pair("w", &profile.width.to_string())
                .append_pair("q", &profile.quality.to_string())
                .append_pair("auto", "auto")
                .append_pair("fit", "crop");
            parsed.to_string()
        }
        Err(e) => {
            tracing::debug!(url = %url, "Failed to optimize image url: {}", e);
            url.to_string()
        }
    }
}

const FALLBACK_QUERY: &str = "?w=400&q=75&auto=format&fit=crop";

/// 分类兜底图（大小写不敏感，未知分类用 technology）
pub fn fallback_image(category: &str) -> String {
    let photo = match category.to_lowercase().as_str() {
        "transportation" => "1642099414765-5ed38e3b3437",
        "entertainment" => "1705951439619-28c0fbbd0ab0",
        "culture" => "1596539363080-b678f4c02d6e",
        "fashion" => "1577655197898-da78ff8bed68",
        _ => "1598965402089-897ce52e8355",
    };
    format!("https://{}/photo-{}{}", UNSPLASH_HOST, photo, FALLBACK_QUERY)
}

/// 对象封面：时间线中点的图片，没有则用分类兜底图
pub fn cover_image(object: &ExploredObject) -> String {
    let points = object.points();
    match points.get(points.len() / 2).map(|p| p.image.as_str()) {
        Some(image) if !image.is_empty() => optimize_image_url(image, ImageProfile::FAST),
        _ => fallback_image(&object.category),
    }
}
