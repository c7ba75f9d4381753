//! 图片获取抽象：一次尝试 = 取一个 URL 并确认它确实是图片

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("Not an image: {0}")]
    NotAnImage(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// 一张已获取的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub url: String,
    pub content_type: String,
    pub bytes: usize,
}

/// 图片获取器（单次尝试，不含重试与超时，由级联加载器负责）
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<LoadedImage, ImageError>;
}

/// 基于 reqwest 的获取器
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    /// connect_timeout 只限制建连；整次尝试的时限由调用方控制
    pub fn new(connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<LoadedImage, ImageError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ImageError::Status(resp.status().as_u16()));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(ImageError::NotAnImage(content_type));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| ImageError::Transport(e.to_string()))?;
        Ok(LoadedImage {
            url: url.to_string(),
            content_type,
            bytes: body.len(),
        })
    }
}
