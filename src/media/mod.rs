//! 图片：URL 变体与优化、获取器、级联加载器

pub mod cascade;
pub mod fetcher;
pub mod variants;

pub use cascade::{
    AttemptState, CascadeOptions, CascadeOutcome, CascadeSnapshot, ImageCascadeLoader,
    ImageLoadAttempt, Rendered,
};
pub use fetcher::{HttpImageFetcher, ImageError, ImageFetcher, LoadedImage};
pub use variants::{cascade_variant, cover_image, fallback_image, optimize_image_url, ImageProfile};
