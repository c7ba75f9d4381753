//! 图片级联加载
//!
//! 每次尝试受单独超时约束，超时与真实失败一样处理；失败后沿 cascade_variant 阶梯降级，
//! 直到无更多变体或额外重试用尽（默认 2 次）进入终态 Failed。
//! 更换 source 会取消进行中的尝试、重置计数并开始新一轮；旧一轮的结果凭代际令牌丢弃。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ImagesSection;
use crate::core::Generation;
use crate::media::fetcher::{ImageFetcher, LoadedImage};
use crate::media::variants::cascade_variant;

/// 级联参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOptions {
    /// 单次尝试时限
    pub timeout: Duration,
    /// 首次之外最多再试几次
    pub max_retries: u32,
    /// 失败时不渲染任何东西（否则渲染占位图）
    pub hide_on_error: bool,
}

impl Default for CascadeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            hide_on_error: false,
        }
    }
}

impl From<&ImagesSection> for CascadeOptions {
    fn from(section: &ImagesSection) -> Self {
        Self {
            timeout: Duration::from_millis(section.timeout_ms),
            max_retries: section.max_retries,
            hide_on_error: section.hide_on_error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Loaded,
    Failed,
}

/// 当前（或最近一次）尝试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLoadAttempt {
    pub url: String,
    pub variant_index: u32,
    pub state: AttemptState,
    pub started_at: Instant,
}

/// 加载器状态快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeSnapshot {
    pub source: Option<String>,
    pub retry_count: u32,
    pub attempt: Option<ImageLoadAttempt>,
}

/// 渲染层看到的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Loading,
    Image(String),
    Placeholder,
    Hidden,
}

/// 一次 load 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    Loaded { image: LoadedImage, retry_count: u32 },
    Failed { attempts: u32 },
    /// 被新的 source 或 cancel 取代
    Superseded,
}

/// 单个图片位的级联加载器
pub struct ImageCascadeLoader {
    fetcher: Arc<dyn ImageFetcher>,
    options: CascadeOptions,
    generation: Generation,
    slot: Mutex<CascadeSnapshot>,
    cancel: Mutex<CancellationToken>,
}

impl ImageCascadeLoader {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, options: CascadeOptions) -> Self {
        Self {
            fetcher,
            options,
            generation: Generation::new(),
            slot: Mutex::new(CascadeSnapshot::default()),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn options(&self) -> CascadeOptions {
        self.options
    }

    pub fn snapshot(&self) -> CascadeSnapshot {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn rendered(&self) -> Rendered {
        let snap = self.snapshot();
        match snap.attempt {
            None if snap.source.is_none() => Rendered::Hidden,
            None => Rendered::Loading,
            Some(a) => match a.state {
                AttemptState::Pending => Rendered::Loading,
                AttemptState::Loaded => Rendered::Image(a.url),
                AttemptState::Failed if self.options.hide_on_error => Rendered::Hidden,
                AttemptState::Failed => Rendered::Placeholder,
            },
        }
    }

    /// 取消进行中的级联（结果不会再落地）
    pub fn cancel(&self) {
        self.generation.advance();
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// 只在本代仍为当前代时修改槽位
    fn update<F: FnOnce(&mut CascadeSnapshot)>(&self, generation: u64, f: F) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.generation.is_current(generation) {
            return false;
        }
        f(&mut slot);
        true
    }

    /// 开始加载 source；会取代仍在进行的上一轮
    pub async fn load(&self, source: &str) -> CascadeOutcome {
        let token = CancellationToken::new();
        let generation = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            cancel.cancel();
            *cancel = token.clone();
            *slot = CascadeSnapshot {
                source: Some(source.to_string()),
                retry_count: 0,
                attempt: None,
            };
            self.generation.advance()
        };

        let mut retry_count = 0u32;
        let mut url = source.to_string();
        loop {
            let started = self.update(generation, |slot| {
                slot.retry_count = retry_count;
                slot.attempt = Some(ImageLoadAttempt {
                    url: url.clone(),
                    variant_index: retry_count,
                    state: AttemptState::Pending,
                    started_at: Instant::now(),
                });
            });
            if !started {
                return CascadeOutcome::Superseded;
            }

            let result = tokio::select! {
                _ = token.cancelled() => return CascadeOutcome::Superseded,
                r = tokio::time::timeout(self.options.timeout, self.fetcher.fetch(&url)) => r,
            };

            let failure = match result {
                Ok(Ok(image)) => {
                    let landed = self.update(generation, |slot| {
                        if let Some(a) = slot.attempt.as_mut() {
                            a.state = AttemptState::Loaded;
                        }
                    });
                    if !landed {
                        return CascadeOutcome::Superseded;
                    }
                    tracing::debug!(url = %url, retry_count, "Image loaded");
                    return CascadeOutcome::Loaded { image, retry_count };
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}ms", self.options.timeout.as_millis()),
            };
            tracing::debug!(url = %url, attempt = retry_count, "Image attempt failed: {}", failure);

            let next = if retry_count < self.options.max_retries {
                cascade_variant(source, retry_count + 1).filter(|next| *next != url)
            } else {
                None
            };

            match next {
                Some(next) => {
                    retry_count += 1;
                    url = next;
                }
                None => {
                    let landed = self.update(generation, |slot| {
                        if let Some(a) = slot.attempt.as_mut() {
                            a.state = AttemptState::Failed;
                        }
                    });
                    if !landed {
                        return CascadeOutcome::Superseded;
                    }
                    tracing::warn!(source = %source, attempts = retry_count + 1, "Image failed to load");
                    return CascadeOutcome::Failed {
                        attempts: retry_count + 1,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    use crate::media::fetcher::ImageError;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Ok,
        Fail,
        Hang,
    }

    /// 按脚本逐次返回，脚本用完后一律失败
    #[derive(Default)]
    struct ScriptedFetcher {
        script: Mutex<VecDeque<Step>>,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(steps: &[Step]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(steps.iter().copied().collect()),
                urls: Mutex::new(Vec::new()),
            })
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<LoadedImage, ImageError> {
            self.urls.lock().unwrap().push(url.to_string());
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Fail);
            match step {
                Step::Ok => Ok(LoadedImage {
                    url: url.to_string(),
                    content_type: "image/jpeg".into(),
                    bytes: 10,
                }),
                Step::Fail => Err(ImageError::Status(404)),
                Step::Hang => std::future::pending().await,
            }
        }
    }

    const SRC: &str = "https://images.unsplash.com/photo-1511707171634-5f897ff02aa9?w=1080&q=80";

    #[tokio::test]
    async fn test_third_variant_succeeds() {
        let fetcher = ScriptedFetcher::new(&[Step::Fail, Step::Fail, Step::Ok]);
        let loader = ImageCascadeLoader::new(fetcher.clone(), CascadeOptions::default());

        let outcome = loader.load(SRC).await;
        assert!(matches!(outcome, CascadeOutcome::Loaded { retry_count: 2, .. }));
        assert_eq!(
            fetcher.urls(),
            vec![
                SRC.to_string(),
                "https://images.unsplash.com/photo-1511707171634-5f897ff02aa9?w=400".to_string(),
                "https://images.unsplash.com/photo-1511707171634-5f897ff02aa9".to_string(),
            ]
        );
        assert_eq!(loader.snapshot().retry_count, 2);
        assert_eq!(
            loader.rendered(),
            Rendered::Image("https://images.unsplash.com/photo-1511707171634-5f897ff02aa9".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_bounded_by_timeout() {
        let fetcher = ScriptedFetcher::new(&[Step::Hang, Step::Hang, Step::Hang, Step::Hang]);
        let loader = ImageCascadeLoader::new(fetcher.clone(), CascadeOptions::default());

        let start = Instant::now();
        let outcome = loader.load(SRC).await;
        assert_eq!(outcome, CascadeOutcome::Failed { attempts: 3 });
        assert_eq!(fetcher.urls().len(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
        assert_eq!(loader.rendered(), Rendered::Placeholder);
    }

    #[tokio::test]
    async fn test_source_without_variants_fails_once() {
        let fetcher = ScriptedFetcher::new(&[]);
        let options = CascadeOptions {
            hide_on_error: true,
            ..CascadeOptions::default()
        };
        let loader = ImageCascadeLoader::new(fetcher.clone(), options);
        let outcome = loader.load("https://cdn.example.com/a.png").await;
        assert_eq!(outcome, CascadeOutcome::Failed { attempts: 1 });
        assert_eq!(loader.rendered(), Rendered::Hidden);
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let fetcher = ScriptedFetcher::new(&[Step::Fail, Step::Ok]);
        let options = CascadeOptions {
            max_retries: 0,
            ..CascadeOptions::default()
        };
        let loader = ImageCascadeLoader::new(fetcher.clone(), options);
        assert_eq!(loader.load(SRC).await, CascadeOutcome::Failed { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_source_supersedes_old_cascade() {
        let fetcher = ScriptedFetcher::new(&[Step::Hang, Step::Ok]);
        let loader = Arc::new(ImageCascadeLoader::new(fetcher.clone(), CascadeOptions::default()));

        let l = Arc::clone(&loader);
        let first = tokio::spawn(async move { l.load(SRC).await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = loader.load("https://cdn.example.com/b.png").await;
        assert!(matches!(second, CascadeOutcome::Loaded { retry_count: 0, .. }));
        assert_eq!(first.await.unwrap(), CascadeOutcome::Superseded);

        let snap = loader.snapshot();
        assert_eq!(snap.source.as_deref(), Some("https://cdn.example.com/b.png"));
        assert_eq!(snap.attempt.unwrap().state, AttemptState::Loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_result() {
        let fetcher = ScriptedFetcher::new(&[Step::Hang]);
        let loader = Arc::new(ImageCascadeLoader::new(fetcher, CascadeOptions::default()));
        let l = Arc::clone(&loader);
        let pending = tokio::spawn(async move { l.load(SRC).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        loader.cancel();
        assert_eq!(pending.await.unwrap(), CascadeOutcome::Superseded);
        assert_eq!(loader.rendered(), Rendered::Loading);
    }
}
