//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CHRONOSCOPE__*` 覆盖（双下划线表示嵌套，如 `CHRONOSCOPE__REMOTE__BASE_URL=https://...`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::Identity;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub images: ImagesSection,
    #[serde(default)]
    pub player: PlayerSection,
    #[serde(default)]
    pub sync: SyncSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [remote] 段：远端地址、匿名 key 与当前身份凭证
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RemoteSection {
    /// 未设置时使用内置的内存演示后端
    pub base_url: Option<String>,
    pub anon_key: Option<String>,
    /// access_token 与 user_id 同时设置时以登录身份运行，否则为访客
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub timeouts: RemoteTimeoutsSection,
}

/// [remote.timeouts] 段（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTimeoutsSection {
    #[serde(default = "default_health_secs")]
    pub health_secs: u64,
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,
    #[serde(default = "default_write_secs")]
    pub write_secs: u64,
    #[serde(default = "default_upload_secs")]
    pub upload_secs: u64,
}

fn default_health_secs() -> u64 {
    10
}

fn default_read_secs() -> u64 {
    10
}

fn default_write_secs() -> u64 {
    15
}

fn default_upload_secs() -> u64 {
    30
}

impl Default for RemoteTimeoutsSection {
    fn default() -> Self {
        Self {
            health_secs: default_health_secs(),
            read_secs: default_read_secs(),
            write_secs: default_write_secs(),
            upload_secs: default_upload_secs(),
        }
    }
}

impl RemoteSection {
    /// access_token 与 user_id 都有值时为登录身份，否则为访客
    pub fn identity(&self) -> Identity {
        match (self.user_id.as_deref(), self.access_token.as_deref()) {
            (Some(user_id), Some(token)) if !user_id.is_empty() && !token.is_empty() => {
                Identity::authenticated(user_id, token)
            }
            _ => Identity::Guest,
        }
    }
}

impl RemoteTimeoutsSection {
    pub fn health(&self) -> Duration {
        Duration::from_secs(self.health_secs)
    }
}

/// [images] 段：单次尝试超时、额外重试次数、失败时是否隐藏
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesSection {
    #[serde(default = "default_image_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_image_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub hide_on_error: bool,
}

fn default_image_timeout_ms() -> u64 {
    5000
}

fn default_image_max_retries() -> u32 {
    2
}

impl Default for ImagesSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_image_timeout_ms(),
            max_retries: default_image_max_retries(),
            hide_on_error: false,
        }
    }
}

/// [player] 段：自动播放间隔（毫秒）
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSection {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_tick_ms() -> u64 {
    2500
}

impl Default for PlayerSection {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

/// [sync] 段：访客环形缓冲容量、恢复重试上限
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_guest_capacity")]
    pub guest_capacity: usize,
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
}

fn default_guest_capacity() -> usize {
    10
}

fn default_max_recovery_attempts() -> u32 {
    3
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            guest_capacity: default_guest_capacity(),
            max_recovery_attempts: default_max_recovery_attempts(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CHRONOSCOPE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CHRONOSCOPE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CHRONOSCOPE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert!(cfg.remote.base_url.is_none());
        assert_eq!(cfg.remote.timeouts.health_secs, 10);
        assert_eq!(cfg.images.timeout_ms, 5000);
        assert_eq!(cfg.images.max_retries, 2);
        assert_eq!(cfg.player.tick_ms, 2500);
        assert_eq!(cfg.sync.guest_capacity, 10);
        assert_eq!(cfg.sync.max_recovery_attempts, 3);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[remote]
base_url = "https://example.test/api"

[remote.timeouts]
health_secs = 3

[images]
max_retries = 4
hide_on_error = true
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.remote.base_url.as_deref(), Some("https://example.test/api"));
        assert_eq!(cfg.remote.timeouts.health_secs, 3);
        assert_eq!(cfg.remote.timeouts.write_secs, 15);
        assert_eq!(cfg.images.max_retries, 4);
        assert!(cfg.images.hide_on_error);
        assert_eq!(cfg.player.tick_ms, 2500);
        assert!(cfg.remote.identity().is_guest());
    }

    #[test]
    fn test_identity_requires_token_and_user() {
        let mut remote = RemoteSection {
            access_token: Some("tok".into()),
            ..RemoteSection::default()
        };
        assert!(remote.identity().is_guest());
        remote.user_id = Some("u1".into());
        assert_eq!(remote.identity(), Identity::authenticated("u1", "tok"));
    }
}
