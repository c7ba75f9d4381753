//! Chronoscope - 物品演化时间线探索客户端
//!
//! 入口：初始化日志与配置，选择远端对象存储（HTTP 或内置内存演示），加载会话并运行交互循环。

use std::sync::Arc;

use anyhow::Context;
use chronoscope::{
    config::load_config,
    core::{ExplorerSession, SessionOptions},
    remote::{HttpObjectStore, InMemoryObjectStore, ObjectStore},
    timeline::Catalog,
    ui::run_app,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖；写到 stderr，不与状态行混在一起
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(None).context("Failed to load config")?;

    let store: Arc<dyn ObjectStore> = match HttpObjectStore::from_config(&config.remote) {
        Some(http) => {
            tracing::info!(base_url = ?config.remote.base_url, "Using remote object store");
            Arc::new(http)
        }
        None => {
            tracing::info!("No remote configured, using in-memory demo store");
            let memory = InMemoryObjectStore::new();
            if let (Some(user_id), Some(token)) = (&config.remote.user_id, &config.remote.access_token) {
                memory.register_user(token, user_id, user_id);
            }
            Arc::new(memory)
        }
    };

    let catalog = Catalog::builtin().context("Failed to load built-in timelines")?;
    let session = ExplorerSession::new(
        config.remote.identity(),
        store,
        SessionOptions::from(&config),
        catalog,
    );

    run_app(session, &config).await.context("App run failed")?;

    Ok(())
}
