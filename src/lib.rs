//! Chronoscope - 物品演化时间线探索客户端核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与结果类型、代际令牌 / 定时器、身份与状态投影、探索会话
//! - **remote**: 远端对象存储的数据模型、抽象与实现（HTTP / 内存）
//! - **sync**: 可达性探测、恢复重试门、对象与集合的本地镜像
//! - **media**: 图片 URL 变体、获取器与级联加载器
//! - **timeline**: 时间线校验、播放状态机、查看器快捷键、内置示例
//! - **ui**: crossterm 终端交互循环

pub mod config;
pub mod core;
pub mod media;
pub mod remote;
pub mod sync;
pub mod timeline;
pub mod ui;

pub use crate::core::{ExplorerSession, Identity, SessionStatus, StoreError};
