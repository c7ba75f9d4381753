//! 终端交互层：crossterm 原始模式下的按键循环（app）与事件映射（event）

pub mod app;
pub mod event;

pub use app::run_app;
pub use event::{map_key, AppEvent, EventHandler};
