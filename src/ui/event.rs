//! 事件处理
//!
//! 轮询 crossterm 键盘事件：查看器快捷键转为 KeyCommand，其余会话级按键
//! （r 重试连接、x 重置会话、s 退出登录、1-9 探索目录中的对象、q / Ctrl+C 退出）转为 AppEvent。

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::timeline::KeyCommand;

/// 应用事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Viewer(KeyCommand),
    Explore(usize),
    Retry,
    Reset,
    SignOut,
    Quit,
}

pub struct EventHandler {
    poll_interval: std::time::Duration,
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new(std::time::Duration::from_millis(100))
    }
}

impl EventHandler {
    pub fn new(poll_interval: std::time::Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll(&self) -> anyhow::Result<Option<AppEvent>> {
        if event::poll(self.poll_interval)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(map_key(&key));
                }
            }
        }
        Ok(None)
    }
}

/// 按键 -> 应用事件；无关按键返回 None
pub fn map_key(key: &KeyEvent) -> Option<AppEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') => Some(AppEvent::Quit),
            _ => None,
        };
    }
    if let Some(command) = KeyCommand::from_key(key) {
        return Some(AppEvent::Viewer(command));
    }
    match key.code {
        KeyCode::Char('q') => Some(AppEvent::Quit),
        KeyCode::Char('r') => Some(AppEvent::Retry),
        KeyCode::Char('x') => Some(AppEvent::Reset),
        KeyCode::Char('s') => Some(AppEvent::SignOut),
        KeyCode::Char(c @ '1'..='9') => Some(AppEvent::Explore(c as usize - '1' as usize)),
        _ => None,
    }
}
