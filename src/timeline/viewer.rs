//! 时间线查看器：快捷键映射与全屏 / 退出处理
//!
//! ←/→ 上一个 / 下一个，空格 播放 / 暂停，Home/End 首 / 末，F 切换全屏，
//! Esc 在全屏时关闭全屏，否则退出查看器。

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::remote::ExploredObject;
use crate::timeline::player::{PlaybackState, PlayerHandle, TimelinePlayer};
use crate::timeline::TimelineError;

/// 查看器能识别的按键命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Previous,
    Next,
    TogglePlay,
    First,
    Last,
    ToggleFullscreen,
    Escape,
}

impl KeyCommand {
    /// 无法识别的按键返回 None（交给外层处理）
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
            return None;
        }
        match key.code {
            KeyCode::Left => Some(KeyCommand::Previous),
            KeyCode::Right => Some(KeyCommand::Next),
            KeyCode::Char(' ') => Some(KeyCommand::TogglePlay),
            KeyCode::Home => Some(KeyCommand::First),
            KeyCode::End => Some(KeyCommand::Last),
            KeyCode::Char('f') | KeyCode::Char('F') => Some(KeyCommand::ToggleFullscreen),
            KeyCode::Esc => Some(KeyCommand::Escape),
            _ => None,
        }
    }
}

/// 处理一个命令后查看器的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerAction {
    Continue,
    Exit,
}

/// 单个对象的时间线查看器
pub struct TimelineViewer {
    object: ExploredObject,
    player: PlayerHandle,
    fullscreen: bool,
}

impl TimelineViewer {
    pub fn new(object: ExploredObject, player: PlayerHandle) -> Self {
        Self {
            object,
            player,
            fullscreen: false,
        }
    }

    /// 为对象新建播放器并打开
    pub fn open(object: ExploredObject, tick: std::time::Duration) -> Result<Self, TimelineError> {
        let player = TimelinePlayer::new(object.points().to_vec())?;
        Ok(Self::new(object, PlayerHandle::new(player, tick)))
    }

    pub fn object(&self) -> &ExploredObject {
        &self.object
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.player
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn state(&self) -> PlaybackState {
        self.player.state()
    }

    /// 切换到另一个对象：播放器回到 0 并 Idle
    pub fn show(&mut self, object: ExploredObject) -> Result<PlaybackState, TimelineError> {
        let state = self.player.replace_sequence(object.points().to_vec())?;
        self.object = object;
        Ok(state)
    }

    pub fn handle(&mut self, command: KeyCommand) -> ViewerAction {
        match command {
            KeyCommand::Previous => {
                self.player.previous();
            }
            KeyCommand::Next => {
                self.player.next();
            }
            KeyCommand::TogglePlay => {
                self.player.toggle();
            }
            KeyCommand::First => {
                self.player.first();
            }
            KeyCommand::Last => {
                self.player.last();
            }
            KeyCommand::ToggleFullscreen => self.fullscreen = !self.fullscreen,
            KeyCommand::Escape if self.fullscreen => self.fullscreen = false,
            KeyCommand::Escape => {
                self.player.stop();
                return ViewerAction::Exit;
            }
        }
        ViewerAction::Continue
    }

    /// 单行状态描述
    pub fn status_line(&self) -> String {
        let state = self.player.state();
        let point = self.player.current_point();
        format!(
            "{} | {} {} | Point {} of {} | {}%{}{}",
            self.object.name,
            point.year,
            point.period,
            state.index + 1,
            state.len,
            state.progress,
            if state.phase == crate::timeline::PlayerPhase::Playing {
                " | playing"
            } else {
                ""
            },
            if self.fullscreen { " | fullscreen" } else { "" },
        )
    }
}
