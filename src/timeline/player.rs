//! 时间线播放器
//!
//! TimelinePlayer 是纯状态机：每个操作返回一个 Effect，告诉驱动方是否布置 / 撤销自动播放定时。
//! 定时令牌随每次状态变化递增，过期的 tick 直接忽略。
//! PlayerHandle 把状态机与 TimerSlot 接起来，并通过 watch 通道广播每次变化。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::core::TimerSlot;
use crate::remote::TimelinePoint;
use crate::timeline::TimelineError;

/// 自动播放间隔默认值
pub const DEFAULT_TICK: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayerPhase {
    Idle,
    Playing,
}

/// 状态机要求驱动方执行的副作用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// 一个间隔后以该令牌调用 on_tick
    ArmTick(u64),
    CancelTick,
    None,
}

/// 对外可见的播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub index: usize,
    pub len: usize,
    pub phase: PlayerPhase,
    pub progress: u32,
}

#[derive(Debug, Clone)]
pub struct TimelinePlayer {
    points: Vec<TimelinePoint>,
    index: usize,
    phase: PlayerPhase,
    tick_token: u64,
}

impl TimelinePlayer {
    /// 初始状态：Idle，位于 0
    pub fn new(points: Vec<TimelinePoint>) -> Result<Self, TimelineError> {
        if points.is_empty() {
            return Err(TimelineError::Empty);
        }
        Ok(Self {
            points,
            index: 0,
            phase: PlayerPhase::Idle,
            tick_token: 0,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn phase(&self) -> PlayerPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == PlayerPhase::Playing
    }

    fn last(&self) -> usize {
        self.points.len() - 1
    }

    pub fn points(&self) -> &[TimelinePoint] {
        &self.points
    }

    pub fn current_point(&self) -> &TimelinePoint {
        &self.points[self.index]
    }

    /// round(100 * (index + 1) / n)
    pub fn progress_percentage(&self) -> u32 {
        let n = self.points.len() as f64;
        ((self.index + 1) as f64 * 100.0 / n).round() as u32
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            index: self.index,
            len: self.points.len(),
            phase: self.phase,
            progress: self.progress_percentage(),
        }
    }

    fn arm(&mut self) -> Effect {
        self.tick_token += 1;
        Effect::ArmTick(self.tick_token)
    }

    fn stop(&mut self) -> Effect {
        self.tick_token += 1;
        let was_playing = self.is_playing();
        self.phase = PlayerPhase::Idle;
        if was_playing {
            Effect::CancelTick
        } else {
            Effect::None
        }
    }

    /// 播放 / 暂停；在末尾开始播放时先回到开头
    pub fn toggle(&mut self) -> Effect {
        match self.phase {
            PlayerPhase::Playing => self.stop(),
            PlayerPhase::Idle => {
                if self.index == self.last() {
                    self.index = 0;
                }
                self.phase = PlayerPhase::Playing;
                self.arm()
            }
        }
    }

    /// 定时到期；到末尾时不再前进，转为 Idle
    pub fn on_tick(&mut self, token: u64) -> Effect {
        if !self.is_playing() || token != self.tick_token {
            return Effect::None;
        }
        if self.index >= self.last() {
            self.phase = PlayerPhase::Idle;
            self.tick_token += 1;
            return Effect::None;
        }
        self.index += 1;
        self.arm()
    }

    /// 手动导航：夹紧到合法范围并强制 Idle
    pub fn select_index(&mut self, target: usize) -> Effect {
        self.index = target.min(self.last());
        self.stop()
    }

    pub fn previous(&mut self) -> Effect {
        self.select_index(self.index.saturating_sub(1))
    }

    pub fn next(&mut self) -> Effect {
        self.select_index(self.index.saturating_add(1))
    }

    pub fn first(&mut self) -> Effect {
        self.select_index(0)
    }

    pub fn last_point(&mut self) -> Effect {
        let last = self.last();
        self.select_index(last)
    }

    /// 滑块拖动（值为索引刻度，四舍五入）
    pub fn drag_to(&mut self, value: f64) -> Effect {
        let target = if value.is_finite() && value > 0.0 {
            value.round() as usize
        } else {
            0
        };
        self.select_index(target)
    }

    /// 跳到 position 最接近 p 的节点（并列时取靠前的）
    pub fn seek_position(&mut self, p: f64) -> Effect {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, point) in self.points.iter().enumerate() {
            let dist = (point.position - p).abs();
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        self.select_index(best)
    }

    /// 更换序列（选中新对象）：回到 0 并 Idle
    pub fn replace_sequence(&mut self, points: Vec<TimelinePoint>) -> Result<Effect, TimelineError> {
        if points.is_empty() {
            return Err(TimelineError::Empty);
        }
        self.points = points;
        self.index = 0;
        Ok(self.stop())
    }
}

/// 自动播放驱动：状态机 + 单槽定时器 + 变化广播
#[derive(Clone)]
pub struct PlayerHandle {
    player: Arc<Mutex<TimelinePlayer>>,
    timer: TimerSlot,
    interval: Duration,
    changes: Arc<watch::Sender<PlaybackState>>,
}

impl PlayerHandle {
    pub fn new(player: TimelinePlayer, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(player.state());
        Self {
            player: Arc::new(Mutex::new(player)),
            timer: TimerSlot::new(),
            interval,
            changes: Arc::new(tx),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state()
    }

    pub fn current_point(&self) -> TimelinePoint {
        self.lock().current_point().clone()
    }

    /// 订阅状态变化（自动播放的 tick 也会推送）
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.changes.subscribe()
    }

    pub fn is_tick_armed(&self) -> bool {
        self.timer.is_armed()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimelinePlayer> {
        self.player.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run<F: FnOnce(&mut TimelinePlayer) -> Effect>(&self, op: F) -> PlaybackState {
        let (effect, state) = {
            let mut player = self.lock();
            let effect = op(&mut player);
            (effect, player.state())
        };
        self.apply(effect);
        self.changes.send_replace(state);
        state
    }

    fn apply(&self, effect: Effect) {
        match effect {
            Effect::ArmTick(token) => {
                let handle = self.clone();
                self.timer.arm(self.interval, move || {
                    handle.run(|p| p.on_tick(token));
                });
            }
            Effect::CancelTick => self.timer.cancel(),
            Effect::None => {}
        }
    }

    pub fn toggle(&self) -> PlaybackState {
        self.run(TimelinePlayer::toggle)
    }

    pub fn previous(&self) -> PlaybackState {
        self.run(TimelinePlayer::previous)
    }

    pub fn next(&self) -> PlaybackState {
        self.run(TimelinePlayer::next)
    }

    pub fn first(&self) -> PlaybackState {
        self.run(TimelinePlayer::first)
    }

    pub fn last(&self) -> PlaybackState {
        self.run(TimelinePlayer::last_point)
    }

    pub fn select_index(&self, index: usize) -> PlaybackState {
        self.run(|p| p.select_index(index))
    }

    pub fn drag_to(&self, value: f64) -> PlaybackState {
        self.run(|p| p.drag_to(value))
    }

    pub fn seek_position(&self, position: f64) -> PlaybackState {
        self.run(|p| p.seek_position(position))
    }

    pub fn replace_sequence(&self, points: Vec<TimelinePoint>) -> Result<PlaybackState, TimelineError> {
        let (effect, state) = {
            let mut player = self.lock();
            let effect = player.replace_sequence(points)?;
            (effect, player.state())
        };
        // 旧序列的定时一律撤销
        self.timer.cancel();
        self.apply(effect);
        self.changes.send_replace(state);
        Ok(state)
    }

    /// 拆除：停止自动播放
    pub fn stop(&self) {
        self.timer.cancel();
        let mut player = self.lock();
        if player.is_playing() {
            player.toggle();
        }
    }
}
