//! 交互主循环
//!
//! 进入原始模式，轮询键盘事件并路由到会话 / 查看器；状态每变化一次输出一行，
//! 当前时间线节点的图片在后台走级联加载，结果也以一行输出。

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::{mpsc, watch};

use crate::config::AppConfig;
use crate::core::{ExplorerSession, SaveOutcome};
use crate::media::{
    cover_image, CascadeOptions, CascadeOutcome, HttpImageFetcher, ImageCascadeLoader, Rendered,
};
use crate::remote::{ExploredObject, ObjectDraft};
use crate::timeline::{PlaybackState, TimelineViewer, ViewerAction};
use crate::ui::event::{AppEvent, EventHandler};

/// 逐行输出，重复的状态行只输出一次
struct Screen {
    out: Stdout,
    last_status: String,
}

impl Screen {
    fn new() -> Self {
        Self {
            out: io::stdout(),
            last_status: String::new(),
        }
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        // 原始模式下需要显式回车
        write!(self.out, "{}\r\n", text)?;
        self.out.flush()
    }

    fn status(&mut self, text: String) -> io::Result<()> {
        if text != self.last_status {
            self.line(&text)?;
            self.last_status = text;
        }
        Ok(())
    }
}

/// 未能保存的对象仍可浏览
fn preview(draft: ObjectDraft, owner: &str) -> ExploredObject {
    ExploredObject {
        id: "unsaved".to_string(),
        name: draft.name,
        category: draft.category,
        timeline_data: draft.timeline.into(),
        explored_at: Utc::now(),
        user_id: owner.to_string(),
        user_image: None,
    }
}

fn status_text(session: &ExplorerSession, viewer: Option<&TimelineViewer>) -> String {
    let status = session.status();
    let banner = status.banner().unwrap_or_else(|| "Online".to_string());
    let retry = if status.can_retry() { " | r: retry" } else { "" };
    match viewer {
        Some(v) => format!("[{}{}] {}", banner, retry, v.status_line()),
        None => format!(
            "[{}{}] {} objects, {} collections",
            banner, retry, status.objects, status.collections
        ),
    }
}

fn spawn_image_load(loader: &Arc<ImageCascadeLoader>, url: String, tx: &mpsc::UnboundedSender<String>) {
    let loader = Arc::clone(loader);
    let tx = tx.clone();
    tokio::spawn(async move {
        let text = match loader.load(&url).await {
            CascadeOutcome::Loaded { image, retry_count } => format!(
                "image: {} ({} bytes, {} retries)",
                image.url, image.bytes, retry_count
            ),
            CascadeOutcome::Failed { attempts } => match loader.rendered() {
                Rendered::Hidden => return,
                _ => format!("image: placeholder after {} attempts", attempts),
            },
            CascadeOutcome::Superseded => return,
        };
        let _ = tx.send(text);
    });
}

/// 运行交互循环；退出时恢复终端并拆除会话
pub async fn run_app(mut session: ExplorerSession, config: &AppConfig) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let result = event_loop(&mut session, config).await;
    disable_raw_mode()?;
    session.shutdown();
    result
}

async fn event_loop(session: &mut ExplorerSession, config: &AppConfig) -> anyhow::Result<()> {
    let events = EventHandler::default();
    let tick = Duration::from_millis(config.player.tick_ms);
    let loader = Arc::new(ImageCascadeLoader::new(
        Arc::new(HttpImageFetcher::default()),
        CascadeOptions::from(&config.images),
    ));
    let (image_tx, mut image_rx) = mpsc::unbounded_channel::<String>();
    let mut screen = Screen::new();
    let mut viewer: Option<TimelineViewer> = None;
    let mut player_rx: Option<watch::Receiver<PlaybackState>> = None;

    let names: Vec<String> = session.catalog().names().iter().map(|s| s.to_string()).collect();
    for (i, name) in names.iter().enumerate() {
        screen.line(&format!("{}: explore {}", i + 1, name))?;
    }
    screen.line("←/→ move, space play, Home/End, f fullscreen, Esc close, r retry, x reset, s sign out, q quit")?;

    let outcome = session.load().await;
    tracing::debug!(?outcome, "Initial load");
    for object in session.objects().iter().take(5) {
        screen.line(&format!("saved: {} [{}] {}", object.name, object.category, cover_image(object)))?;
    }

    loop {
        if let Some(event) = events.poll()? {
            match event {
                AppEvent::Quit => break,
                AppEvent::Retry => {
                    let outcome = session.retry_connection().await;
                    screen.line(&format!("retry: {:?}", outcome))?;
                }
                AppEvent::Reset => session.reset(),
                AppEvent::SignOut => {
                    if let Some(v) = viewer.take() {
                        v.player().stop();
                    }
                    player_rx = None;
                    loader.cancel();
                    session.sign_out();
                }
                AppEvent::Explore(index) => {
                    let Some(name) = names.get(index) else {
                        continue;
                    };
                    let object = match session.explore(name, None).await {
                        Ok(SaveOutcome::Saved(object)) => object,
                        Ok(other) => {
                            screen.line(&format!("not saved: {:?}", other))?;
                            match session.catalog().draft(name) {
                                Some(draft) => preview(draft, session.identity().owner()),
                                None => continue,
                            }
                        }
                        Err(e) => {
                            screen.line(&format!("explore failed: {}", e))?;
                            continue;
                        }
                    };
                    match viewer.as_mut() {
                        Some(v) => {
                            v.show(object)?;
                        }
                        None => viewer = Some(TimelineViewer::open(object, tick)?),
                    }
                    if let Some(v) = viewer.as_ref() {
                        let mut rx = v.player().subscribe();
                        rx.mark_changed();
                        player_rx = Some(rx);
                    }
                }
                AppEvent::Viewer(command) => {
                    if let Some(v) = viewer.as_mut() {
                        if v.handle(command) == ViewerAction::Exit {
                            viewer = None;
                            player_rx = None;
                            loader.cancel();
                        }
                    }
                }
            }
        }

        if let (Some(v), Some(rx)) = (viewer.as_ref(), player_rx.as_mut()) {
            if rx.has_changed().unwrap_or(false) {
                let _ = rx.borrow_and_update();
                spawn_image_load(&loader, v.player().current_point().image, &image_tx);
            }
        }
        while let Ok(text) = image_rx.try_recv() {
            screen.line(&text)?;
        }
        screen.status(status_text(session, viewer.as_ref()))?;

        tokio::task::yield_now().await;
    }
    Ok(())
}
