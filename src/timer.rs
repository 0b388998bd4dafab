//! Background ticker driving the countdown once per second.

use crate::app::{App, CompletionEvent};
use crate::models::TimerMode;
use crate::session::TimerState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Message sent from the timer thread to the main thread.
#[derive(Debug, Clone)]
pub enum TimerMessage {
    /// Timer state has changed, UI needs update.
    StateChanged { title: String },
    /// A timer completed.
    Completed(CompletionEvent),
}

/// Handle to the ticker thread. Stopping it joins the thread, so no tick
/// runs after `stop` returns.
pub struct Ticker {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawns a ticker that advances `app` every `interval`.
    pub fn spawn(app: Arc<Mutex<App>>, tx: Sender<TimerMessage>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("ticker".to_string())
            .spawn(move || run_timer_loop(app, tx, interval, flag))
            .ok();

        if handle.is_none() {
            log::error!("failed to spawn ticker thread; timer will not advance");
        }

        Self { shutdown, handle }
    }

    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Runs the timer loop until `shutdown` is set.
/// Sends messages to the main thread via the provided channel.
///
/// Each run is timed from the moment it was started, so the first tick
/// lands one full `interval` after `start` and a pause drops the pending one.
fn run_timer_loop(
    app: Arc<Mutex<App>>,
    tx: Sender<TimerMessage>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    let poll = (interval / 10).clamp(Duration::from_millis(1), Duration::from_millis(100));
    // (start of the run being timed, when its next tick is due)
    let mut armed: Option<(Instant, Instant)> = None;

    while !shutdown.load(Ordering::Acquire) {
        thread::sleep(poll);
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        let message = {
            let Ok(mut app) = app.lock() else {
                log::error!("app state lock poisoned; stopping ticker");
                break;
            };

            app.sync_day();

            if !app.timer.running {
                armed = None;
                continue;
            }

            let started = app
                .running_since()
                .or(armed.map(|(started, _)| started))
                .unwrap_or_else(Instant::now);
            let due = match armed {
                Some((run, due)) if run == started => due,
                _ => started + interval,
            };
            if Instant::now() < due {
                armed = Some((started, due));
                continue;
            }
            armed = Some((started, due + interval));

            let (changed, completion) = app.tick();

            if let Some(event) = completion {
                let _ = tx.send(TimerMessage::Completed(event));
            }

            if changed {
                let title = format_status_title(&app.timer);
                Some(TimerMessage::StateChanged { title })
            } else {
                None
            }
        };

        if let Some(msg) = message {
            let _ = tx.send(msg);
        }
    }
}

/// Formats a one-line title for the current timer state.
pub fn format_status_title(state: &TimerState) -> String {
    let time = format_time(state.seconds_left);
    match (state.mode, state.running) {
        (_, false) if state.is_fresh() => match state.mode {
            TimerMode::Focus => format!("🌱 {time}"),
            TimerMode::Break => format!("☕ {time}"),
        },
        (_, false) => format!("⏸ {time}"),
        (TimerMode::Focus, true) => format!("🌿 {time}"),
        (TimerMode::Break, true) => format!("☕ {time}"),
    }
}

/// Formats time in MM:SS format.
pub fn format_time(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
