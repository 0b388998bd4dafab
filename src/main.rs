//! Focus Garden - a Pomodoro focus timer that grows a garden.
//!
//! State lives in a local SQLite store and is optionally mirrored to a
//! remote REST backend. This binary is a line-oriented terminal front end.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

mod app;
mod command;
mod config;
mod garden;
mod models;
mod persistence;
mod remote;
mod session;
mod snapshot;
mod sync;
mod timer;
mod todos;

use app::{App, CompletionEvent};
use command::EventResult;
use config::RemoteConfig;
use persistence::Database;
use sync::PersistenceGateway;
use timer::{Ticker, TimerMessage};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Terminal front end: forwards typed commands and prints timer events.
struct FocusGarden {
    app: Arc<Mutex<App>>,
    timer_rx: Receiver<TimerMessage>,
    input_rx: Receiver<String>,
}

impl FocusGarden {
    fn handle_completion(&self, event: CompletionEvent) {
        match event {
            CompletionEvent::FocusComplete {
                total_sessions,
                streak_days,
                stage,
                planted,
            } => {
                println!(
                    "Focus session complete! {} sessions, {} day streak, garden stage {}",
                    total_sessions, streak_days, stage
                );
                if !planted.is_empty() {
                    println!("Planted something new in slot {:?}", planted);
                }
                println!("Break is ready; type `start` when you are.");
            }
            CompletionEvent::BreakComplete => {
                println!("Break over. Type `start` to focus again.");
            }
        }
    }

    fn process_timer_messages(&self) {
        // Process all pending timer messages
        while let Ok(msg) = self.timer_rx.try_recv() {
            match msg {
                TimerMessage::StateChanged { title } => {
                    log::debug!("{}", title);
                }
                TimerMessage::Completed(event) => {
                    self.handle_completion(event);
                }
            }
        }
    }

    fn process_command(&self, line: &str) -> bool {
        let Ok(mut app) = self.app.lock() else {
            log::error!("app state lock poisoned");
            return false;
        };

        match command::handle_command(&mut app, line) {
            EventResult::Quit => return false,
            EventResult::StateChanged | EventResult::SettingsChanged => {
                println!("{}", command::status_text(&app));
            }
            EventResult::Message(text) => println!("{}", text),
            EventResult::Unknown(text) => println!("unknown command: {} (try `help`)", text),
            EventResult::Continue => {}
        }
        true
    }

    fn run(&self) {
        loop {
            match self.input_rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    if !self.process_command(&line) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.process_timer_messages();
        }
    }
}

fn spawn_input_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("Focus Garden starting up...");

    let db = Database::new().map_err(app::AppError::from)?;
    let gateway = PersistenceGateway::connect(db, RemoteConfig::from_env());
    let app = Arc::new(Mutex::new(App::new(gateway)));

    if let Ok(app) = app.lock() {
        println!("{}", command::status_text(&app));
    }

    let (tx, timer_rx) = mpsc::channel();
    let ticker = Ticker::spawn(Arc::clone(&app), tx, TICK_INTERVAL);

    let front_end = FocusGarden {
        app: Arc::clone(&app),
        timer_rx,
        input_rx: spawn_input_reader(),
    };
    front_end.run();

    ticker.stop();
    if let Ok(mut app) = app.lock() {
        app.pause();
    }
    log::info!("Focus Garden stopped");

    Ok(())
}
