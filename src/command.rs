//! Text command handling for the terminal front end.

use crate::app::App;
use crate::models::{Preset, PRESETS};
use crate::timer::format_status_title;
use std::fmt::Write as _;

// Command words
pub const CMD_START: &str = "start";
pub const CMD_PAUSE: &str = "pause";
pub const CMD_RESET: &str = "reset";
pub const CMD_SWITCH: &str = "switch";
pub const CMD_STATUS: &str = "status";
pub const CMD_STATS: &str = "stats";
pub const CMD_HELP: &str = "help";
pub const CMD_QUIT: &str = "quit";

/// Result of handling a command.
#[derive(Debug, Clone, PartialEq)]
pub enum EventResult {
    /// Nothing changed.
    Continue,
    /// User requested quit.
    Quit,
    /// Timer state changed, status needs redraw.
    StateChanged,
    /// Durations or preferences changed.
    SettingsChanged,
    /// Text to show the user.
    Message(String),
    /// The command was not understood.
    Unknown(String),
}

/// Parses a command line and applies it to the app.
pub fn handle_command(app: &mut App, line: &str) -> EventResult {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "" => EventResult::Continue,
        CMD_START => {
            app.start();
            EventResult::StateChanged
        }
        CMD_PAUSE => {
            app.pause();
            EventResult::StateChanged
        }
        CMD_RESET => {
            app.reset();
            EventResult::StateChanged
        }
        CMD_SWITCH => {
            app.switch_mode();
            EventResult::StateChanged
        }
        CMD_STATUS => EventResult::Message(status_text(app)),
        CMD_STATS => EventResult::Message(stats_text(app)),
        CMD_HELP => EventResult::Message(help_text()),
        CMD_QUIT | "q" | "exit" => EventResult::Quit,
        "focus-mins" => match rest.parse::<u32>() {
            Ok(mins) => {
                app.set_focus_mins(mins);
                EventResult::SettingsChanged
            }
            Err(_) => EventResult::Unknown(line.to_string()),
        },
        "break-mins" => match rest.parse::<u32>() {
            Ok(mins) => {
                app.set_break_mins(mins);
                EventResult::SettingsChanged
            }
            Err(_) => EventResult::Unknown(line.to_string()),
        },
        "preset" => match Preset::find(rest) {
            Some(preset) => {
                app.apply_preset(preset);
                EventResult::SettingsChanged
            }
            None => EventResult::Unknown(line.to_string()),
        },
        "station" => {
            let station = (!rest.eq_ignore_ascii_case("off")).then_some(rest);
            app.select_station(station);
            EventResult::SettingsChanged
        }
        "todo" => handle_todo(app, rest, line),
        _ => EventResult::Unknown(line.to_string()),
    }
}

/// Handles `todo add <text>`, `todo done <n>` and `todo rm <n>`.
fn handle_todo(app: &mut App, args: &str, line: &str) -> EventResult {
    if args.is_empty() {
        return EventResult::Message(todos_text(app));
    }

    let (action, rest) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    let rest = rest.trim();
    let position = || rest.parse::<usize>().ok();

    let applied = match action {
        "add" => app.add_todo(rest),
        "done" => position().is_some_and(|n| app.toggle_todo(n)),
        "rm" => position().is_some_and(|n| app.remove_todo(n)),
        _ => return EventResult::Unknown(line.to_string()),
    };

    if applied {
        EventResult::Message(todos_text(app))
    } else {
        EventResult::Message("todo unchanged (blank text, full list, or no such item)".to_string())
    }
}

pub fn status_text(app: &App) -> String {
    let timer = &app.timer;
    format!(
        "{} {} ({:.0}% done) | focus {}m / break {}m | {} sessions today, {} day streak",
        format_status_title(timer),
        timer.mode,
        timer.progress_percent() * 100.0,
        timer.focus_mins,
        timer.break_mins,
        app.garden.sessions_today,
        app.garden.streak_days,
    )
}

fn stats_text(app: &App) -> String {
    let stats = app.stats();
    let plants: Vec<&str> = stats.unlocked_plants.iter().map(|p| p.label()).collect();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "garden stage {} ({}% to next), {} plants: {}",
        stats.stage,
        stats.progress_to_next,
        stats.plant_count,
        plants.join(", ")
    );
    let _ = writeln!(
        out,
        "total {} sessions, best streak {} days, {} min focused today",
        app.garden.total_sessions,
        stats.best_streak,
        stats.focus_minutes_today,
    );
    let _ = writeln!(
        out,
        "this week: {} focus / {} breaks; this month: {} focus / {} breaks",
        stats.weekly.focus_sessions,
        stats.weekly.break_sessions,
        stats.monthly.focus_sessions,
        stats.monthly.break_sessions,
    );
    if let Some(station) = &app.preferences.selected_station {
        let _ = write!(out, "station: {station}");
    }
    out.trim_end().to_string()
}

fn todos_text(app: &App) -> String {
    if app.todos.items.is_empty() {
        return "no todos".to_string();
    }
    app.todos
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let mark = if item.completed { "x" } else { " " };
            format!("{}. [{}] {}", i + 1, mark, item.todo_text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn help_text() -> String {
    let presets: Vec<&str> = PRESETS.iter().map(|p| p.name).collect();
    format!(
        "commands: start, pause, reset, switch, status, stats, quit\n\
         focus-mins <n>, break-mins <n>, preset <{}>\n\
         todo [add <text> | done <n> | rm <n>], station <name|off>",
        presets.join("|")
    )
}
