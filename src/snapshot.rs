//! The persisted snapshot and the sanitizers that rebuild it from untrusted
//! JSON, whether it came from the local store or from remote rows.

use crate::garden::{GardenState, HISTORY_LIMIT};
use crate::models::{HistoryEntry, Preferences, TimerMode, TodoItem};
use crate::session::{TimerState, DEFAULT_BREAK_MINS, DEFAULT_FOCUS_MINS};
use crate::todos::{TodoList, MAX_TODO_CHARS};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything the app writes to the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub focus_minutes: u32,
    pub break_minutes: u32,
    pub mode: TimerMode,
    pub seconds_left: u32,
    pub garden: GardenState,
    pub history: Vec<HistoryEntry>,
    pub todos: Vec<TodoItem>,
    pub todo_reset_day: Option<NaiveDate>,
    pub selected_station: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINS,
            break_minutes: DEFAULT_BREAK_MINS,
            mode: TimerMode::Focus,
            seconds_left: DEFAULT_FOCUS_MINS * 60,
            garden: GardenState::default(),
            history: Vec::new(),
            todos: Vec::new(),
            todo_reset_day: None,
            selected_station: None,
        }
    }
}

impl Snapshot {
    /// Rebuilds the timer, always paused.
    pub fn timer(&self) -> TimerState {
        TimerState::restore(
            self.mode,
            self.focus_minutes,
            self.break_minutes,
            Some(self.seconds_left),
        )
    }

    pub fn todo_list(&self) -> TodoList {
        TodoList::from_parts(self.todos.clone(), self.todo_reset_day)
    }

    pub fn preferences(&self) -> Preferences {
        Preferences {
            selected_station: self.selected_station.clone(),
        }
    }
}

/// Looks up a field by its camelCase or snake_case name.
fn field<'a>(object: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    object
        .get(camel)
        .or_else(|| object.get(snake))
        .filter(|value| !value.is_null())
}

/// Reads a non-negative whole number, tolerating integral floats.
fn as_count(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    value
        .as_f64()
        .filter(|n| n.is_finite() && *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64)
        .map(|n| n as u32)
}

fn as_trimmed_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    let raw = as_trimmed_str(value)?;
    // Accept full timestamps as well as bare dates
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = as_trimmed_str(value)?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Rebuilds garden counters. Each counter defaults on its own; a non-object,
/// or one where no garden field parses, yields `None`.
pub fn sanitize_garden(value: &Value) -> Option<GardenState> {
    if !value.is_object() {
        return None;
    }
    let count = |camel, snake| field(value, camel, snake).and_then(as_count);
    let total_sessions = count("totalSessions", "total_sessions");
    let sessions_today = count("sessionsToday", "sessions_today");
    let streak_days = count("streakDays", "streak_days");
    let last_session_date = field(value, "lastSessionDate", "last_session_date").and_then(as_date);

    if total_sessions.is_none()
        && sessions_today.is_none()
        && streak_days.is_none()
        && last_session_date.is_none()
    {
        return None;
    }

    Some(GardenState {
        total_sessions: total_sessions.unwrap_or(0),
        sessions_today: sessions_today.unwrap_or(0),
        streak_days: streak_days.unwrap_or(0),
        last_session_date,
    })
}

/// Rebuilds one history entry, or `None` if any required field is invalid.
pub fn sanitize_history_entry(value: &Value) -> Option<HistoryEntry> {
    let id = field(value, "id", "id").and_then(as_trimmed_str)?;
    let session_type = field(value, "sessionType", "session_type")
        .and_then(Value::as_str)
        .and_then(TimerMode::parse)?;
    let duration_minutes = field(value, "durationMinutes", "duration_minutes")
        .and_then(as_count)
        .filter(|mins| *mins >= 1)?;
    let completed_at = field(value, "completedAt", "completed_at").and_then(as_timestamp)?;

    Some(HistoryEntry {
        id: id.to_string(),
        session_type,
        duration_minutes,
        completed_at,
    })
}

/// Rebuilds one todo, or `None` if it has no id, text or creation time.
pub fn sanitize_todo(value: &Value) -> Option<TodoItem> {
    let id = field(value, "id", "id").and_then(as_trimmed_str)?;
    let text = field(value, "todoText", "todo_text")
        .or_else(|| field(value, "text", "text"))
        .and_then(as_trimmed_str)?;
    let completed = field(value, "completed", "completed")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let created_at = field(value, "createdAt", "created_at").and_then(as_timestamp)?;

    Some(TodoItem {
        id: id.to_string(),
        todo_text: text.chars().take(MAX_TODO_CHARS).collect(),
        completed,
        created_at,
    })
}

/// Keeps valid history entries, newest first, up to the local cap.
pub fn sanitize_history(values: &[Value]) -> Vec<HistoryEntry> {
    let mut history: Vec<HistoryEntry> = values.iter().filter_map(sanitize_history_entry).collect();
    history.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    history.truncate(HISTORY_LIMIT);
    history
}

/// Rebuilds a full snapshot. Never fails: every field falls back to its
/// default independently.
pub fn sanitize_snapshot(value: &Value) -> Snapshot {
    let defaults = Snapshot::default();
    if !value.is_object() {
        return defaults;
    }

    let array = |camel, snake| {
        field(value, camel, snake)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    };

    let todos: Vec<TodoItem> = array("todos", "todos").iter().filter_map(sanitize_todo).collect();

    Snapshot {
        focus_minutes: field(value, "focusMinutes", "focus_minutes")
            .and_then(as_count)
            .unwrap_or(defaults.focus_minutes),
        break_minutes: field(value, "breakMinutes", "break_minutes")
            .and_then(as_count)
            .unwrap_or(defaults.break_minutes),
        mode: field(value, "mode", "mode")
            .and_then(Value::as_str)
            .and_then(TimerMode::parse)
            .unwrap_or(defaults.mode),
        seconds_left: field(value, "secondsLeft", "seconds_left")
            .and_then(as_count)
            .unwrap_or(0),
        garden: field(value, "garden", "garden")
            .and_then(sanitize_garden)
            .unwrap_or_default(),
        history: sanitize_history(array("history", "history")),
        todos: TodoList::from_parts(todos, None).items,
        todo_reset_day: field(value, "todoResetDay", "todo_reset_day").and_then(as_date),
        selected_station: field(value, "selectedStation", "selected_station")
            .and_then(as_trimmed_str)
            .map(str::to_string),
    }
}
