//! Data models shared across the Focus Garden application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which interval the timer is counting down. Also used as the type of a
/// completed history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    #[default]
    Focus,
    Break,
}

impl TimerMode {
    /// Returns the mode the timer moves to after this one completes.
    pub fn other(self) -> Self {
        match self {
            Self::Focus => Self::Break,
            Self::Break => Self::Focus,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Break => "break",
        }
    }

    /// Parses the wire representation used by both the local snapshot and
    /// the remote tables.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "focus" => Some(Self::Focus),
            "break" => Some(Self::Break),
            _ => None,
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed focus or break interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub session_type: TimerMode,
    pub duration_minutes: u32,
    pub completed_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Creates an entry with a fresh client-side id.
    pub fn new(session_type: TimerMode, duration_minutes: u32, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_type,
            duration_minutes: duration_minutes.max(1),
            completed_at,
        }
    }
}

/// A short daily intention shown next to the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: String,
    pub todo_text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// User interface preferences that travel with the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Name of the ambient audio station, if one is selected.
    pub selected_station: Option<String>,
}

/// Aggregated history counts for a calendar period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStats {
    pub focus_sessions: u32,
    pub break_sessions: u32,
    pub focus_minutes: u32,
}

/// A named pair of focus and break durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub focus_mins: u32,
    pub break_mins: u32,
}

pub const PRESETS: [Preset; 4] = [
    Preset {
        name: "classic",
        focus_mins: 25,
        break_mins: 5,
    },
    Preset {
        name: "deep",
        focus_mins: 50,
        break_mins: 10,
    },
    Preset {
        name: "sprint",
        focus_mins: 15,
        break_mins: 3,
    },
    Preset {
        name: "marathon",
        focus_mins: 90,
        break_mins: 20,
    },
];

impl Preset {
    /// Looks up a preset by case-insensitive name.
    pub fn find(name: &str) -> Option<Self> {
        let name = name.trim();
        PRESETS
            .iter()
            .copied()
            .find(|preset| preset.name.eq_ignore_ascii_case(name))
    }
}
