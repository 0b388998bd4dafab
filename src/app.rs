//! Main application state and logic.

use crate::garden::{self, GardenState, GardenStats};
use crate::models::{HistoryEntry, Preferences, Preset, TimerMode};
use crate::persistence::DatabaseError;
use crate::session::{Completion, TimerState};
use crate::snapshot::Snapshot;
use crate::sync::{PersistenceGateway, RemoteOp};
use crate::todos::TodoList;
use chrono::{Local, NaiveDate, Utc};
use log::{debug, info};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Events the front end reacts to when an interval finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    FocusComplete {
        total_sessions: u32,
        streak_days: u32,
        stage: u8,
        /// Plant slots filled by this session.
        planted: Vec<u32>,
    },
    BreakComplete,
}

/// Coordinates the timer, the garden and persistence.
pub struct App {
    pub timer: TimerState,
    pub garden: GardenState,
    pub history: Vec<HistoryEntry>,
    pub todos: TodoList,
    pub preferences: Preferences,
    gateway: PersistenceGateway,
    started_at: Option<Instant>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl App {
    /// Restores the app from the gateway and applies any day rollover.
    pub fn new(gateway: PersistenceGateway) -> Self {
        let snapshot = gateway.load();
        let mut app = Self {
            timer: snapshot.timer(),
            garden: snapshot.garden.clone(),
            history: snapshot.history.clone(),
            todos: snapshot.todo_list(),
            preferences: snapshot.preferences(),
            gateway,
            started_at: None,
        };
        info!(
            "loaded garden with {} sessions, {} day streak",
            app.garden.total_sessions, app.garden.streak_days
        );
        app.sync_day();
        app
    }

    /// Builds the snapshot written to the local store.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            focus_minutes: self.timer.focus_mins,
            break_minutes: self.timer.break_mins,
            mode: self.timer.mode,
            seconds_left: self.timer.seconds_left,
            garden: self.garden.clone(),
            history: self.history.clone(),
            todos: self.todos.items.clone(),
            todo_reset_day: self.todos.last_reset_day,
            selected_station: self.preferences.selected_station.clone(),
        }
    }

    fn persist(&self, ops: Vec<RemoteOp>) {
        self.gateway.persist(&self.snapshot(), ops);
    }

    /// Resets daily counters and todo flags when the day has changed.
    /// Returns true if anything was reset.
    pub fn sync_day(&mut self) -> bool {
        let today = today();
        let mut ops = Vec::new();

        if self.garden.sync_daily_counters(today) {
            debug!("new day; cleared today's session count");
            ops.push(RemoteOp::UpsertGarden(self.garden.clone()));
        }

        let marker_before = self.todos.last_reset_day;
        let reset = self.todos.reset_completed_if_new_day(today);
        ops.extend(reset.into_iter().map(RemoteOp::UpsertTodo));

        let changed = !ops.is_empty();
        if changed || self.todos.last_reset_day != marker_before {
            self.persist(ops);
        }
        changed
    }

    /// Starts or resumes the countdown. The first tick is due one full
    /// interval after this call.
    pub fn start(&mut self) {
        if self.timer.start() {
            self.started_at = Some(Instant::now());
            self.persist(Vec::new());
        }
    }

    /// When the current run was started, or `None` while stopped.
    pub fn running_since(&self) -> Option<Instant> {
        self.started_at.filter(|_| self.timer.running)
    }

    pub fn pause(&mut self) {
        if self.timer.pause() {
            self.persist(Vec::new());
        }
    }

    /// Stops and reloads the current mode's duration.
    pub fn reset(&mut self) {
        self.timer.reset();
        self.persist(Vec::new());
    }

    pub fn switch_mode(&mut self) {
        self.timer.switch_mode();
        self.persist(Vec::new());
    }

    pub fn set_focus_mins(&mut self, mins: u32) {
        self.timer.set_focus_mins(mins);
        self.persist(Vec::new());
    }

    pub fn set_break_mins(&mut self, mins: u32) {
        self.timer.set_break_mins(mins);
        self.persist(Vec::new());
    }

    pub fn apply_preset(&mut self, preset: Preset) {
        self.timer.apply_durations(preset.focus_mins, preset.break_mins);
        self.persist(Vec::new());
    }

    /// Advances the timer by one second.
    /// Returns (state_changed, optional_completion_event).
    pub fn tick(&mut self) -> (bool, Option<CompletionEvent>) {
        if !self.timer.running {
            return (false, None);
        }

        match self.timer.tick() {
            Some(completion) => {
                let event = self.finish(completion);
                (true, Some(event))
            }
            None => {
                self.persist(Vec::new());
                (true, None)
            }
        }
    }

    fn finish(&mut self, completion: Completion) -> CompletionEvent {
        let entry = garden::record_completed_session(
            &mut self.history,
            completion.mode,
            completion.duration_mins,
            Utc::now(),
        );
        let mut ops = vec![RemoteOp::InsertHistory(entry)];

        let event = match completion.mode {
            TimerMode::Focus => {
                let planted = self.garden.complete_focus_session(today());
                ops.push(RemoteOp::UpsertGarden(self.garden.clone()));
                info!(
                    "focus session complete: {} total, {} day streak",
                    self.garden.total_sessions, self.garden.streak_days
                );
                CompletionEvent::FocusComplete {
                    total_sessions: self.garden.total_sessions,
                    streak_days: self.garden.streak_days,
                    stage: garden::garden_stage(self.garden.total_sessions),
                    planted: planted.collect(),
                }
            }
            TimerMode::Break => {
                info!("break complete");
                CompletionEvent::BreakComplete
            }
        };

        self.persist(ops);
        event
    }

    /// Adds a todo. Returns false if the text was blank or the list is full.
    pub fn add_todo(&mut self, text: &str) -> bool {
        match self.todos.add(text, Utc::now()) {
            Some(item) => {
                self.persist(vec![RemoteOp::UpsertTodo(item)]);
                true
            }
            None => false,
        }
    }

    /// Toggles the todo at a 1-based position.
    pub fn toggle_todo(&mut self, position: usize) -> bool {
        let Some(id) = self.todos.id_at(position).map(str::to_string) else {
            return false;
        };
        match self.todos.toggle(&id) {
            Some(item) => {
                self.persist(vec![RemoteOp::UpsertTodo(item)]);
                true
            }
            None => false,
        }
    }

    /// Removes the todo at a 1-based position.
    pub fn remove_todo(&mut self, position: usize) -> bool {
        let Some(id) = self.todos.id_at(position).map(str::to_string) else {
            return false;
        };
        match self.todos.remove(&id) {
            Some(item) => {
                self.persist(vec![RemoteOp::DeleteTodo(item.id)]);
                true
            }
            None => false,
        }
    }

    pub fn select_station(&mut self, station: Option<&str>) {
        self.preferences.selected_station = station
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self.persist(Vec::new());
    }

    /// Derived garden statistics as of today.
    pub fn stats(&self) -> GardenStats {
        GardenStats::compute(&self.garden, &self.history, today(), &Local)
    }
}
