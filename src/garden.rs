//! Garden progression: session counters, streaks, and everything derived
//! from the history log.

use crate::models::{HistoryEntry, PeriodStats, TimerMode};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// Total sessions needed to reach garden stages 1 through 4.
pub const STAGE_THRESHOLDS: [u32; 4] = [3, 10, 20, 30];

/// Most plants the garden ever shows.
pub const MAX_PLANTS: u32 = 12;

/// Number of history entries kept locally.
pub const HISTORY_LIMIT: usize = 100;

/// Accumulated focus counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GardenState {
    pub total_sessions: u32,
    pub sessions_today: u32,
    pub streak_days: u32,
    pub last_session_date: Option<NaiveDate>,
}

impl GardenState {
    /// Records a finished focus interval on `today`.
    ///
    /// Returns the indices of plant slots that were filled by this session.
    /// Callers must invoke this exactly once per completed focus interval.
    pub fn complete_focus_session(&mut self, today: NaiveDate) -> Range<u32> {
        let prev_total = self.total_sessions;

        if self.last_session_date != Some(today) {
            self.sessions_today = 0;
        }

        self.streak_days = match self.last_session_date {
            None => 1,
            Some(last) => match (today - last).num_days() {
                1 => self.streak_days + 1,
                delta if delta > 1 => 1,
                _ => self.streak_days.max(1),
            },
        };

        self.total_sessions = self.total_sessions.saturating_add(1);
        self.sessions_today = self.sessions_today.saturating_add(1);
        self.last_session_date = Some(today);

        newly_planted(prev_total, self.total_sessions)
    }

    /// Zeroes today's count when the last session happened on another day.
    /// Returns true if anything changed.
    pub fn sync_daily_counters(&mut self, today: NaiveDate) -> bool {
        match self.last_session_date {
            Some(last) if last != today && self.sessions_today != 0 => {
                self.sessions_today = 0;
                true
            }
            _ => false,
        }
    }
}

/// Plant slot indices `[prev/2, new/2)` that fall below the plant cap.
fn newly_planted(prev_total: u32, new_total: u32) -> Range<u32> {
    let start = (prev_total / 2).min(MAX_PLANTS);
    let end = (new_total / 2).min(MAX_PLANTS);
    start..end.max(start)
}

/// Garden growth stage (0 to 4) for a session count.
pub fn garden_stage(total_sessions: u32) -> u8 {
    STAGE_THRESHOLDS
        .iter()
        .take_while(|&&threshold| total_sessions >= threshold)
        .count() as u8
}

/// Percentage (0 to 100) of the way from the current stage to the next one.
pub fn progress_to_next(total_sessions: u32) -> u8 {
    let stage = garden_stage(total_sessions) as usize;
    let Some(&next) = STAGE_THRESHOLDS.get(stage) else {
        return 100;
    };
    let floor = if stage == 0 {
        0
    } else {
        STAGE_THRESHOLDS[stage - 1]
    };
    let span = next - floor;
    ((total_sessions - floor) * 100 / span) as u8
}

/// Number of plants shown for a session count.
pub fn plant_count(total_sessions: u32) -> u32 {
    (total_sessions / 2 + 1).min(MAX_PLANTS)
}

/// Plants that can appear in the garden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantType {
    Sprout,
    Tulip,
    Sunflower,
    Rose,
    CherryBlossom,
}

impl PlantType {
    pub const ALL: [PlantType; 5] = [
        PlantType::Sprout,
        PlantType::Tulip,
        PlantType::Sunflower,
        PlantType::Rose,
        PlantType::CherryBlossom,
    ];

    /// Garden stage at which this plant becomes available.
    pub fn unlock_stage(self) -> u8 {
        match self {
            Self::Sprout => 0,
            Self::Tulip => 1,
            Self::Sunflower => 2,
            Self::Rose => 3,
            Self::CherryBlossom => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sprout => "sprout",
            Self::Tulip => "tulip",
            Self::Sunflower => "sunflower",
            Self::Rose => "rose",
            Self::CherryBlossom => "cherry blossom",
        }
    }
}

/// Plant types unlocked at a session count, in unlock order.
pub fn unlocked_plant_types(total_sessions: u32) -> Vec<PlantType> {
    let stage = garden_stage(total_sessions);
    PlantType::ALL
        .into_iter()
        .filter(|plant| plant.unlock_stage() <= stage)
        .collect()
}

/// Prepends a completed interval to the newest-first log and drops entries
/// past the local cap. Returns the new entry.
pub fn record_completed_session(
    history: &mut Vec<HistoryEntry>,
    session_type: TimerMode,
    duration_minutes: u32,
    now: DateTime<Utc>,
) -> HistoryEntry {
    let entry = HistoryEntry::new(session_type, duration_minutes, now);
    history.insert(0, entry.clone());
    history.truncate(HISTORY_LIMIT);
    entry
}

fn local_day<Tz: TimeZone>(entry: &HistoryEntry, tz: &Tz) -> NaiveDate {
    entry.completed_at.with_timezone(tz).date_naive()
}

fn period_stats<Tz, F>(history: &[HistoryEntry], tz: &Tz, in_period: F) -> PeriodStats
where
    Tz: TimeZone,
    F: Fn(NaiveDate) -> bool,
{
    let mut stats = PeriodStats::default();
    for entry in history.iter().filter(|e| in_period(local_day(e, tz))) {
        match entry.session_type {
            TimerMode::Focus => {
                stats.focus_sessions += 1;
                stats.focus_minutes += entry.duration_minutes;
            }
            TimerMode::Break => stats.break_sessions += 1,
        }
    }
    stats
}

/// First day (Monday) of the week containing `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

/// Counts for the Monday-to-Sunday week containing `today`.
pub fn weekly_stats<Tz: TimeZone>(history: &[HistoryEntry], today: NaiveDate, tz: &Tz) -> PeriodStats {
    let start = week_start(today);
    let end = start + Duration::days(7);
    period_stats(history, tz, |day| day >= start && day < end)
}

/// Counts for the calendar month containing `today`.
pub fn monthly_stats<Tz: TimeZone>(history: &[HistoryEntry], today: NaiveDate, tz: &Tz) -> PeriodStats {
    period_stats(history, tz, |day| {
        day.year() == today.year() && day.month() == today.month()
    })
}

/// Focus minutes logged on `day`.
pub fn focus_minutes_on<Tz: TimeZone>(history: &[HistoryEntry], day: NaiveDate, tz: &Tz) -> u32 {
    period_stats(history, tz, |d| d == day).focus_minutes
}

/// Longest run of consecutive days in `days`.
pub fn best_streak<I>(days: I) -> u32
where
    I: IntoIterator<Item = NaiveDate>,
{
    let days: BTreeSet<NaiveDate> = days.into_iter().collect();
    let mut best = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;

    for day in days {
        run = match prev {
            Some(p) if (day - p).num_days() == 1 => run + 1,
            _ => 1,
        };
        best = best.max(run);
        prev = Some(day);
    }
    best
}

/// Longest run of consecutive local days with at least one focus entry.
pub fn best_streak_from_history<Tz: TimeZone>(history: &[HistoryEntry], tz: &Tz) -> u32 {
    best_streak(
        history
            .iter()
            .filter(|e| e.session_type == TimerMode::Focus)
            .map(|e| local_day(e, tz)),
    )
}

/// Everything the garden view shows, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GardenStats {
    pub stage: u8,
    pub progress_to_next: u8,
    pub plant_count: u32,
    pub unlocked_plants: Vec<PlantType>,
    pub weekly: PeriodStats,
    pub monthly: PeriodStats,
    pub best_streak: u32,
    pub focus_minutes_today: u32,
}

impl GardenStats {
    pub fn compute<Tz: TimeZone>(
        garden: &GardenState,
        history: &[HistoryEntry],
        today: NaiveDate,
        tz: &Tz,
    ) -> Self {
        let total = garden.total_sessions;
        Self {
            stage: garden_stage(total),
            progress_to_next: progress_to_next(total),
            plant_count: plant_count(total),
            unlocked_plants: unlocked_plant_types(total),
            weekly: weekly_stats(history, today, tz),
            monthly: monthly_stats(history, today, tz),
            best_streak: best_streak_from_history(history, tz).max(garden.streak_days),
            focus_minutes_today: focus_minutes_on(history, today, tz),
        }
    }
}
