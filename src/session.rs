//! Focus/break countdown state machine.

use crate::models::TimerMode;

pub const DEFAULT_FOCUS_MINS: u32 = 25;
pub const DEFAULT_BREAK_MINS: u32 = 5;

const FOCUS_MINS_RANGE: (u32, u32) = (5, 180);
const BREAK_MINS_RANGE: (u32, u32) = (1, 60);

/// Clamps a focus duration into the supported range.
pub fn clamp_focus_mins(mins: u32) -> u32 {
    mins.clamp(FOCUS_MINS_RANGE.0, FOCUS_MINS_RANGE.1)
}

/// Clamps a break duration into the supported range.
pub fn clamp_break_mins(mins: u32) -> u32 {
    mins.clamp(BREAK_MINS_RANGE.0, BREAK_MINS_RANGE.1)
}

/// An interval that just ran down to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub mode: TimerMode,
    pub duration_mins: u32,
}

/// Timer state: the current mode, its countdown, and the configured
/// durations for both modes.
///
/// While paused, `seconds_left` equals the full duration of `mode` unless the
/// countdown was paused part way through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerState {
    pub mode: TimerMode,
    pub focus_mins: u32,
    pub break_mins: u32,
    pub seconds_left: u32,
    pub running: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(DEFAULT_FOCUS_MINS, DEFAULT_BREAK_MINS)
    }
}

impl TimerState {
    /// Creates a paused focus timer with the given (clamped) durations.
    pub fn new(focus_mins: u32, break_mins: u32) -> Self {
        let focus_mins = clamp_focus_mins(focus_mins);
        Self {
            mode: TimerMode::Focus,
            focus_mins,
            break_mins: clamp_break_mins(break_mins),
            seconds_left: focus_mins * 60,
            running: false,
        }
    }

    /// Rebuilds a paused timer from persisted values. A missing, zero or
    /// out-of-range countdown falls back to the full duration of `mode`.
    pub fn restore(mode: TimerMode, focus_mins: u32, break_mins: u32, seconds_left: Option<u32>) -> Self {
        let mut state = Self::new(focus_mins, break_mins);
        state.mode = mode;
        let full = state.full_secs();
        state.seconds_left = match seconds_left {
            Some(secs) if secs > 0 && secs <= full => secs,
            _ => full,
        };
        state
    }

    /// Returns the configured duration of `mode` in minutes.
    pub fn duration_mins(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Focus => self.focus_mins,
            TimerMode::Break => self.break_mins,
        }
    }

    /// Full length of the current mode in seconds.
    pub fn full_secs(&self) -> u32 {
        self.duration_mins(self.mode) * 60
    }

    /// Returns true if the countdown sits at the start of the current mode.
    pub fn is_fresh(&self) -> bool {
        !self.running && self.seconds_left == self.full_secs()
    }

    /// Starts the countdown. Returns false if it was already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    /// Pauses the countdown, keeping the remaining time. Returns false if it
    /// was not running.
    pub fn pause(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        true
    }

    /// Stops and reloads the full duration of the current mode.
    pub fn reset(&mut self) {
        self.running = false;
        self.seconds_left = self.full_secs();
    }

    /// Moves to the other mode without recording anything.
    pub fn switch_mode(&mut self) {
        self.load_mode(self.mode.other());
    }

    fn load_mode(&mut self, mode: TimerMode) {
        self.mode = mode;
        self.reset();
    }

    /// Updates the focus duration. A paused focus countdown picks it up
    /// immediately; a running one at its next reset.
    pub fn set_focus_mins(&mut self, mins: u32) {
        self.focus_mins = clamp_focus_mins(mins);
        if !self.running && self.mode == TimerMode::Focus {
            self.seconds_left = self.full_secs();
        }
    }

    /// Updates the break duration, with the same deferral rule as focus.
    pub fn set_break_mins(&mut self, mins: u32) {
        self.break_mins = clamp_break_mins(mins);
        if !self.running && self.mode == TimerMode::Break {
            self.seconds_left = self.full_secs();
        }
    }

    /// Replaces both durations, stopping the countdown and reloading the
    /// current mode.
    pub fn apply_durations(&mut self, focus_mins: u32, break_mins: u32) {
        self.focus_mins = clamp_focus_mins(focus_mins);
        self.break_mins = clamp_break_mins(break_mins);
        self.reset();
    }

    /// Advances the countdown by one second.
    ///
    /// When the countdown reaches zero the timer stops, loads the other mode
    /// at full length, and reports the finished interval.
    pub fn tick(&mut self) -> Option<Completion> {
        if !self.running {
            return None;
        }

        self.seconds_left = self.seconds_left.saturating_sub(1);
        if self.seconds_left > 0 {
            return None;
        }

        let completion = Completion {
            mode: self.mode,
            duration_mins: self.duration_mins(self.mode),
        };
        self.load_mode(self.mode.other());
        Some(completion)
    }

    /// Returns the progress (0.0 to 1.0) through the current interval.
    pub fn progress_percent(&self) -> f32 {
        let total = self.full_secs();
        if total == 0 {
            return 1.0;
        }
        let remaining = self.seconds_left.min(total);
        1.0 - (remaining as f32 / total as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = TimerState::default();
        assert_eq!(state.mode, TimerMode::Focus);
        assert_eq!(state.focus_mins, 25);
        assert_eq!(state.break_mins, 5);
        assert_eq!(state.seconds_left, 25 * 60);
        assert!(!state.running);
        assert!(state.is_fresh());
    }

    #[test]
    fn test_clamping() {
        assert_eq!(clamp_focus_mins(1), 5);
        assert_eq!(clamp_focus_mins(500), 180);
        assert_eq!(clamp_focus_mins(45), 45);
        assert_eq!(clamp_break_mins(0), 1);
        assert_eq!(clamp_break_mins(90), 60);

        let state = TimerState::new(0, 1000);
        assert_eq!(state.focus_mins, 5);
        assert_eq!(state.break_mins, 60);
    }

    #[test]
    fn test_start_is_noop_when_running() {
        let mut state = TimerState::default();
        assert!(state.start());
        assert!(!state.start());
        assert!(state.running);
    }

    #[test]
    fn test_pause_keeps_remaining() {
        let mut state = TimerState::default();
        state.start();
        for _ in 0..10 {
            state.tick();
        }
        assert!(state.pause());
        assert_eq!(state.seconds_left, 25 * 60 - 10);

        // Ticks while paused do nothing
        assert!(state.tick().is_none());
        assert_eq!(state.seconds_left, 25 * 60 - 10);
        assert!(!state.pause());
    }

    #[test]
    fn test_reset_reloads_duration() {
        let mut state = TimerState::default();
        state.start();
        state.tick();
        state.reset();

        assert!(!state.running);
        assert_eq!(state.seconds_left, 25 * 60);
    }

    #[test]
    fn test_switch_mode() {
        let mut state = TimerState::default();
        state.start();
        state.tick();
        state.switch_mode();

        assert_eq!(state.mode, TimerMode::Break);
        assert!(!state.running);
        assert_eq!(state.seconds_left, 5 * 60);

        state.switch_mode();
        assert_eq!(state.mode, TimerMode::Focus);
        assert_eq!(state.seconds_left, 25 * 60);
    }

    #[test]
    fn test_full_countdown_completes_once() {
        let mut state = TimerState::new(5, 1);
        state.start();

        let mut completions = Vec::new();
        for _ in 0..5 * 60 {
            if let Some(done) = state.tick() {
                completions.push(done);
            }
        }

        assert_eq!(
            completions,
            vec![Completion {
                mode: TimerMode::Focus,
                duration_mins: 5
            }]
        );
        assert_eq!(state.mode, TimerMode::Break);
        assert!(!state.running);
        assert_eq!(state.seconds_left, 60);
    }

    #[test]
    fn test_break_completion_returns_to_focus() {
        let mut state = TimerState::new(5, 1);
        state.switch_mode();
        state.start();

        let mut completion = None;
        for _ in 0..60 {
            completion = completion.or(state.tick());
        }

        assert_eq!(
            completion,
            Some(Completion {
                mode: TimerMode::Break,
                duration_mins: 1
            })
        );
        assert_eq!(state.mode, TimerMode::Focus);
        assert_eq!(state.seconds_left, 5 * 60);
    }

    #[test]
    fn test_edit_while_paused_applies_immediately() {
        let mut state = TimerState::default();
        state.set_focus_mins(40);
        assert_eq!(state.seconds_left, 40 * 60);

        // Editing the other mode leaves the countdown alone
        state.set_break_mins(10);
        assert_eq!(state.seconds_left, 40 * 60);
        assert_eq!(state.break_mins, 10);
    }

    #[test]
    fn test_edit_while_running_is_deferred() {
        let mut state = TimerState::default();
        state.start();
        state.tick();
        state.set_focus_mins(40);

        assert_eq!(state.focus_mins, 40);
        assert_eq!(state.seconds_left, 25 * 60 - 1);

        state.reset();
        assert_eq!(state.seconds_left, 40 * 60);
    }

    #[test]
    fn test_apply_durations() {
        let mut state = TimerState::default();
        state.start();
        state.apply_durations(50, 10);

        assert!(!state.running);
        assert_eq!(state.focus_mins, 50);
        assert_eq!(state.break_mins, 10);
        assert_eq!(state.seconds_left, 50 * 60);
    }

    #[test]
    fn test_restore() {
        let state = TimerState::restore(TimerMode::Break, 30, 10, Some(120));
        assert_eq!(state.mode, TimerMode::Break);
        assert_eq!(state.seconds_left, 120);
        assert!(!state.running);

        let state = TimerState::restore(TimerMode::Break, 30, 10, Some(0));
        assert_eq!(state.seconds_left, 10 * 60);

        let state = TimerState::restore(TimerMode::Focus, 30, 10, Some(99_999));
        assert_eq!(state.seconds_left, 30 * 60);

        let state = TimerState::restore(TimerMode::Focus, 30, 10, None);
        assert_eq!(state.seconds_left, 30 * 60);
    }

    #[test]
    fn test_progress_percent() {
        let mut state = TimerState::new(5, 1);
        assert_eq!(state.progress_percent(), 0.0);

        state.seconds_left = 150;
        assert!((state.progress_percent() - 0.5).abs() < 0.01);
    }
}
