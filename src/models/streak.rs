// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily/weekly consistency ("streak") state and its transitions.
//!
//! Transitions are pure: the streak service reads a state, applies one
//! qualifying activity day, and writes the result back with an
//! optimistic-version condition.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::UserId;
use crate::time_utils::{next_day, week_start};

/// Per-user streak record.
///
/// Stored at: `streaks/{user_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub user_id: UserId,
    /// Consecutive qualifying days ending at `last_activity_date`
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Last qualifying local calendar day
    #[serde(default)]
    pub last_activity_date: Option<NaiveDate>,
    pub weekly_goal: u32,
    /// Distinct qualifying days in the week starting at `week_start`
    #[serde(default)]
    pub weekly_progress: u32,
    /// Consecutive completed weeks that met the goal
    #[serde(default)]
    pub weekly_streak: u32,
    /// Monday of the week `weekly_progress` counts
    #[serde(default)]
    pub week_start: Option<NaiveDate>,
    /// Offset of the user's most recent forward activity, used to find "today"
    #[serde(default)]
    pub utc_offset_seconds: i32,
    /// Optimistic concurrency version; 0 means never written
    #[serde(default)]
    pub version: u64,
}

/// What a single activity event did to the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakOutcome {
    /// First qualifying day ever recorded
    Started,
    /// Day immediately after the last qualifying day
    Extended,
    /// Another activity on an already counted day
    SameDay,
    /// Gap of more than one day; streak restarted at 1
    Reset,
    /// Activity dated before the last qualifying day; state untouched
    IgnoredBackfill,
    /// Activity too short to count
    NotQualifying,
}

impl StreakOutcome {
    /// Whether the outcome changed stored state.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Started | Self::Extended | Self::Reset)
    }
}

/// Read-time classification. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakStatus {
    NoStreak,
    Active,
    AtRisk,
}

impl StreakState {
    pub fn new(user_id: UserId, weekly_goal: u32) -> Self {
        Self {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            weekly_goal: weekly_goal.max(1),
            weekly_progress: 0,
            weekly_streak: 0,
            week_start: None,
            utc_offset_seconds: 0,
            version: 0,
        }
    }

    /// Apply one qualifying activity on local day `day`.
    pub fn apply_activity_day(&mut self, day: NaiveDate, utc_offset_seconds: i32) -> StreakOutcome {
        let outcome = match self.last_activity_date {
            None => {
                self.current_streak = 1;
                StreakOutcome::Started
            }
            Some(last) if day == last => return StreakOutcome::SameDay,
            Some(last) if day < last => return StreakOutcome::IgnoredBackfill,
            Some(last) if day == next_day(last) => {
                self.current_streak += 1;
                StreakOutcome::Extended
            }
            Some(_) => {
                self.current_streak = 1;
                StreakOutcome::Reset
            }
        };

        self.last_activity_date = Some(day);
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.utc_offset_seconds = utc_offset_seconds;

        self.roll_week_to(week_start(day));
        self.weekly_progress += 1;

        outcome
    }

    /// Close out any weeks that ended before `week`.
    ///
    /// The week being closed counts toward `weekly_streak` when its progress
    /// met the goal. Skipped weeks had zero progress and break the streak.
    fn roll_week_to(&mut self, week: NaiveDate) {
        let Some(current) = self.week_start else {
            self.week_start = Some(week);
            self.weekly_progress = 0;
            return;
        };
        if week <= current {
            return;
        }

        if self.weekly_progress >= self.weekly_goal {
            self.weekly_streak += 1;
        } else {
            self.weekly_streak = 0;
        }

        let weeks_elapsed = (week - current).num_days() / 7;
        if weeks_elapsed > 1 {
            self.weekly_streak = 0;
        }

        self.week_start = Some(week);
        self.weekly_progress = 0;
    }

    /// Classify the streak relative to the user's local `today`.
    pub fn status(&self, today: NaiveDate) -> StreakStatus {
        let Some(last) = self.last_activity_date else {
            return StreakStatus::NoStreak;
        };
        if self.current_streak == 0 {
            return StreakStatus::NoStreak;
        }
        match (today - last).num_days() {
            d if d <= 0 => StreakStatus::Active,
            1 => StreakStatus::AtRisk,
            _ => StreakStatus::NoStreak,
        }
    }

    /// Streak length as the user should see it today.
    pub fn effective_current_streak(&self, today: NaiveDate) -> u32 {
        match self.status(today) {
            StreakStatus::NoStreak => 0,
            _ => self.current_streak,
        }
    }

    /// Weekly counters after lazily closing any weeks that ended before today.
    pub fn effective_weekly(&self, today: NaiveDate) -> (u32, u32) {
        let mut view = self.clone();
        if view.week_start.is_some() {
            view.roll_week_to(week_start(today));
        }
        (view.weekly_progress, view.weekly_streak)
    }
}

/// Streak as returned by the read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakView {
    pub user_id: UserId,
    /// False for users that never logged a qualifying activity
    pub has_record: bool,
    pub status: StreakStatus,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub weekly_goal: u32,
    pub weekly_progress: u32,
    pub weekly_streak: u32,
}

impl StreakView {
    /// Zeroed view for a user with no streak record.
    pub fn empty(user_id: UserId, weekly_goal: u32) -> Self {
        Self {
            user_id,
            has_record: false,
            status: StreakStatus::NoStreak,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            weekly_goal: weekly_goal.max(1),
            weekly_progress: 0,
            weekly_streak: 0,
        }
    }

    pub fn from_state(state: &StreakState, today: NaiveDate) -> Self {
        let (weekly_progress, weekly_streak) = state.effective_weekly(today);
        Self {
            user_id: state.user_id,
            has_record: true,
            status: state.status(today),
            current_streak: state.effective_current_streak(today),
            longest_streak: state.longest_streak,
            last_activity_date: state.last_activity_date,
            weekly_goal: state.weekly_goal,
            weekly_progress,
            weekly_streak,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn state_with_last(last: NaiveDate, current: u32) -> StreakState {
        let mut s = StreakState::new(1, 3);
        s.current_streak = current;
        s.longest_streak = current;
        s.last_activity_date = Some(last);
        s.week_start = Some(week_start(last));
        s.weekly_progress = 1;
        s
    }

    #[test]
    fn test_first_activity_starts_streak() {
        let mut s = StreakState::new(1, 3);
        let outcome = s.apply_activity_day(date(2024, 1, 10), 0);

        assert_eq!(outcome, StreakOutcome::Started);
        assert_eq!(s.current_streak, 1);
        assert_eq!(s.longest_streak, 1);
        assert_eq!(s.last_activity_date, Some(date(2024, 1, 10)));
        assert_eq!(s.weekly_progress, 1);
        assert_eq!(s.week_start, Some(date(2024, 1, 8)));
    }

    #[test]
    fn test_next_day_same_day_then_gap() {
        let mut s = state_with_last(date(2024, 1, 10), 3);

        assert_eq!(
            s.apply_activity_day(date(2024, 1, 11), 0),
            StreakOutcome::Extended
        );
        assert_eq!(s.current_streak, 4);

        assert_eq!(
            s.apply_activity_day(date(2024, 1, 11), 0),
            StreakOutcome::SameDay
        );
        assert_eq!(s.current_streak, 4);

        assert_eq!(
            s.apply_activity_day(date(2024, 1, 13), 0),
            StreakOutcome::Reset
        );
        assert_eq!(s.current_streak, 1);
        assert_eq!(s.longest_streak, 4);
        assert_eq!(s.last_activity_date, Some(date(2024, 1, 13)));
    }

    #[test]
    fn test_backfill_leaves_state_untouched() {
        let mut s = state_with_last(date(2024, 1, 11), 5);
        let before = s.clone();

        let outcome = s.apply_activity_day(date(2024, 1, 5), 0);

        assert_eq!(outcome, StreakOutcome::IgnoredBackfill);
        assert!(!outcome.is_mutation());
        assert_eq!(s, before);
    }

    #[test]
    fn test_longest_streak_tracks_maximum() {
        let mut s = StreakState::new(1, 3);
        for day in 1..=5 {
            s.apply_activity_day(date(2024, 1, day), 0);
        }
        assert_eq!(s.longest_streak, 5);

        s.apply_activity_day(date(2024, 1, 10), 0);
        s.apply_activity_day(date(2024, 1, 11), 0);
        assert_eq!(s.current_streak, 2);
        assert_eq!(s.longest_streak, 5);
    }

    #[test]
    fn test_weekly_progress_counts_distinct_days() {
        let mut s = StreakState::new(1, 3);
        s.apply_activity_day(date(2024, 1, 8), 0);
        s.apply_activity_day(date(2024, 1, 8), 0);
        s.apply_activity_day(date(2024, 1, 10), 0);
        assert_eq!(s.weekly_progress, 2);
    }

    #[test]
    fn test_week_boundary_meeting_goal_increments_weekly_streak() {
        let mut s = StreakState::new(1, 2);
        s.apply_activity_day(date(2024, 1, 8), 0);
        s.apply_activity_day(date(2024, 1, 9), 0);
        assert_eq!(s.weekly_streak, 0);

        // Monday of the next week closes the previous one
        s.apply_activity_day(date(2024, 1, 15), 0);
        assert_eq!(s.weekly_streak, 1);
        assert_eq!(s.weekly_progress, 1);
        assert_eq!(s.week_start, Some(date(2024, 1, 15)));
    }

    #[test]
    fn test_week_boundary_missing_goal_resets_weekly_streak() {
        let mut s = StreakState::new(1, 3);
        s.weekly_streak = 4;
        s.apply_activity_day(date(2024, 1, 8), 0);
        s.apply_activity_day(date(2024, 1, 15), 0);
        assert_eq!(s.weekly_streak, 0);
    }

    #[test]
    fn test_skipped_week_breaks_weekly_streak() {
        let mut s = StreakState::new(1, 1);
        s.apply_activity_day(date(2024, 1, 8), 0);
        // Jumps over the week of Jan 15 entirely
        s.apply_activity_day(date(2024, 1, 22), 0);
        assert_eq!(s.weekly_streak, 0);
        assert_eq!(s.weekly_progress, 1);
    }

    #[test]
    fn test_weekly_progress_may_exceed_goal() {
        let mut s = StreakState::new(1, 1);
        for day in 8..=12 {
            s.apply_activity_day(date(2024, 1, day), 0);
        }
        assert_eq!(s.weekly_progress, 5);
    }

    #[test]
    fn test_status_active_at_risk_and_broken() {
        let s = state_with_last(date(2024, 1, 10), 3);

        assert_eq!(s.status(date(2024, 1, 10)), StreakStatus::Active);
        assert_eq!(s.status(date(2024, 1, 11)), StreakStatus::AtRisk);
        assert_eq!(s.status(date(2024, 1, 12)), StreakStatus::NoStreak);
        assert_eq!(s.effective_current_streak(date(2024, 1, 11)), 3);
        assert_eq!(s.effective_current_streak(date(2024, 1, 12)), 0);
    }

    #[test]
    fn test_status_without_record() {
        let s = StreakState::new(1, 3);
        assert_eq!(s.status(date(2024, 1, 10)), StreakStatus::NoStreak);
    }

    #[test]
    fn test_effective_weekly_rolls_stale_week() {
        let mut s = StreakState::new(1, 2);
        s.apply_activity_day(date(2024, 1, 8), 0);
        s.apply_activity_day(date(2024, 1, 9), 0);

        // Same week: stored counters
        assert_eq!(s.effective_weekly(date(2024, 1, 12)), (2, 0));
        // Next week: previous week closed with goal met
        assert_eq!(s.effective_weekly(date(2024, 1, 16)), (0, 1));
        // Two weeks later: the empty week in between breaks it
        assert_eq!(s.effective_weekly(date(2024, 1, 23)), (0, 0));
        // Stored state is unchanged by reads
        assert_eq!(s.weekly_progress, 2);
    }

    #[test]
    fn test_view_for_first_time_user() {
        let view = StreakView::empty(42, 3);
        assert!(!view.has_record);
        assert_eq!(view.current_streak, 0);
        assert_eq!(view.status, StreakStatus::NoStreak);
    }

    #[test]
    fn test_view_from_state_at_risk() {
        let s = state_with_last(date(2024, 1, 10), 6);
        let view = StreakView::from_state(&s, date(2024, 1, 11));
        assert!(view.has_record);
        assert_eq!(view.status, StreakStatus::AtRisk);
        assert_eq!(view.current_streak, 6);
    }
}
