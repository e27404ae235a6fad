// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-event streak updates with optimistic-version retry.
//!
//! Each update reads the user's `StreakState`, applies the transition, and
//! writes it back only if the stored version is still the one that was read.
//! A lost race re-reads and re-applies, so two concurrent activities on the
//! same new day count once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{SnapshotStore, StoreError};
use crate::error::{AppError, Result};
use crate::models::{ActivityRecord, StreakOutcome, StreakState, StreakView, UserId};
use crate::time_utils::local_date;

pub const MIN_WEEKLY_GOAL: u32 = 1;
pub const MAX_WEEKLY_GOAL: u32 = 7;

/// Result of feeding one activity to the streak state machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreakUpdate {
    pub outcome: StreakOutcome,
    pub state: StreakState,
}

pub struct StreakService {
    store: Arc<dyn SnapshotStore>,
    default_weekly_goal: u32,
    min_qualifying_duration_secs: u32,
    max_retries: u32,
}

impl StreakService {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        default_weekly_goal: u32,
        min_qualifying_duration_secs: u32,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            default_weekly_goal: default_weekly_goal.clamp(MIN_WEEKLY_GOAL, MAX_WEEKLY_GOAL),
            min_qualifying_duration_secs,
            max_retries: max_retries.max(1),
        }
    }

    /// Apply a newly ingested activity to its user's streak.
    pub async fn record_activity(&self, activity: &ActivityRecord) -> Result<StreakUpdate> {
        let user_id = activity.user_id;

        if activity.duration_seconds < self.min_qualifying_duration_secs {
            let state = self
                .store
                .get_streak(user_id)
                .await?
                .unwrap_or_else(|| StreakState::new(user_id, self.default_weekly_goal));
            tracing::debug!(
                user_id,
                activity_id = activity.activity_id,
                duration = activity.duration_seconds,
                "Activity below qualifying duration"
            );
            return Ok(StreakUpdate {
                outcome: StreakOutcome::NotQualifying,
                state,
            });
        }

        let day = activity.local_date();

        for attempt in 1..=self.max_retries {
            let current = self.store.get_streak(user_id).await?;
            let expected_version = current.as_ref().map(|s| s.version);
            let mut state =
                current.unwrap_or_else(|| StreakState::new(user_id, self.default_weekly_goal));

            let outcome = state.apply_activity_day(day, activity.utc_offset_seconds);

            if !outcome.is_mutation() {
                if outcome == StreakOutcome::IgnoredBackfill {
                    tracing::info!(
                        user_id,
                        activity_id = activity.activity_id,
                        activity_date = %day,
                        last_activity_date = ?state.last_activity_date,
                        "Ignoring backfilled activity for streak"
                    );
                }
                return Ok(StreakUpdate { outcome, state });
            }

            match self.store.put_streak_if_version(&state, expected_version).await {
                Ok(stored) => {
                    tracing::info!(
                        user_id,
                        activity_id = activity.activity_id,
                        outcome = ?outcome,
                        current_streak = stored.current_streak,
                        "Streak updated"
                    );
                    return Ok(StreakUpdate {
                        outcome,
                        state: stored,
                    });
                }
                Err(StoreError::Conflict { expected, found }) => {
                    tracing::debug!(
                        user_id,
                        attempt,
                        ?expected,
                        ?found,
                        "Streak version conflict, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(
            user_id,
            attempts = self.max_retries,
            "Streak update retries exhausted"
        );
        Err(AppError::Conflict(format!(
            "streak for user {} changed concurrently {} times",
            user_id, self.max_retries
        )))
    }

    /// Current streak as seen by the user at `now`.
    ///
    /// Users without a record get a zeroed view with the default goal.
    pub async fn get_streak(&self, user_id: UserId, now: DateTime<Utc>) -> Result<StreakView> {
        match self.store.get_streak(user_id).await? {
            Some(state) => {
                let today = local_date(now, state.utc_offset_seconds);
                Ok(StreakView::from_state(&state, today))
            }
            None => Ok(StreakView::empty(user_id, self.default_weekly_goal)),
        }
    }

    /// Change a user's weekly goal, creating a record if needed.
    pub async fn set_weekly_goal(&self, user_id: UserId, goal: u32) -> Result<StreakState> {
        if !(MIN_WEEKLY_GOAL..=MAX_WEEKLY_GOAL).contains(&goal) {
            return Err(AppError::BadRequest(format!(
                "weekly goal must be between {} and {}",
                MIN_WEEKLY_GOAL, MAX_WEEKLY_GOAL
            )));
        }

        for attempt in 1..=self.max_retries {
            let current = self.store.get_streak(user_id).await?;
            let expected_version = current.as_ref().map(|s| s.version);
            let mut state =
                current.unwrap_or_else(|| StreakState::new(user_id, self.default_weekly_goal));

            if expected_version.is_some() && state.weekly_goal == goal {
                return Ok(state);
            }
            state.weekly_goal = goal;

            match self.store.put_streak_if_version(&state, expected_version).await {
                Ok(stored) => {
                    tracing::info!(user_id, weekly_goal = goal, "Weekly goal updated");
                    return Ok(stored);
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(user_id, attempt, "Weekly goal version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(
            user_id,
            attempts = self.max_retries,
            "Weekly goal update retries exhausted"
        );
        Err(AppError::Conflict(format!(
            "weekly goal for user {} changed concurrently {} times",
            user_id, self.max_retries
        )))
    }
}
