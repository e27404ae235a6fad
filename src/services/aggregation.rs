// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Aggregation engine: folds activity records into statistic snapshots.
//!
//! Every run recomputes whole rows from the activity log and overwrites them.
//! Nothing is incremented in place, so overlapping or interrupted runs leave
//! each row either fully old or fully new, and re-running is always safe.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;

use crate::db::{ActivitySource, SnapshotStore, StoreResult};
use crate::error::{AppError, Result};
use crate::models::{
    ActivityRecord, SportId, TeamId, TeamStatSnapshot, UserId, UserSportStatSnapshot,
    UserStatSnapshot,
};
use crate::services::scoring::ScoringFunction;

/// One or more team members could not be read during team aggregation.
///
/// The team snapshot was still written from the members that were read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialAggregationWarning {
    pub team_id: TeamId,
    pub skipped_members: Vec<UserId>,
}

/// Result of aggregating a single user.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAggregation {
    Written(UserStatSnapshot),
    /// No activities and no earlier snapshot; nothing to create yet.
    NoActivity,
}

/// Result of aggregating a single team.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamAggregation {
    pub snapshot: TeamStatSnapshot,
    pub warning: Option<PartialAggregationWarning>,
}

/// Summary of a batch aggregation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationReport {
    /// Entities whose snapshot was written.
    pub processed: u32,
    /// Entities with nothing to aggregate.
    pub skipped: u32,
    /// Entities whose aggregation failed; their previous snapshot is untouched.
    pub failed: u32,
    pub failed_ids: Vec<u64>,
    pub partial_teams: Vec<PartialAggregationWarning>,
}

impl AggregationReport {
    /// Returns true if every entity aggregated without error or skipped member.
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.partial_teams.is_empty()
    }

    /// Returns true if every attempted entity failed.
    pub fn is_complete_failure(&self) -> bool {
        self.processed == 0 && self.failed > 0
    }

    /// Returns true if some entities succeeded and some failed.
    pub fn is_partial_failure(&self) -> bool {
        self.processed > 0 && self.failed > 0
    }
}

/// Recomputes user, per-sport and team snapshots.
pub struct AggregationService {
    source: Arc<dyn ActivitySource>,
    store: Arc<dyn SnapshotStore>,
    scoring: Arc<dyn ScoringFunction>,
    window: Duration,
    concurrency: usize,
}

impl AggregationService {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        store: Arc<dyn SnapshotStore>,
        scoring: Arc<dyn ScoringFunction>,
        window_days: u32,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            store,
            scoring,
            window: Duration::days(i64::from(window_days)),
            concurrency: concurrency.max(1),
        }
    }

    /// Recompute one user's snapshot and per-sport rows as of `as_of`.
    ///
    /// Totals cover every activity up to `as_of`; scores cover the recent
    /// window ending at `as_of`. All scores are computed before anything is
    /// written, so a scoring failure leaves every stored row as it was.
    pub async fn aggregate_user(
        &self,
        user_id: UserId,
        as_of: DateTime<Utc>,
    ) -> Result<UserAggregation> {
        let profile = self
            .source
            .get_user_profile(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;

        let mut activities = self
            .source
            .list_activities_for_user(user_id, None)
            .await?;
        activities.retain(|a| a.start_date <= as_of);

        let previous = self.store.get_user_stats(user_id).await?;
        if activities.is_empty() && previous.is_none() {
            return Ok(UserAggregation::NoActivity);
        }

        let window_start = as_of - self.window;
        let recent: Vec<ActivityRecord> = activities
            .iter()
            .filter(|a| a.start_date > window_start)
            .cloned()
            .collect();

        let index = self.scoring.score(&recent, None).map_err(|e| {
            tracing::warn!(user_id, error = %e, "Scoring failed, keeping previous snapshot");
            AppError::from(e)
        })?;

        let mut by_sport: BTreeMap<SportId, Vec<&ActivityRecord>> = BTreeMap::new();
        for activity in &activities {
            by_sport.entry(activity.sport_id).or_default().push(activity);
        }

        let mut sport_rows = Vec::with_capacity(by_sport.len());
        for (sport_id, sport_activities) in &by_sport {
            let performance_score = self.scoring.score(&recent, Some(*sport_id)).map_err(|e| {
                tracing::warn!(
                    user_id,
                    sport_id,
                    error = %e,
                    "Sport scoring failed, keeping previous snapshot"
                );
                AppError::from(e)
            })?;

            let mut row = UserSportStatSnapshot::new(user_id, *sport_id);
            row.performance_score = performance_score;
            row.activity_count = sport_activities.len() as u32;
            row.total_distance_meters = sport_activities.iter().map(|a| a.distance_meters).sum();
            row.city = profile.city.clone();
            row.country = profile.country.clone();
            sport_rows.push(row);
        }

        let mut snapshot = UserStatSnapshot::new(user_id);
        snapshot.sport_index_best = previous.as_ref().map_or(0.0, |p| p.sport_index_best);
        snapshot.apply_index(index);
        snapshot.city = profile.city;
        snapshot.country = profile.country;
        snapshot.total_activities = activities.len() as u32;
        snapshot.total_distance_meters = activities.iter().map(|a| a.distance_meters).sum();
        snapshot.total_duration_seconds = activities
            .iter()
            .map(|a| u64::from(a.duration_seconds))
            .sum();
        snapshot.total_calories = activities.iter().map(|a| a.calories).sum();
        snapshot.last_activity_at = activities.iter().map(|a| a.start_date).max();

        for row in &sport_rows {
            self.store.put_user_sport_stats(row).await?;
        }
        self.store.put_user_stats(&snapshot).await?;

        tracing::debug!(
            user_id,
            sport_index = snapshot.sport_index,
            sports = sport_rows.len(),
            "User aggregated"
        );
        Ok(UserAggregation::Written(snapshot))
    }

    /// Re-fold a team snapshot from its members' current user snapshots.
    ///
    /// A member with no snapshot yet contributes zeros. Members whose
    /// snapshot cannot be read are skipped and reported in the returned
    /// warning.
    pub async fn aggregate_team(&self, team_id: TeamId) -> Result<TeamAggregation> {
        let members = self
            .source
            .list_team_members(team_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("team {}", team_id)))?;

        let reads: Vec<(UserId, StoreResult<Option<UserStatSnapshot>>)> =
            stream::iter(members.iter().copied())
                .map(|user_id| async move { (user_id, self.store.get_user_stats(user_id).await) })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut member_snapshots = Vec::with_capacity(reads.len());
        let mut skipped_members = Vec::new();
        for (user_id, read) in reads {
            match read {
                Ok(Some(s)) => member_snapshots.push(s),
                // Never aggregated: counts as a member with nothing recorded
                Ok(None) => member_snapshots.push(UserStatSnapshot::new(user_id)),
                Err(e) => {
                    tracing::debug!(team_id, user_id, error = %e, "Member snapshot unreadable");
                    skipped_members.push(user_id);
                }
            }
        }

        let snapshot = TeamStatSnapshot::fold(team_id, members.len() as u32, &member_snapshots);
        self.store.put_team_stats(&snapshot).await?;

        let warning = if skipped_members.is_empty() {
            None
        } else {
            tracing::warn!(
                team_id,
                skipped = ?skipped_members,
                aggregated = member_snapshots.len(),
                "Partial team aggregation"
            );
            Some(PartialAggregationWarning {
                team_id,
                skipped_members,
            })
        };

        Ok(TeamAggregation { snapshot, warning })
    }

    pub async fn run_aggregation_for_all_users(&self) -> Result<AggregationReport> {
        self.run_aggregation_for_all_users_at(Utc::now()).await
    }

    /// Aggregate every user as of `as_of`, `concurrency` users at a time.
    ///
    /// One user's failure never stops the others.
    pub async fn run_aggregation_for_all_users_at(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<AggregationReport> {
        let user_ids = self.source.list_user_ids().await?;
        tracing::info!(users = user_ids.len(), %as_of, "Starting user aggregation");

        let results: Vec<(UserId, Result<UserAggregation>)> = stream::iter(user_ids)
            .map(|user_id| async move { (user_id, self.aggregate_user(user_id, as_of).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = AggregationReport::default();
        for (user_id, result) in results {
            match result {
                Ok(UserAggregation::Written(_)) => report.processed += 1,
                Ok(UserAggregation::NoActivity) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "User aggregation failed");
                    report.failed += 1;
                    report.failed_ids.push(user_id);
                }
            }
        }
        report.failed_ids.sort_unstable();

        tracing::info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "User aggregation complete"
        );
        Ok(report)
    }

    /// Re-fold every team, `concurrency` teams at a time.
    pub async fn run_aggregation_for_all_teams(&self) -> Result<AggregationReport> {
        let team_ids = self.source.list_team_ids().await?;
        tracing::info!(teams = team_ids.len(), "Starting team aggregation");

        let results: Vec<(TeamId, Result<TeamAggregation>)> = stream::iter(team_ids)
            .map(|team_id| async move { (team_id, self.aggregate_team(team_id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = AggregationReport::default();
        for (team_id, result) in results {
            match result {
                Ok(aggregation) => {
                    report.processed += 1;
                    if let Some(warning) = aggregation.warning {
                        report.partial_teams.push(warning);
                    }
                }
                Err(e) => {
                    tracing::warn!(team_id, error = %e, "Team aggregation failed");
                    report.failed += 1;
                    report.failed_ids.push(team_id);
                }
            }
        }
        report.failed_ids.sort_unstable();
        report.partial_teams.sort_by_key(|w| w.team_id);

        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            partial = report.partial_teams.len(),
            "Team aggregation complete"
        );
        Ok(report)
    }
}
