// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer.
//!
//! The engine talks to storage through two traits: [`ActivitySource`] for
//! the read-only ingest side and [`SnapshotStore`] for the snapshots it owns.
//! [`MemoryStore`] backs local development and tests; [`FirestoreDb`] backs
//! production.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    ActivityRecord, RankingRun, SportId, SportRankField, StreakState, TeamId, TeamMetric,
    TeamStatSnapshot, UserId, UserProfile, UserRankField, UserSportStatSnapshot, UserStatSnapshot,
};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const ACTIVITIES: &str = "activities";
    pub const TEAMS: &str = "teams";
    pub const USER_STATS: &str = "user_stats";
    pub const USER_SPORT_STATS: &str = "user_sport_stats";
    pub const TEAM_STATS: &str = "team_stats";
    pub const STREAKS: &str = "streaks";
    pub const RANKING_RUNS: &str = "ranking_runs";
}

/// Errors from the storage layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Version conflict: expected {expected:?}, found {found:?}")]
    Conflict {
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read-only view of the activity log and the user/team directory.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn list_user_ids(&self) -> StoreResult<Vec<UserId>>;

    async fn get_user_profile(&self, user_id: UserId) -> StoreResult<Option<UserProfile>>;

    /// Activities for a user, oldest first, optionally only those starting at or after `since`.
    async fn list_activities_for_user(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<ActivityRecord>>;

    async fn list_team_ids(&self) -> StoreResult<Vec<TeamId>>;

    /// Member IDs of a team, or `None` if the team does not exist.
    async fn list_team_members(&self, team_id: TeamId) -> StoreResult<Option<Vec<UserId>>>;

    /// Activities of every current member of a team.
    async fn list_activities_for_team_members(
        &self,
        team_id: TeamId,
    ) -> StoreResult<Vec<ActivityRecord>> {
        let members = self
            .list_team_members(team_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("team {}", team_id)))?;

        let mut activities = Vec::new();
        for user_id in members {
            activities.extend(self.list_activities_for_user(user_id, None).await?);
        }
        Ok(activities)
    }
}

/// Snapshots owned by the engine.
///
/// `put_*` methods overwrite metric fields but retain any rank fields already
/// stored for the row; rank fields are written only by the `write_*_ranks`
/// methods, which touch nothing but the named rank column.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    // ─── User stats ──────────────────────────────────────────────

    async fn get_user_stats(&self, user_id: UserId) -> StoreResult<Option<UserStatSnapshot>>;

    async fn put_user_stats(&self, snapshot: &UserStatSnapshot) -> StoreResult<()>;

    async fn list_user_stats(&self) -> StoreResult<Vec<UserStatSnapshot>>;

    async fn write_user_ranks(
        &self,
        field: UserRankField,
        ranks: &[(UserId, Option<u32>)],
    ) -> StoreResult<()>;

    // ─── User sport stats ────────────────────────────────────────

    async fn get_user_sport_stats(&self, user_id: UserId)
        -> StoreResult<Vec<UserSportStatSnapshot>>;

    async fn put_user_sport_stats(&self, snapshot: &UserSportStatSnapshot) -> StoreResult<()>;

    /// All per-sport rows, optionally restricted to one sport.
    async fn list_sport_stats(
        &self,
        sport_id: Option<SportId>,
    ) -> StoreResult<Vec<UserSportStatSnapshot>>;

    async fn write_sport_ranks(
        &self,
        sport_id: SportId,
        field: SportRankField,
        ranks: &[(UserId, Option<u32>)],
    ) -> StoreResult<()>;

    // ─── Team stats ──────────────────────────────────────────────

    async fn get_team_stats(&self, team_id: TeamId) -> StoreResult<Option<TeamStatSnapshot>>;

    async fn put_team_stats(&self, snapshot: &TeamStatSnapshot) -> StoreResult<()>;

    async fn list_team_stats(&self) -> StoreResult<Vec<TeamStatSnapshot>>;

    async fn write_team_ranks(
        &self,
        metric: TeamMetric,
        ranks: &[(TeamId, Option<u32>)],
    ) -> StoreResult<()>;

    // ─── Streaks ─────────────────────────────────────────────────

    async fn get_streak(&self, user_id: UserId) -> StoreResult<Option<StreakState>>;

    /// Write `state` only if the stored version equals `expected_version`
    /// (`None` = no record may exist yet).
    ///
    /// Returns the stored state with its new version, or
    /// [`StoreError::Conflict`] if another writer got there first.
    async fn put_streak_if_version(
        &self,
        state: &StreakState,
        expected_version: Option<u64>,
    ) -> StoreResult<StreakState>;

    // ─── Ranking runs ────────────────────────────────────────────

    async fn get_ranking_run(&self, scope_key: &str) -> StoreResult<Option<RankingRun>>;

    /// Record a completed ranking of `scope_key`, bumping its generation.
    async fn record_ranking_run(
        &self,
        scope_key: &str,
        total: u32,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<RankingRun>;
}
