// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store backed by concurrent maps.
//!
//! Used for local development and tests. Conditional streak writes are
//! atomic under the map's per-entry lock, which gives the same
//! compare-and-swap contract as the Firestore backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::db::{ActivitySource, SnapshotStore, StoreError, StoreResult};
use crate::models::{
    ActivityRecord, RankingRun, SportId, SportRankField, StreakState, Team, TeamId, TeamMetric,
    TeamStatSnapshot, UserId, UserProfile, UserRankField, UserSportStatSnapshot,
    UserStatSnapshot,
};

/// In-memory implementation of both storage traits.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, UserProfile>,
    activities: DashMap<UserId, Vec<ActivityRecord>>,
    teams: DashMap<TeamId, Team>,
    user_stats: DashMap<UserId, UserStatSnapshot>,
    sport_stats: DashMap<(UserId, SportId), UserSportStatSnapshot>,
    team_stats: DashMap<TeamId, TeamStatSnapshot>,
    streaks: DashMap<UserId, StreakState>,
    ranking_runs: DashMap<String, RankingRun>,
    /// User stats rows whose reads fail with a backend error.
    unreadable_user_stats: DashSet<UserId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Ingest side ─────────────────────────────────────────────

    pub fn upsert_user(&self, profile: UserProfile) {
        self.users.insert(profile.user_id, profile);
    }

    /// Append an activity, keeping each user's log ordered by start time.
    ///
    /// Re-inserting an activity ID replaces the earlier record.
    pub fn insert_activity(&self, activity: ActivityRecord) {
        let mut log = self.activities.entry(activity.user_id).or_default();
        log.retain(|a| a.activity_id != activity.activity_id);
        log.push(activity);
        log.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.activity_id.cmp(&b.activity_id))
        });
    }

    pub fn upsert_team(&self, team: Team) {
        self.teams.insert(team.team_id, team);
    }

    /// Make reads of a user's stats row fail, to exercise partial aggregation.
    pub fn inject_user_stats_read_failure(&self, user_id: UserId) {
        self.unreadable_user_stats.insert(user_id);
    }
}

#[async_trait]
impl ActivitySource for MemoryStore {
    async fn list_user_ids(&self) -> StoreResult<Vec<UserId>> {
        let mut ids: Vec<UserId> = self.users.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn get_user_profile(&self, user_id: UserId) -> StoreResult<Option<UserProfile>> {
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn list_activities_for_user(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<ActivityRecord>> {
        let Some(log) = self.activities.get(&user_id) else {
            return Ok(Vec::new());
        };
        Ok(log
            .iter()
            .filter(|a| since.map_or(true, |s| a.start_date >= s))
            .cloned()
            .collect())
    }

    async fn list_team_ids(&self) -> StoreResult<Vec<TeamId>> {
        let mut ids: Vec<TeamId> = self.teams.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn list_team_members(&self, team_id: TeamId) -> StoreResult<Option<Vec<UserId>>> {
        Ok(self.teams.get(&team_id).map(|t| t.members.clone()))
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get_user_stats(&self, user_id: UserId) -> StoreResult<Option<UserStatSnapshot>> {
        if self.unreadable_user_stats.contains(&user_id) {
            return Err(StoreError::Backend(format!(
                "user_stats/{} unreadable",
                user_id
            )));
        }
        Ok(self.user_stats.get(&user_id).map(|s| s.value().clone()))
    }

    async fn put_user_stats(&self, snapshot: &UserStatSnapshot) -> StoreResult<()> {
        let mut next = snapshot.clone();
        match self.user_stats.entry(snapshot.user_id) {
            Entry::Occupied(mut e) => {
                next.retain_ranks_from(e.get());
                e.insert(next);
            }
            Entry::Vacant(e) => {
                e.insert(next);
            }
        }
        Ok(())
    }

    async fn list_user_stats(&self) -> StoreResult<Vec<UserStatSnapshot>> {
        let mut rows: Vec<UserStatSnapshot> = self
            .user_stats
            .iter()
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|s| s.user_id);
        Ok(rows)
    }

    async fn write_user_ranks(
        &self,
        field: UserRankField,
        ranks: &[(UserId, Option<u32>)],
    ) -> StoreResult<()> {
        for (user_id, rank) in ranks {
            if let Some(mut row) = self.user_stats.get_mut(user_id) {
                match field {
                    UserRankField::Global => row.global_rank = *rank,
                    UserRankField::Country => row.country_rank = *rank,
                    UserRankField::City => row.city_rank = *rank,
                }
            }
        }
        Ok(())
    }

    async fn get_user_sport_stats(
        &self,
        user_id: UserId,
    ) -> StoreResult<Vec<UserSportStatSnapshot>> {
        let mut rows: Vec<UserSportStatSnapshot> = self
            .sport_stats
            .iter()
            .filter(|e| e.key().0 == user_id)
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|s| s.sport_id);
        Ok(rows)
    }

    async fn put_user_sport_stats(&self, snapshot: &UserSportStatSnapshot) -> StoreResult<()> {
        let mut next = snapshot.clone();
        match self.sport_stats.entry((snapshot.user_id, snapshot.sport_id)) {
            Entry::Occupied(mut e) => {
                next.retain_ranks_from(e.get());
                e.insert(next);
            }
            Entry::Vacant(e) => {
                e.insert(next);
            }
        }
        Ok(())
    }

    async fn list_sport_stats(
        &self,
        sport_id: Option<SportId>,
    ) -> StoreResult<Vec<UserSportStatSnapshot>> {
        let mut rows: Vec<UserSportStatSnapshot> = self
            .sport_stats
            .iter()
            .filter(|e| sport_id.map_or(true, |s| e.key().1 == s))
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|s| (s.sport_id, s.user_id));
        Ok(rows)
    }

    async fn write_sport_ranks(
        &self,
        sport_id: SportId,
        field: SportRankField,
        ranks: &[(UserId, Option<u32>)],
    ) -> StoreResult<()> {
        for (user_id, rank) in ranks {
            if let Some(mut row) = self.sport_stats.get_mut(&(*user_id, sport_id)) {
                match field {
                    SportRankField::Global => row.global_rank = *rank,
                    SportRankField::Country => row.country_rank = *rank,
                    SportRankField::City => row.city_rank = *rank,
                    SportRankField::Friends => row.friends_rank = *rank,
                }
            }
        }
        Ok(())
    }

    async fn get_team_stats(&self, team_id: TeamId) -> StoreResult<Option<TeamStatSnapshot>> {
        Ok(self.team_stats.get(&team_id).map(|s| s.value().clone()))
    }

    async fn put_team_stats(&self, snapshot: &TeamStatSnapshot) -> StoreResult<()> {
        let mut next = snapshot.clone();
        match self.team_stats.entry(snapshot.team_id) {
            Entry::Occupied(mut e) => {
                next.retain_ranks_from(e.get());
                e.insert(next);
            }
            Entry::Vacant(e) => {
                e.insert(next);
            }
        }
        Ok(())
    }

    async fn list_team_stats(&self) -> StoreResult<Vec<TeamStatSnapshot>> {
        let mut rows: Vec<TeamStatSnapshot> = self
            .team_stats
            .iter()
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|s| s.team_id);
        Ok(rows)
    }

    async fn write_team_ranks(
        &self,
        metric: TeamMetric,
        ranks: &[(TeamId, Option<u32>)],
    ) -> StoreResult<()> {
        for (team_id, rank) in ranks {
            if let Some(mut row) = self.team_stats.get_mut(team_id) {
                row.set_rank(metric, *rank);
            }
        }
        Ok(())
    }

    async fn get_streak(&self, user_id: UserId) -> StoreResult<Option<StreakState>> {
        Ok(self.streaks.get(&user_id).map(|s| s.value().clone()))
    }

    async fn put_streak_if_version(
        &self,
        state: &StreakState,
        expected_version: Option<u64>,
    ) -> StoreResult<StreakState> {
        let mut next = state.clone();
        match self.streaks.entry(state.user_id) {
            Entry::Occupied(mut e) => {
                let found = e.get().version;
                if expected_version != Some(found) {
                    return Err(StoreError::Conflict {
                        expected: expected_version,
                        found: Some(found),
                    });
                }
                next.version = found + 1;
                e.insert(next.clone());
            }
            Entry::Vacant(e) => {
                if expected_version.is_some() {
                    return Err(StoreError::Conflict {
                        expected: expected_version,
                        found: None,
                    });
                }
                next.version = 1;
                e.insert(next.clone());
            }
        }
        Ok(next)
    }

    async fn get_ranking_run(&self, scope_key: &str) -> StoreResult<Option<RankingRun>> {
        Ok(self.ranking_runs.get(scope_key).map(|r| r.value().clone()))
    }

    async fn record_ranking_run(
        &self,
        scope_key: &str,
        total: u32,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<RankingRun> {
        let mut entry = self.ranking_runs.entry(scope_key.to_string()).or_insert_with(|| {
            RankingRun {
                scope_key: scope_key.to_string(),
                generation: 0,
                total: 0,
                completed_at,
            }
        });
        let next = RankingRun::next(Some(&*entry), scope_key, total, completed_at);
        *entry = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn streak(user_id: UserId, current: u32) -> StreakState {
        let mut s = StreakState::new(user_id, 3);
        s.current_streak = current;
        s
    }

    #[tokio::test]
    async fn test_streak_cas_create_then_update() {
        let store = MemoryStore::new();

        let saved = store.put_streak_if_version(&streak(1, 1), None).await.unwrap();
        assert_eq!(saved.version, 1);

        let saved = store
            .put_streak_if_version(&streak(1, 2), Some(1))
            .await
            .unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(store.get_streak(1).await.unwrap().unwrap().current_streak, 2);
    }

    #[tokio::test]
    async fn test_streak_cas_rejects_stale_version() {
        let store = MemoryStore::new();
        store.put_streak_if_version(&streak(1, 1), None).await.unwrap();

        let err = store
            .put_streak_if_version(&streak(1, 5), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                expected: None,
                found: Some(1)
            }
        );

        let err = store
            .put_streak_if_version(&streak(1, 5), Some(7))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get_streak(1).await.unwrap().unwrap().current_streak, 1);
    }

    #[tokio::test]
    async fn test_put_user_stats_retains_ranks() {
        let store = MemoryStore::new();
        store.put_user_stats(&UserStatSnapshot::new(1)).await.unwrap();
        store
            .write_user_ranks(UserRankField::Global, &[(1, Some(3))])
            .await
            .unwrap();

        let mut fresh = UserStatSnapshot::new(1);
        fresh.apply_index(42.0);
        store.put_user_stats(&fresh).await.unwrap();

        let stored = store.get_user_stats(1).await.unwrap().unwrap();
        assert_eq!(stored.sport_index, 42.0);
        assert_eq!(stored.global_rank, Some(3));
    }

    #[tokio::test]
    async fn test_activities_ordered_and_filtered_by_since() {
        let store = MemoryStore::new();
        for (id, day) in [(2, 12), (1, 10), (3, 14)] {
            store.insert_activity(ActivityRecord {
                activity_id: id,
                user_id: 5,
                sport_id: 1,
                discipline_id: None,
                start_date: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
                utc_offset_seconds: 0,
                primary_value: 1.0,
                duration_seconds: 600,
                distance_meters: 1000.0,
                calories: 50.0,
            });
        }

        let all = store.list_activities_for_user(5, None).await.unwrap();
        let ids: Vec<u64> = all.iter().map(|a| a.activity_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let since = Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap();
        let recent = store.list_activities_for_user(5, Some(since)).await.unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn test_ranking_run_generation_increments() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store.record_ranking_run("users/global", 3, now).await.unwrap();
        let second = store.record_ranking_run("users/global", 4, now).await.unwrap();
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(
            store.get_ranking_run("users/global").await.unwrap().unwrap().total,
            4
        );
    }

    #[tokio::test]
    async fn test_team_members_for_unknown_team() {
        let store = MemoryStore::new();
        assert_eq!(store.list_team_members(9).await.unwrap(), None);
        let err = store.list_activities_for_team_members(9).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
