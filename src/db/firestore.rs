// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides both storage traits over these collections:
//! - `users`, `activities`, `teams` (ingest side, read-only here)
//! - `user_stats`, `user_sport_stats`, `team_stats` (snapshots)
//! - `streaks` (version-checked per-user state)
//! - `ranking_runs` (generation record per ranking scope)

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::{paths, FirestoreConsistencySelector, FirestoreWritePrecondition};
use serde::{Deserialize, Serialize};

use crate::db::{collections, ActivitySource, SnapshotStore, StoreError, StoreResult};
use crate::models::stats::sport_stat_doc_id;
use crate::models::{
    ActivityRecord, RankingRun, SportId, SportRankField, StreakState, Team, TeamId, TeamMetric,
    TeamStatSnapshot, UserId, UserProfile, UserRankField, UserSportStatSnapshot,
    UserStatSnapshot,
};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map a failed commit: contention and failed preconditions are conflicts.
fn commit_err(e: FirestoreError) -> StoreError {
    match &e {
        FirestoreError::DataConflictError(_) => StoreError::Conflict {
            expected: None,
            found: None,
        },
        FirestoreError::DatabaseError(db)
            if matches!(db.public.code.as_str(), "Aborted" | "FailedPrecondition") =>
        {
            StoreError::Conflict {
                expected: None,
                found: None,
            }
        }
        _ => db_err(format!("Transaction commit failed: {}", e)),
    }
}

/// Fields aggregation owns on a user stats row. Rank columns are absent.
fn user_metric_fields() -> Vec<String> {
    paths!(UserStatSnapshot::{
        user_id,
        sport_index,
        sport_index_best,
        city,
        country,
        total_activities,
        total_distance_meters,
        total_duration_seconds,
        total_calories,
        last_activity_at
    })
}

fn sport_metric_fields() -> Vec<String> {
    paths!(UserSportStatSnapshot::{
        user_id,
        sport_id,
        performance_score,
        activity_count,
        total_distance_meters,
        city,
        country
    })
}

fn team_metric_fields() -> Vec<String> {
    paths!(TeamStatSnapshot::{
        team_id,
        member_count,
        members_aggregated,
        total_distance_meters,
        total_activities,
        avg_sport_index
    })
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> StoreResult<Self> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| db_err(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> StoreResult<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| db_err(format!("Failed to connect to Firestore Emulator: {}", e)))?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> StoreResult<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| db_err("Database not connected (offline mode)"))
    }

    // ─── Generic document helpers ─────────────────────────────────

    async fn get_doc<T>(&self, collection: &str, doc_id: &str) -> StoreResult<Option<T>>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(doc_id)
            .await
            .map_err(db_err)
    }

    /// Write only `fields` of `object`; every other field of the stored document is kept.
    async fn update_fields<T>(
        &self,
        collection: &str,
        doc_id: &str,
        object: &T,
        fields: Vec<String>,
    ) -> StoreResult<()>
    where
        T: Serialize + Sync + Send,
        for<'de> T: Deserialize<'de>,
    {
        let _: T = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields)
            .in_col(collection)
            .document_id(doc_id)
            .object(object)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_docs<T>(&self, collection: &str) -> StoreResult<Vec<T>>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .from(collection)
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    async fn list_docs_where_eq<T>(
        &self,
        collection: &str,
        field: &'static str,
        value: u64,
    ) -> StoreResult<Vec<T>>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| q.field(field).eq(value))
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    /// Set one rank column on existing documents, in transactions of at
    /// most `BATCH_SIZE` writes.
    ///
    /// Nothing but `column` is written. Each chunk commits atomically; a
    /// failure leaves earlier chunks written.
    async fn write_rank_column(
        &self,
        collection: &str,
        column: &str,
        ranks: Vec<(String, Option<u32>)>,
    ) -> StoreResult<()> {
        let client = self.get_client()?;

        for chunk in ranks.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| db_err(format!("Failed to begin transaction: {}", e)))?;

            let patches: Vec<(&str, BTreeMap<String, Option<u32>>)> = chunk
                .iter()
                .map(|(doc_id, rank)| {
                    (doc_id.as_str(), BTreeMap::from([(column.to_string(), *rank)]))
                })
                .collect();

            for (doc_id, patch) in &patches {
                client
                    .fluent()
                    .update()
                    .fields([column])
                    .in_col(collection)
                    .precondition(FirestoreWritePrecondition::Exists(true))
                    .document_id(*doc_id)
                    .object(patch)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        db_err(format!(
                            "Failed to add {} rank write to transaction: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction
                .commit()
                .await
                .map_err(|e| db_err(format!("Failed to commit rank batch: {}", e)))?;
        }

        Ok(())
    }

    /// Read a document and write its successor in one transaction.
    ///
    /// The read is bound to the transaction, so a concurrent commit to the
    /// same document aborts this one, and the write carries an existence
    /// precondition matching what was read. Either case surfaces as
    /// [`StoreError::Conflict`].
    async fn read_modify_write<T, F>(
        &self,
        collection: &str,
        doc_id: &str,
        update: F,
    ) -> StoreResult<T>
    where
        T: Serialize + Sync + Send,
        for<'de> T: Deserialize<'de>,
        F: FnOnce(Option<T>) -> StoreResult<T>,
    {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| db_err(format!("Failed to begin transaction: {}", e)))?;
        let in_transaction = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );

        let read: StoreResult<Option<T>> = in_transaction
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(doc_id)
            .await
            .map_err(db_err);
        let current = match read {
            Ok(current) => current,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(e);
            }
        };
        let existed = current.is_some();

        let next = match update(current) {
            Ok(next) => next,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(e);
            }
        };

        client
            .fluent()
            .update()
            .in_col(collection)
            .precondition(FirestoreWritePrecondition::Exists(existed))
            .document_id(doc_id)
            .object(&next)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                db_err(format!(
                    "Failed to add {} write to transaction: {}",
                    collection, e
                ))
            })?;

        transaction.commit().await.map_err(commit_err)?;
        Ok(next)
    }
}

#[async_trait]
impl ActivitySource for FirestoreDb {
    async fn list_user_ids(&self) -> StoreResult<Vec<UserId>> {
        let users: Vec<UserProfile> = self.list_docs(collections::USERS).await?;
        let mut ids: Vec<UserId> = users.into_iter().map(|u| u.user_id).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn get_user_profile(&self, user_id: UserId) -> StoreResult<Option<UserProfile>> {
        self.get_doc(collections::USERS, &user_id.to_string()).await
    }

    async fn list_activities_for_user(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<ActivityRecord>> {
        let mut activities: Vec<ActivityRecord> = self
            .list_docs_where_eq(collections::ACTIVITIES, "user_id", user_id)
            .await?;

        // Ordering and the time filter are applied here rather than in the
        // query so no composite index is required.
        if let Some(since) = since {
            activities.retain(|a| a.start_date >= since);
        }
        activities.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.activity_id.cmp(&b.activity_id))
        });
        Ok(activities)
    }

    async fn list_team_ids(&self) -> StoreResult<Vec<TeamId>> {
        let teams: Vec<Team> = self.list_docs(collections::TEAMS).await?;
        let mut ids: Vec<TeamId> = teams.into_iter().map(|t| t.team_id).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn list_team_members(&self, team_id: TeamId) -> StoreResult<Option<Vec<UserId>>> {
        let team: Option<Team> = self
            .get_doc(collections::TEAMS, &team_id.to_string())
            .await?;
        Ok(team.map(|t| t.members))
    }
}

#[async_trait]
impl SnapshotStore for FirestoreDb {
    // ─── User Stats Operations ──────────────────────────────────

    async fn get_user_stats(&self, user_id: UserId) -> StoreResult<Option<UserStatSnapshot>> {
        self.get_doc(collections::USER_STATS, &user_id.to_string())
            .await
    }

    async fn put_user_stats(&self, snapshot: &UserStatSnapshot) -> StoreResult<()> {
        self.update_fields(
            collections::USER_STATS,
            &snapshot.user_id.to_string(),
            snapshot,
            user_metric_fields(),
        )
        .await
    }

    async fn list_user_stats(&self) -> StoreResult<Vec<UserStatSnapshot>> {
        let mut rows: Vec<UserStatSnapshot> = self.list_docs(collections::USER_STATS).await?;
        rows.sort_by_key(|s| s.user_id);
        Ok(rows)
    }

    async fn write_user_ranks(
        &self,
        field: UserRankField,
        ranks: &[(UserId, Option<u32>)],
    ) -> StoreResult<()> {
        let ranks = ranks
            .iter()
            .map(|(user_id, rank)| (user_id.to_string(), *rank))
            .collect();
        self.write_rank_column(collections::USER_STATS, field.column(), ranks)
            .await
    }

    // ─── User Sport Stats Operations ────────────────────────────

    async fn get_user_sport_stats(
        &self,
        user_id: UserId,
    ) -> StoreResult<Vec<UserSportStatSnapshot>> {
        let mut rows: Vec<UserSportStatSnapshot> = self
            .list_docs_where_eq(collections::USER_SPORT_STATS, "user_id", user_id)
            .await?;
        rows.sort_by_key(|s| s.sport_id);
        Ok(rows)
    }

    async fn put_user_sport_stats(&self, snapshot: &UserSportStatSnapshot) -> StoreResult<()> {
        self.update_fields(
            collections::USER_SPORT_STATS,
            &snapshot.doc_id(),
            snapshot,
            sport_metric_fields(),
        )
        .await
    }

    async fn list_sport_stats(
        &self,
        sport_id: Option<SportId>,
    ) -> StoreResult<Vec<UserSportStatSnapshot>> {
        let mut rows: Vec<UserSportStatSnapshot> = match sport_id {
            Some(sport_id) => {
                self.list_docs_where_eq(collections::USER_SPORT_STATS, "sport_id", sport_id as u64)
                    .await?
            }
            None => self.list_docs(collections::USER_SPORT_STATS).await?,
        };
        rows.sort_by_key(|s| (s.sport_id, s.user_id));
        Ok(rows)
    }

    async fn write_sport_ranks(
        &self,
        sport_id: SportId,
        field: SportRankField,
        ranks: &[(UserId, Option<u32>)],
    ) -> StoreResult<()> {
        let ranks = ranks
            .iter()
            .map(|(user_id, rank)| (sport_stat_doc_id(*user_id, sport_id), *rank))
            .collect();
        self.write_rank_column(collections::USER_SPORT_STATS, field.column(), ranks)
            .await
    }

    // ─── Team Stats Operations ──────────────────────────────────

    async fn get_team_stats(&self, team_id: TeamId) -> StoreResult<Option<TeamStatSnapshot>> {
        self.get_doc(collections::TEAM_STATS, &team_id.to_string())
            .await
    }

    async fn put_team_stats(&self, snapshot: &TeamStatSnapshot) -> StoreResult<()> {
        self.update_fields(
            collections::TEAM_STATS,
            &snapshot.team_id.to_string(),
            snapshot,
            team_metric_fields(),
        )
        .await
    }

    async fn list_team_stats(&self) -> StoreResult<Vec<TeamStatSnapshot>> {
        let mut rows: Vec<TeamStatSnapshot> = self.list_docs(collections::TEAM_STATS).await?;
        rows.sort_by_key(|s| s.team_id);
        Ok(rows)
    }

    async fn write_team_ranks(
        &self,
        metric: TeamMetric,
        ranks: &[(TeamId, Option<u32>)],
    ) -> StoreResult<()> {
        let ranks = ranks
            .iter()
            .map(|(team_id, rank)| (team_id.to_string(), *rank))
            .collect();
        self.write_rank_column(collections::TEAM_STATS, metric.rank_column(), ranks)
            .await
    }

    // ─── Streak Operations ──────────────────────────────────────

    async fn get_streak(&self, user_id: UserId) -> StoreResult<Option<StreakState>> {
        self.get_doc(collections::STREAKS, &user_id.to_string())
            .await
    }

    async fn put_streak_if_version(
        &self,
        state: &StreakState,
        expected_version: Option<u64>,
    ) -> StoreResult<StreakState> {
        let next = self
            .read_modify_write(
                collections::STREAKS,
                &state.user_id.to_string(),
                |current: Option<StreakState>| {
                    let found = current.map(|s| s.version);
                    if found != expected_version {
                        return Err(StoreError::Conflict {
                            expected: expected_version,
                            found,
                        });
                    }
                    let mut next = state.clone();
                    next.version = found.map_or(1, |v| v + 1);
                    Ok(next)
                },
            )
            .await
            .map_err(|e| match e {
                StoreError::Conflict { found, .. } => StoreError::Conflict {
                    expected: expected_version,
                    found,
                },
                other => other,
            })?;

        tracing::debug!(
            user_id = state.user_id,
            version = next.version,
            "Streak state written"
        );
        Ok(next)
    }

    // ─── Ranking Runs ───────────────────────────────────────────

    async fn get_ranking_run(&self, scope_key: &str) -> StoreResult<Option<RankingRun>> {
        self.get_doc(collections::RANKING_RUNS, &RankingRun::doc_id(scope_key))
            .await
    }

    async fn record_ranking_run(
        &self,
        scope_key: &str,
        total: u32,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<RankingRun> {
        self.read_modify_write(
            collections::RANKING_RUNS,
            &RankingRun::doc_id(scope_key),
            |previous: Option<RankingRun>| {
                Ok(RankingRun::next(
                    previous.as_ref(),
                    scope_key,
                    total,
                    completed_at,
                ))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_client_reports_backend_error() {
        let db = FirestoreDb::new_mock();
        let err = db.get_user_stats(1).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_offline_streak_write_fails_cleanly() {
        let db = FirestoreDb::new_mock();
        let state = StreakState::new(1, 3);
        let err = db.put_streak_if_version(&state, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_offline_rank_write_fails_cleanly() {
        let db = FirestoreDb::new_mock();
        let err = db
            .write_user_ranks(UserRankField::Global, &[(1, Some(1))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    fn database_error(code: &str, retry_possible: bool) -> FirestoreError {
        FirestoreError::DatabaseError(firestore::errors::FirestoreDatabaseError {
            public: firestore::errors::FirestoreErrorPublicGenericDetails {
                code: code.to_string(),
            },
            details: "commit rejected".to_string(),
            retry_possible,
        })
    }

    #[test]
    fn test_contended_commit_is_conflict() {
        let conflict = StoreError::Conflict {
            expected: None,
            found: None,
        };
        assert_eq!(commit_err(database_error("Aborted", true)), conflict);
        assert_eq!(commit_err(database_error("FailedPrecondition", false)), conflict);

        let already_exists =
            FirestoreError::DataConflictError(firestore::errors::FirestoreDataConflictError {
                public: firestore::errors::FirestoreErrorPublicGenericDetails {
                    code: "AlreadyExists".to_string(),
                },
                details: "document exists".to_string(),
            });
        assert_eq!(commit_err(already_exists), conflict);
    }

    #[test]
    fn test_other_commit_failures_are_backend_errors() {
        let err = commit_err(database_error("Unavailable", true));
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_metric_fields_exclude_rank_columns() {
        for fields in [user_metric_fields(), sport_metric_fields(), team_metric_fields()] {
            assert!(fields.iter().all(|f| !f.ends_with("_rank")));
        }
        assert!(user_metric_fields().contains(&"sport_index_best".to_string()));
        assert!(team_metric_fields().contains(&"avg_sport_index".to_string()));
    }
}
