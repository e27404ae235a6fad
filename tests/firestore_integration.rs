// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for the Firestore backend.
//!
//! These tests require the Firestore emulator to be running.
//! Run with: FIRESTORE_EMULATOR_HOST=localhost:8081 cargo test

mod common;

use chrono::{NaiveDate, Utc};
use common::test_db;
use stride_rank::db::{SnapshotStore, StoreError};
use stride_rank::models::{
    StreakState, TeamMetric, TeamStatSnapshot, UserRankField, UserStatSnapshot,
};

/// Unique per-run IDs so reruns against a live emulator do not collide.
fn unique_id() -> u64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64 % 1_000_000_000_000
}

#[tokio::test]
async fn test_streak_conditional_write() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_id();

    let mut state = StreakState::new(user_id, 3);
    state.current_streak = 1;
    state.last_activity_date = NaiveDate::from_ymd_opt(2024, 1, 10);

    let stored = db.put_streak_if_version(&state, None).await.unwrap();
    assert_eq!(stored.version, 1);

    // Creating again must conflict
    let err = db.put_streak_if_version(&state, None).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    let mut next = stored.clone();
    next.current_streak = 2;
    let stored = db.put_streak_if_version(&next, Some(1)).await.unwrap();
    assert_eq!(stored.version, 2);

    // Stale version rejected
    let err = db.put_streak_if_version(&next, Some(1)).await.unwrap_err();
    assert_eq!(
        err,
        StoreError::Conflict {
            expected: Some(1),
            found: Some(2)
        }
    );

    let read = db.get_streak(user_id).await.unwrap().unwrap();
    assert_eq!(read.current_streak, 2);
}

#[tokio::test]
async fn test_user_stats_ranks_survive_overwrite() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_id();

    let mut snapshot = UserStatSnapshot::new(user_id);
    snapshot.apply_index(42.0);
    db.put_user_stats(&snapshot).await.unwrap();
    db.write_user_ranks(UserRankField::Global, &[(user_id, Some(7))])
        .await
        .unwrap();

    snapshot.apply_index(40.0);
    db.put_user_stats(&snapshot).await.unwrap();

    let read = db.get_user_stats(user_id).await.unwrap().unwrap();
    assert_eq!(read.global_rank, Some(7));
    assert_eq!(read.sport_index, 40.0);
    assert_eq!(read.sport_index_best, 42.0);
}

#[tokio::test]
async fn test_rank_write_touches_only_its_column() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_id();

    let mut snapshot = UserStatSnapshot::new(user_id);
    snapshot.country = Some("NL".to_string());
    snapshot.apply_index(55.0);
    db.put_user_stats(&snapshot).await.unwrap();
    db.write_user_ranks(UserRankField::Global, &[(user_id, Some(3))])
        .await
        .unwrap();
    db.write_user_ranks(UserRankField::Country, &[(user_id, Some(1))])
        .await
        .unwrap();

    // Clearing one column leaves the other rank and the metrics alone
    db.write_user_ranks(UserRankField::Global, &[(user_id, None)])
        .await
        .unwrap();

    let read = db.get_user_stats(user_id).await.unwrap().unwrap();
    assert_eq!(read.global_rank, None);
    assert_eq!(read.country_rank, Some(1));
    assert_eq!(read.sport_index, 55.0);
    assert_eq!(read.country.as_deref(), Some("NL"));
}

#[tokio::test]
async fn test_rank_write_requires_existing_row() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_id();

    let result = db
        .write_user_ranks(UserRankField::Global, &[(user_id, Some(1))])
        .await;
    assert!(result.is_err());
    assert!(db.get_user_stats(user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_team_ranks_per_metric() {
    require_emulator!();

    let db = test_db().await;
    let team_id = unique_id();

    let mut snapshot = TeamStatSnapshot::fold(team_id, 1, &[]);
    snapshot.avg_sport_index = 30.0;
    snapshot.total_distance_meters = 12_000.0;
    db.put_team_stats(&snapshot).await.unwrap();
    db.write_team_ranks(TeamMetric::AvgSportIndex, &[(team_id, Some(2))])
        .await
        .unwrap();
    db.write_team_ranks(TeamMetric::TotalDistance, &[(team_id, Some(5))])
        .await
        .unwrap();

    snapshot.avg_sport_index = 31.0;
    db.put_team_stats(&snapshot).await.unwrap();

    let read = db.get_team_stats(team_id).await.unwrap().unwrap();
    assert_eq!(read.rank(TeamMetric::AvgSportIndex), Some(2));
    assert_eq!(read.rank(TeamMetric::TotalDistance), Some(5));
    assert_eq!(read.avg_sport_index, 31.0);
}

#[tokio::test]
async fn test_ranking_run_generations() {
    require_emulator!();

    let db = test_db().await;
    let key = format!("users/country/T{}", unique_id());

    let first = db.record_ranking_run(&key, 10, Utc::now()).await.unwrap();
    let second = db.record_ranking_run(&key, 12, Utc::now()).await.unwrap();

    assert_eq!(first.generation, 1);
    assert_eq!(second.generation, 2);
    assert_eq!(db.get_ranking_run(&key).await.unwrap().unwrap().total, 12);
}
