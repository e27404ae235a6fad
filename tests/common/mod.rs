// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use stride_rank::config::Config;
use stride_rank::db::{FirestoreDb, MemoryStore};
use stride_rank::models::{ActivityRecord, SportId, Team, TeamId, UserId, UserProfile};
use stride_rank::routes::create_router;
use stride_rank::services::WeightedScoring;
use stride_rank::AppState;

pub const TEST_OPS_TOKEN: &str = "test_ops_token";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Build engine state over a fresh in-memory store.
#[allow(dead_code)]
pub fn create_test_state(config: Config) -> (Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(
        config,
        store.clone(),
        store.clone(),
        Arc::new(WeightedScoring::default()),
    ));
    (state, store)
}

/// Create a test app over an in-memory store.
/// Returns the router, the shared state and the store for seeding.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MemoryStore>) {
    let (state, store) = create_test_state(Config::test_default());
    (create_router(state.clone()), state, store)
}

#[allow(dead_code)]
pub fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn user(user_id: UserId, country: Option<&str>, city: Option<&str>) -> UserProfile {
    UserProfile {
        user_id,
        city: city.map(str::to_string),
        country: country.map(str::to_string),
        friends: vec![],
    }
}

#[allow(dead_code)]
pub fn team(team_id: TeamId, members: &[UserId]) -> Team {
    Team {
        team_id,
        members: members.to_vec(),
    }
}

/// A run of `distance_meters` taking 30 minutes.
#[allow(dead_code)]
pub fn activity(
    activity_id: u64,
    user_id: UserId,
    sport_id: SportId,
    start_date: DateTime<Utc>,
    distance_meters: f64,
) -> ActivityRecord {
    ActivityRecord {
        activity_id,
        user_id,
        sport_id,
        discipline_id: None,
        start_date,
        utc_offset_seconds: 0,
        primary_value: distance_meters,
        duration_seconds: 1800,
        distance_meters,
        calories: 0.0,
    }
}
